// Command-line front end.
//
// Each subcommand loads the sheets it is given into the session state,
// runs one computation, previews the result on the console and writes the
// exports under the output directory. The session is saved afterwards, so
// a later command can reuse sheets uploaded by an earlier one.
use branch_recon::aggregate::{areas, filter_area, ALL_AREAS};
use branch_recon::flags::{FlagField, FlagStore};
use branch_recon::loader::{load_csv, merge_due_lists};
use branch_recon::output::{
    file_safe, preview_sheet, preview_table, preview_table_rows, write_csv, write_json,
    write_per_branch, write_table_csv, write_xlsx,
};
use branch_recon::tranche::{by_branch, edit_flag, flags_from_view, risk_summary};
use branch_recon::util::{format_int, format_number};
use branch_recon::{AppState, Config, ReconError, Result, SheetKind, Table};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "branch_recon")]
#[command(about = "Branch-wise reconciliation of loan, recovery and cheque sheets")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true, env = "BRANCH_RECON_CONFIG")]
    config: Option<PathBuf>,

    /// Reference date (YYYY-MM-DD); defaults to today
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,

    /// Overrides the configured output directory
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Overrides the configured session file
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    /// Start from an empty session and do not save it
    #[arg(long, global = true)]
    no_session: bool,

    /// Also write XLSX next to each CSV export
    #[arg(long, global = true)]
    xlsx: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Due list minus recoveries (and confirmations), split per branch
    Overdue(OverdueArgs),
    /// Per-branch Due / Given / N/A against recoveries, overall and this month
    Recovery(DueRecoveryArgs),
    /// Recovery counts and amounts per day-of-month range
    Ranges(RecoveryArgs),
    /// Receipts and amounts by branch, project and date
    Pivot(RecoveryArgs),
    /// Active sheet against the MDP sheet
    Mdp(MdpArgs),
    /// Confirmation (terabyte) listing with per-branch and per-date totals
    Terabyte(SheetArg),
    /// First-tranche view with 2nd tranche status and risk level
    Cheque(ChequeArgs),
    /// Target vs achievement per branch and project
    Targets(TargetArgs),
    /// Merge exported due lists, optionally attaching branch names
    Merge(MergeArgs),
    /// Attach branch and area names to the due list
    Enrich(EnrichArgs),
    /// Disbursement register per branch
    Register(SheetArg),
}

#[derive(Args)]
struct SheetArg {
    /// Sheet to load (CSV); the session copy is used when omitted
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Args)]
struct RecoveryArgs {
    /// Recovery sheet; falls back to the session, then the recovery cache
    #[arg(long)]
    recovery: Option<PathBuf>,
}

#[derive(Args)]
struct DueRecoveryArgs {
    #[arg(long)]
    due: Option<PathBuf>,
    #[command(flatten)]
    recovery: RecoveryArgs,
}

#[derive(Args)]
struct OverdueArgs {
    #[command(flatten)]
    sheets: DueRecoveryArgs,
    /// Confirmation (terabyte) sheet for the final overdue list
    #[arg(long)]
    terabyte: Option<PathBuf>,
}

#[derive(Args)]
struct MdpArgs {
    #[arg(long)]
    active: Option<PathBuf>,
    #[arg(long)]
    mdp: Option<PathBuf>,
    /// Export only this area
    #[arg(long, default_value = ALL_AREAS)]
    area: String,
}

#[derive(Args)]
struct ChequeArgs {
    #[arg(long)]
    file: Option<PathBuf>,
    /// Flag edit as SANCTION_NO:COLUMN=VALUE, e.g. S1:house_complete=Yes
    #[arg(long = "set")]
    edits: Vec<String>,
    /// Write the merged flags back to the flag store
    #[arg(long)]
    save_flags: bool,
}

#[derive(Args)]
struct TargetArgs {
    #[arg(long)]
    targets: Option<PathBuf>,
    #[arg(long)]
    achievements: Option<PathBuf>,
}

#[derive(Args)]
struct MergeArgs {
    /// Exported due lists (two preamble rows each)
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Branch reference sheet for enrichment
    #[arg(long)]
    branches: Option<PathBuf>,
}

#[derive(Args)]
struct EnrichArgs {
    #[arg(long)]
    due: Option<PathBuf>,
    #[arg(long)]
    branches: Option<PathBuf>,
}

/// Resolved settings shared by every command.
struct Ctx {
    config: Config,
    as_of: NaiveDate,
    xlsx: bool,
}

impl Ctx {
    fn out(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(name)
    }

    fn label(&self) -> &str {
        &self.config.grand_total_label
    }

    fn rows(&self) -> usize {
        self.config.preview_rows
    }

    fn export_table(&self, name: &str, table: &Table) -> Result<()> {
        write_table_csv(&self.out(&format!("{}.csv", name)), table)?;
        if self.xlsx {
            write_xlsx(&self.out(&format!("{}.xlsx", name)), sheet_name(name), table)?;
        }
        Ok(())
    }
}

// Excel caps sheet names at 31 characters.
fn sheet_name(name: &str) -> &str {
    match name.char_indices().nth(31) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn upload(state: AppState, kind: SheetKind, path: Option<&Path>) -> Result<AppState> {
    match path {
        Some(p) => Ok(state.with_upload(kind, load_csv(p, 0)?)),
        None => Ok(state),
    }
}

/// Uploaded sheet first (and cache it), then the session copy, then the
/// cached file.
fn upload_recovery(state: AppState, args: &RecoveryArgs, ctx: &Ctx) -> Result<AppState> {
    match &args.recovery {
        Some(p) => state.with_recovery_upload(load_csv(p, 0)?, &ctx.config.recovery_cache),
        None => state.with_cached_recovery(&ctx.config.recovery_cache),
    }
}

fn parse_edit(raw: &str) -> Result<(String, FlagField, String)> {
    let invalid = || ReconError::InvalidConfig(format!("flag edit '{}' is not SANCTION_NO:COLUMN=VALUE", raw));
    let (sanction, rest) = raw.split_once(':').ok_or_else(invalid)?;
    let (field, value) = rest.split_once('=').ok_or_else(invalid)?;
    if sanction.trim().is_empty() {
        return Err(invalid());
    }
    Ok((sanction.trim().to_string(), field.parse()?, value.to_string()))
}

fn handle_overdue(state: AppState, args: &OverdueArgs, ctx: &Ctx) -> Result<AppState> {
    let state = upload(state, SheetKind::DoList, args.sheets.due.as_deref())?;
    let state = upload_recovery(state, &args.sheets.recovery, ctx)?;
    let state = upload(state, SheetKind::Terabyte, args.terabyte.as_deref())?;
    let (state, outcome) = state.reconcile()?;

    println!(
        "Overdue: {} of {} due entries",
        format_int(outcome.overdue.len()),
        format_int(state.do_list.as_ref().map(Table::len).unwrap_or(0))
    );
    ctx.export_table("overdue", &outcome.overdue)?;
    if let Some(final_overdue) = &outcome.final_overdue {
        println!(
            "Final overdue after confirmations: {}",
            format_int(final_overdue.len())
        );
        ctx.export_table("final_overdue", final_overdue)?;
    }
    preview_sheet("Overdue list", outcome.latest(), ctx.rows());

    let per_branch = state.overdue_by_branch()?;
    write_per_branch(&ctx.out("overdue_by_branch"), "overdue", &per_branch)?;
    let listings = state.overdue_listings()?;
    let written = write_per_branch(&ctx.out("overdue_listings"), "overdue_list", &listings)?;
    println!("Wrote {} branch listings.", format_int(written.len()));
    Ok(state)
}

fn handle_recovery(state: AppState, args: &DueRecoveryArgs, ctx: &Ctx) -> Result<AppState> {
    let state = upload(state, SheetKind::DoList, args.due.as_deref())?;
    let state = upload_recovery(state, &args.recovery, ctx)?;

    let summary = state.recovery_summary(ctx.label())?;
    preview_table("Recovery summary", None, &summary, ctx.rows() + 1);
    write_csv(&ctx.out("recovery_summary.csv"), &summary)?;

    let monthly = state.recovery_this_month(ctx.as_of, ctx.label())?;
    let note = format!(
        "due entries {}, recoveries this month {}, matched {}",
        format_int(monthly.due_entries),
        format_int(monthly.recoveries_this_month),
        format_int(monthly.matched_recoveries)
    );
    preview_table(
        &format!("Recovery for {}", ctx.as_of.format("%B %Y")),
        Some(note.as_str()),
        &monthly.summary,
        ctx.rows() + 1,
    );
    write_csv(&ctx.out("recovery_this_month.csv"), &monthly.summary)?;

    let listings = state.recovery_listings()?;
    let dir = ctx.out("recovery_listings");
    let mut tables = BTreeMap::new();
    for (branch, listing) in &listings {
        println!("{}: total amount {}", branch, format_number(listing.total_amount, 2));
        tables.insert(branch.clone(), listing.rows.clone());
    }
    write_per_branch(&dir, "recovery", &tables)?;
    Ok(state)
}

fn handle_ranges(state: AppState, args: &RecoveryArgs, ctx: &Ctx) -> Result<AppState> {
    let state = upload_recovery(state, args, ctx)?;
    let amounts = state.range_amounts()?;
    preview_table("Recovery amount by day range", None, &amounts, ctx.rows());
    write_csv(&ctx.out("range_amounts.csv"), &amounts)?;
    let counts = state.range_counts(ctx.label())?;
    preview_table("Recovery count by day range", None, &counts, ctx.rows() + 1);
    write_csv(&ctx.out("range_counts.csv"), &counts)?;
    Ok(state)
}

fn handle_pivot(state: AppState, args: &RecoveryArgs, ctx: &Ctx) -> Result<AppState> {
    let state = upload_recovery(state, args, ctx)?;
    let pivot = state.pivot()?;
    for branch in &pivot {
        println!(
            "\nBranch {}: {} receipts, amount {}",
            branch.branch_id,
            format_int(branch.receipts),
            format_number(branch.amount, 2)
        );
        for project in &branch.projects {
            println!(
                "  {}: {} receipts, amount {}",
                project.project,
                format_int(project.receipts),
                format_number(project.amount, 2)
            );
            preview_table_rows(&project.rows, ctx.rows());
        }
    }
    let flat: Vec<_> = pivot
        .iter()
        .flat_map(|b| b.projects.iter().flat_map(|p| p.rows.iter().cloned()))
        .collect();
    write_csv(&ctx.out("recovery_pivot.csv"), &flat)?;
    write_json(&ctx.out("recovery_pivot.json"), &pivot)?;
    Ok(state)
}

fn handle_mdp(state: AppState, args: &MdpArgs, ctx: &Ctx) -> Result<AppState> {
    let state = upload(state, SheetKind::Active, args.active.as_deref())?;
    let state = upload(state, SheetKind::Mdp, args.mdp.as_deref())?;
    let report = state.mdp_report(ctx.label())?;
    let known = areas(&report, ctx.label());
    if args.area != ALL_AREAS && !known.contains(&args.area) {
        return Err(ReconError::InvalidConfig(format!(
            "area '{}' not in report (known: {})",
            args.area,
            known.join(", ")
        )));
    }
    let rows = filter_area(&report, &args.area);
    preview_table("MDP report", Some(args.area.as_str()), &rows, ctx.rows() + 1);
    write_csv(&ctx.out(&format!("mdp_{}.csv", file_safe(&args.area))), &rows)?;
    Ok(state)
}

fn handle_terabyte(state: AppState, args: &SheetArg, ctx: &Ctx) -> Result<AppState> {
    let state = upload(state, SheetKind::Terabyte, args.file.as_deref())?;
    let listing = state.terabyte_listing()?;
    preview_sheet("Confirmation listing", &listing, ctx.rows());
    ctx.export_table("terabyte_listing", &listing)?;
    let summary = state.terabyte_summary()?;
    for branch in &summary {
        preview_table(
            &format!("Branch {}", branch.branch_code),
            Some(
                format!(
                    "{} receipts, amount {}",
                    format_int(branch.total_receipts),
                    format_number(branch.total_amount, 2)
                )
                .as_str(),
            ),
            &branch.by_date,
            ctx.rows(),
        );
    }
    write_json(&ctx.out("terabyte_summary.json"), &summary)?;
    Ok(state)
}

fn handle_cheque(state: AppState, args: &ChequeArgs, ctx: &Ctx) -> Result<AppState> {
    let state = upload(state, SheetKind::Cheque, args.file.as_deref())?;
    let saved = FlagStore::load(&ctx.config.flag_store)?;
    let mut view = state.cheque_view(ctx.as_of, &saved)?;
    for raw in &args.edits {
        let (sanction, field, value) = parse_edit(raw)?;
        let edited = edit_flag(&mut view, &sanction, field, &value);
        info!(sanction = sanction.as_str(), edited, "applied flag edit");
    }

    preview_table("Cheque-wise list", None, &view, ctx.rows());
    write_csv(&ctx.out("cheque_view.csv"), &view)?;
    let summary = risk_summary(&view, ctx.label());
    preview_table("Risk by branch", None, &summary, ctx.rows() + 1);
    write_csv(&ctx.out("risk_summary.csv"), &summary)?;
    for (branch, rows) in by_branch(&view) {
        write_csv(
            &ctx.out("cheque_by_branch").join(format!("cheque_{}.csv", file_safe(&branch))),
            &rows,
        )?;
    }
    if args.save_flags {
        let store = flags_from_view(&view);
        store.save(&ctx.config.flag_store)?;
        println!(
            "Saved flags for {} tranches to {}",
            format_int(store.len()),
            ctx.config.flag_store.display()
        );
    }
    Ok(state)
}

fn handle_targets(state: AppState, args: &TargetArgs, ctx: &Ctx) -> Result<AppState> {
    let state = upload(state, SheetKind::Targets, args.targets.as_deref())?;
    let state = upload(state, SheetKind::Achievements, args.achievements.as_deref())?;
    let report = state.target_report()?;
    let table = report.to_table();
    preview_sheet("Target vs achievement", &table, ctx.rows());
    ctx.export_table("target_variance", &table)?;
    Ok(state)
}

fn handle_merge(state: AppState, args: &MergeArgs, ctx: &Ctx) -> Result<AppState> {
    let outcome = merge_due_lists(&args.files)?;
    for p in &outcome.missing_sanction_files {
        println!("Skipped (no sanction number column): {}", p.display());
    }
    println!(
        "Merged {} files, {} rows.",
        format_int(outcome.merged_files.len()),
        format_int(outcome.table.len())
    );
    let merged = match &args.branches {
        Some(p) => branch_recon::enrich::with_branch_names(&outcome.table, &load_csv(p, 0)?)?,
        None => outcome.table,
    };
    preview_sheet("Merged due list", &merged, ctx.rows());
    ctx.export_table("merged_due_list", &merged)?;
    Ok(state)
}

fn handle_enrich(state: AppState, args: &EnrichArgs, ctx: &Ctx) -> Result<AppState> {
    let state = upload(state, SheetKind::DoList, args.due.as_deref())?;
    let state = upload(state, SheetKind::Branches, args.branches.as_deref())?;
    let enriched = state.enriched_due_list()?;
    preview_sheet("Due list with branch names", &enriched, ctx.rows());
    ctx.export_table("due_list_enriched", &enriched)?;
    Ok(state)
}

fn handle_register(state: AppState, args: &SheetArg, ctx: &Ctx) -> Result<AppState> {
    let state = upload(state, SheetKind::Disbursement, args.file.as_deref())?;
    let register = state.register()?;
    for (branch, entries) in &register {
        preview_table(
            &format!("Disbursement register: {}", branch),
            Some(format!("{} entries", format_int(entries.len())).as_str()),
            entries,
            ctx.rows(),
        );
        write_csv(
            &ctx.out("register").join(format!("register_{}.csv", file_safe(branch))),
            entries,
        )?;
    }
    Ok(state)
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(session) = cli.session {
        config.session_file = session;
    }
    let ctx = Ctx {
        as_of: cli.as_of.unwrap_or_else(|| Local::now().date_naive()),
        xlsx: cli.xlsx,
        config,
    };
    info!(as_of = %ctx.as_of, output_dir = %ctx.config.output_dir.display(), "starting");

    let state = if cli.no_session {
        AppState::new()
    } else {
        AppState::load(&ctx.config.session_file)?
    };
    let state = match &cli.command {
        Command::Overdue(a) => handle_overdue(state, a, &ctx)?,
        Command::Recovery(a) => handle_recovery(state, a, &ctx)?,
        Command::Ranges(a) => handle_ranges(state, a, &ctx)?,
        Command::Pivot(a) => handle_pivot(state, a, &ctx)?,
        Command::Mdp(a) => handle_mdp(state, a, &ctx)?,
        Command::Terabyte(a) => handle_terabyte(state, a, &ctx)?,
        Command::Cheque(a) => handle_cheque(state, a, &ctx)?,
        Command::Targets(a) => handle_targets(state, a, &ctx)?,
        Command::Merge(a) => handle_merge(state, a, &ctx)?,
        Command::Enrich(a) => handle_enrich(state, a, &ctx)?,
        Command::Register(a) => handle_register(state, a, &ctx)?,
    };
    if !cli.no_session {
        state.save(&ctx.config.session_file)?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_edits_parse() {
        let (s, f, v) = parse_edit("S1:house_complete=Yes").unwrap();
        assert_eq!((s.as_str(), f, v.as_str()), ("S1", FlagField::HouseComplete, "Yes"));
        assert!(parse_edit("S1=Yes").is_err());
        assert!(parse_edit(":design=A").is_err());
    }

    #[test]
    fn long_sheet_names_are_cut() {
        assert_eq!(sheet_name("short"), "short");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "branch_recon", "cheque", "--file", "c.csv", "--set", "S1:shifted=Yes", "--as-of", "2024-06-15",
        ])
        .unwrap();
        assert_eq!(cli.as_of, NaiveDate::from_ymd_opt(2024, 6, 15));
        match cli.command {
            Command::Cheque(a) => assert_eq!(a.edits, vec!["S1:shifted=Yes"]),
            _ => panic!("expected cheque"),
        }
    }
}
