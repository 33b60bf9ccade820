// Grouped summaries over reference and event populations.
//
// A "coverage" summary counts, per group, how many reference rows (active
// borrowers, due list entries) have a matching event (MDP entry, recovery)
// by sanction key. Day-range and pivot summaries bucket recovery receipts by
// date. Every summary here is a pure function of its inputs.
use crate::error::Result;
use crate::records::{
    ConfirmationRecord, Keyed, LoanRecord, RecoveryRecord, ACTIVE_SCHEMA, MDP_SCHEMA,
    UNKNOWN_BRANCH,
};
use crate::rollup::{append_grand_total, Rollup};
use crate::table::Table;
use crate::util::{display_amount, display_date, display_percent, percent};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tabled::Tabled;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupBy {
    Branch,
    AreaBranch,
}

/// Where a reference row looks for its matching event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Only events in the same group count (MDP report).
    SameGroup,
    /// An event anywhere counts (recovery against the due list).
    Anywhere,
}

#[derive(Debug, Clone, Copy)]
pub struct CoverageOptions {
    pub group_by: GroupBy,
    pub scope: MatchScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct BranchSummaryRow {
    #[serde(rename = "Area")]
    #[tabled(rename = "Area")]
    pub area: String,
    #[serde(rename = "Branch")]
    #[tabled(rename = "Branch")]
    pub branch: String,
    #[serde(rename = "Due")]
    #[tabled(rename = "Due")]
    pub due: u64,
    #[serde(rename = "Amount")]
    #[tabled(rename = "Amount", display_with = "display_amount")]
    pub amount: f64,
    #[serde(rename = "Given/BY")]
    #[tabled(rename = "Given/BY")]
    pub given: u64,
    #[serde(rename = "G/P %")]
    #[tabled(rename = "G/P %", display_with = "display_percent")]
    pub gp_pct: f64,
    #[serde(rename = "MDP/Box %")]
    #[tabled(rename = "MDP/Box %", display_with = "display_percent")]
    pub mdp_box_pct: f64,
    #[serde(rename = "N/A")]
    #[tabled(rename = "N/A")]
    pub not_given: u64,
    #[serde(rename = "N/P %")]
    #[tabled(rename = "N/P %", display_with = "display_percent")]
    pub np_pct: f64,
}

impl BranchSummaryRow {
    fn new(area: String, branch: String, due: u64, given: u64, amount: f64) -> Self {
        let mut row = BranchSummaryRow {
            area,
            branch,
            due,
            amount,
            given,
            gp_pct: 0.0,
            mdp_box_pct: 0.0,
            not_given: due.saturating_sub(given),
            np_pct: 0.0,
        };
        row.recompute();
        row
    }

    /// Blank row carrying `label` in the group-identifying column: `Area`
    /// when grouped by area and branch, `Branch` otherwise.
    pub fn grand_total_shell(label: &str, group_by: GroupBy) -> Self {
        let (area, branch) = match group_by {
            GroupBy::AreaBranch => (label.to_string(), String::new()),
            GroupBy::Branch => (String::new(), label.to_string()),
        };
        BranchSummaryRow::new(area, branch, 0, 0, 0.0)
    }
}

impl Rollup for BranchSummaryRow {
    fn absorb(&mut self, other: &Self) {
        self.due += other.due;
        self.amount += other.amount;
        self.given += other.given;
        self.not_given += other.not_given;
    }

    fn recompute(&mut self) {
        let due = self.due as f64;
        self.gp_pct = percent(self.given as f64, due);
        self.mdp_box_pct = self.gp_pct;
        self.np_pct = percent(self.not_given as f64, due);
    }
}

type GroupKey = (String, String);

fn group_key(group_by: GroupBy, area: &str, branch: &str) -> GroupKey {
    match group_by {
        GroupBy::Branch => (String::new(), branch.to_string()),
        GroupBy::AreaBranch => (area.to_string(), branch.to_string()),
    }
}

/// Per-group Due / Given/BY / N/A counts of `reference` against `events`.
///
/// Groups are keyed by the events' area and branch. A reference row counts
/// toward every event group of its branch, whatever area it carries itself,
/// so area spellings on the reference side never split a branch. A branch
/// with reference rows but no events gets a group of its own, under the
/// first area seen for that branch. A group with events but no reference
/// rows gets `Due == 0` and zero percentages. Duplicate reference rows are
/// counted, not deduplicated.
pub fn coverage_summary<R, E>(
    reference: &[R],
    events: &[E],
    opts: CoverageOptions,
) -> Vec<BranchSummaryRow>
where
    R: Keyed,
    E: Keyed,
{
    let mut area_of: HashMap<&str, &str> = HashMap::new();
    for (branch, area) in events
        .iter()
        .map(|e| (e.branch_id(), e.area_id().trim()))
        .chain(reference.iter().map(|r| (r.branch_id(), r.area_id().trim())))
    {
        if !area.is_empty() {
            area_of.entry(branch).or_insert(area);
        }
    }
    let area_for = |branch: &str, own: &str| -> String {
        let own = own.trim();
        if own.is_empty() {
            area_of.get(branch).copied().unwrap_or("").to_string()
        } else {
            own.to_string()
        }
    };

    #[derive(Default)]
    struct Acc {
        due: u64,
        given: u64,
        amount: f64,
        event_keys: HashSet<String>,
    }

    let mut groups: BTreeMap<GroupKey, Acc> = BTreeMap::new();
    let mut groups_of_branch: HashMap<&str, Vec<GroupKey>> = HashMap::new();
    let mut all_event_keys: HashSet<String> = HashSet::new();
    for e in events {
        let key = group_key(
            opts.group_by,
            &area_for(e.branch_id(), e.area_id()),
            e.branch_id(),
        );
        let branch_groups = groups_of_branch.entry(e.branch_id()).or_default();
        if !branch_groups.contains(&key) {
            branch_groups.push(key.clone());
        }
        let acc = groups.entry(key).or_default();
        acc.amount += e.amount();
        acc.event_keys.insert(e.key());
        all_event_keys.insert(e.key());
    }

    for r in reference {
        let targets = match groups_of_branch.get(r.branch_id()) {
            Some(keys) => keys.clone(),
            None => vec![group_key(
                opts.group_by,
                &area_for(r.branch_id(), r.area_id()),
                r.branch_id(),
            )],
        };
        let key = r.key();
        for target in targets {
            let acc = groups.entry(target).or_default();
            acc.due += 1;
            let matched = match opts.scope {
                MatchScope::SameGroup => acc.event_keys.contains(&key),
                MatchScope::Anywhere => all_event_keys.contains(&key),
            };
            if matched {
                acc.given += 1;
            }
        }
    }

    groups
        .into_iter()
        .map(|((area, branch), acc)| BranchSummaryRow::new(area, branch, acc.due, acc.given, acc.amount))
        .collect()
}

/// MDP report: Active sheet against the MDP sheet, grouped by area and
/// branch, with a grand total row labelled in the `Area` column.
pub fn mdp_report(active: &Table, mdp: &Table, total_label: &str) -> Result<Vec<BranchSummaryRow>> {
    let reference = LoanRecord::with_schema(active, &ACTIVE_SCHEMA)?;
    let events = LoanRecord::with_schema(mdp, &MDP_SCHEMA)?;
    let opts = CoverageOptions {
        group_by: GroupBy::AreaBranch,
        scope: MatchScope::SameGroup,
    };
    let mut rows = coverage_summary(&reference, &events, opts);
    append_grand_total(
        &mut rows,
        BranchSummaryRow::grand_total_shell(total_label, GroupBy::AreaBranch),
    );
    info!(groups = rows.len() - 1, "built MDP report");
    Ok(rows)
}

/// Rows for one area, or everything for `"All Areas"`.
pub fn filter_area(rows: &[BranchSummaryRow], area: &str) -> Vec<BranchSummaryRow> {
    if area == ALL_AREAS {
        return rows.to_vec();
    }
    rows.iter().filter(|r| r.area == area).cloned().collect()
}

pub const ALL_AREAS: &str = "All Areas";

/// Distinct areas of a summary, sorted, excluding the grand total label.
pub fn areas(rows: &[BranchSummaryRow], total_label: &str) -> Vec<String> {
    let mut out: Vec<String> = rows
        .iter()
        .map(|r| r.area.clone())
        .filter(|a| a != total_label)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    out.sort();
    out
}

/// Due list against recovery receipts, per branch, with grand total.
pub fn recovery_summary<E: Keyed>(
    due: &[LoanRecord],
    recovered: &[E],
    total_label: &str,
) -> Vec<BranchSummaryRow> {
    let opts = CoverageOptions {
        group_by: GroupBy::Branch,
        scope: MatchScope::Anywhere,
    };
    let due_branches: HashSet<&str> = due.iter().map(|d| d.branch_id.as_str()).collect();
    let mut rows: Vec<BranchSummaryRow> = coverage_summary(due, recovered, opts)
        .into_iter()
        .filter(|r| due_branches.contains(r.branch.as_str()))
        .collect();
    append_grand_total(
        &mut rows,
        BranchSummaryRow::grand_total_shell(total_label, GroupBy::Branch),
    );
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRecovery {
    pub summary: Vec<BranchSummaryRow>,
    pub due_entries: usize,
    pub recoveries_this_month: usize,
    pub matched_recoveries: usize,
}

/// Recovery summary restricted to receipts dated in the month of `as_of`.
/// Receipts without a parseable date never count as this month's.
pub fn recovery_this_month(
    due: &[LoanRecord],
    recovery: &[RecoveryRecord],
    as_of: NaiveDate,
    total_label: &str,
) -> MonthlyRecovery {
    let this_month: Vec<&RecoveryRecord> = recovery
        .iter()
        .filter(|r| {
            r.recovery_date
                .map(|d| d.year() == as_of.year() && d.month() == as_of.month())
                .unwrap_or(false)
        })
        .collect();
    let due_keys: HashSet<String> = due.iter().map(Keyed::key).collect();
    let matched: Vec<RecoveryRecord> = this_month
        .iter()
        .filter(|r| due_keys.contains(&r.key()))
        .map(|r| (*r).clone())
        .collect();
    debug!(
        this_month = this_month.len(),
        matched = matched.len(),
        "filtered recoveries for {}",
        as_of.format("%Y-%m")
    );
    MonthlyRecovery {
        summary: recovery_summary(due, &matched, total_label),
        due_entries: due.len(),
        recoveries_this_month: this_month.len(),
        matched_recoveries: matched.len(),
    }
}

/// Fixed day-of-month buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayRange {
    Early,
    Mid,
    Late,
}

impl DayRange {
    pub const ALL: [DayRange; 3] = [DayRange::Early, DayRange::Mid, DayRange::Late];

    pub fn of_day(day: u32) -> Option<DayRange> {
        match day {
            1..=10 => Some(DayRange::Early),
            11..=20 => Some(DayRange::Mid),
            21..=31 => Some(DayRange::Late),
            _ => None,
        }
    }

    pub fn of_date(date: NaiveDate) -> DayRange {
        // chrono days are always 1..=31
        DayRange::of_day(date.day()).unwrap_or(DayRange::Late)
    }

    pub fn label(self) -> &'static str {
        match self {
            DayRange::Early => "1-10",
            DayRange::Mid => "11-20",
            DayRange::Late => "21-31",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct RangeAmountRow {
    pub branch_id: String,
    pub range: String,
    #[tabled(display_with = "display_amount")]
    pub amount: f64,
    pub receipts: u64,
    #[tabled(display_with = "display_percent")]
    pub percentage: f64,
}

/// Amount and receipt count per `(branch, day range)`, with each range's
/// share of the branch's total amount. Receipts without a valid date are
/// dropped before grouping.
pub fn range_amount_summary(records: &[RecoveryRecord]) -> Vec<RangeAmountRow> {
    let mut cells: BTreeMap<(String, DayRange), (f64, u64)> = BTreeMap::new();
    let mut branch_totals: HashMap<String, f64> = HashMap::new();
    for r in records {
        let Some(date) = r.recovery_date else { continue };
        let cell = cells
            .entry((r.branch_id.clone(), DayRange::of_date(date)))
            .or_insert((0.0, 0));
        cell.0 += r.amount;
        if !r.receipt_no.is_empty() {
            cell.1 += 1;
        }
        *branch_totals.entry(r.branch_id.clone()).or_insert(0.0) += r.amount;
    }
    cells
        .into_iter()
        .map(|((branch, range), (amount, receipts))| {
            let total = branch_totals.get(&branch).copied().unwrap_or(0.0);
            RangeAmountRow {
                percentage: percent(amount, total),
                branch_id: branch,
                range: range.label().to_string(),
                amount,
                receipts,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct RangeCountRow {
    #[serde(rename = "Area")]
    #[tabled(rename = "Area")]
    pub area: String,
    #[serde(rename = "Branch")]
    #[tabled(rename = "Branch")]
    pub branch: String,
    #[serde(rename = "Recovery 1-10")]
    #[tabled(rename = "Recovery 1-10")]
    pub early: u64,
    #[serde(rename = "Recovery 11-20")]
    #[tabled(rename = "Recovery 11-20")]
    pub mid: u64,
    #[serde(rename = "Recovery 21-31")]
    #[tabled(rename = "Recovery 21-31")]
    pub late: u64,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: u64,
    #[serde(rename = "1-10 %")]
    #[tabled(rename = "1-10 %", display_with = "display_percent")]
    pub early_pct: f64,
    #[serde(rename = "11-20 %")]
    #[tabled(rename = "11-20 %", display_with = "display_percent")]
    pub mid_pct: f64,
    #[serde(rename = "21-31 %")]
    #[tabled(rename = "21-31 %", display_with = "display_percent")]
    pub late_pct: f64,
}

impl RangeCountRow {
    fn new(area: String, branch: String, counts: [u64; 3]) -> Self {
        let mut row = RangeCountRow {
            area,
            branch,
            early: counts[0],
            mid: counts[1],
            late: counts[2],
            total: 0,
            early_pct: 0.0,
            mid_pct: 0.0,
            late_pct: 0.0,
        };
        row.recompute();
        row
    }

    pub fn grand_total_shell(label: &str) -> Self {
        RangeCountRow::new(String::new(), label.to_string(), [0; 3])
    }
}

impl Rollup for RangeCountRow {
    fn absorb(&mut self, other: &Self) {
        self.early += other.early;
        self.mid += other.mid;
        self.late += other.late;
    }

    fn recompute(&mut self) {
        self.total = self.early + self.mid + self.late;
        let total = self.total as f64;
        self.early_pct = percent(self.early as f64, total);
        self.mid_pct = percent(self.mid as f64, total);
        self.late_pct = percent(self.late as f64, total);
    }
}

/// Receipt counts per branch in each day range, with a grand total row.
/// Receipts whose date failed to parse are excluded entirely.
pub fn range_count_summary(records: &[RecoveryRecord], total_label: &str) -> Vec<RangeCountRow> {
    let mut counts: BTreeMap<String, [u64; 3]> = BTreeMap::new();
    let mut area_of: HashMap<String, String> = HashMap::new();
    let mut dropped = 0usize;
    for r in records {
        let Some(date) = r.recovery_date else {
            dropped += 1;
            continue;
        };
        counts.entry(r.branch_id.clone()).or_insert([0; 3])[DayRange::of_date(date).slot()] += 1;
        if !r.area_id.is_empty() {
            area_of
                .entry(r.branch_id.clone())
                .or_insert_with(|| r.area_id.clone());
        }
    }
    if dropped > 0 {
        debug!(dropped, "receipts without a valid date left out of range summary");
    }
    let mut rows: Vec<RangeCountRow> = counts
        .into_iter()
        .map(|(branch, c)| {
            let area = area_of.get(&branch).cloned().unwrap_or_default();
            RangeCountRow::new(area, branch, c)
        })
        .collect();
    append_grand_total(&mut rows, RangeCountRow::grand_total_shell(total_label));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct PivotRow {
    pub branch_id: String,
    pub project: String,
    pub recovery_date: NaiveDate,
    #[serde(rename = "Receipts")]
    #[tabled(rename = "Receipts")]
    pub receipts: u64,
    #[serde(rename = "Amount")]
    #[tabled(rename = "Amount", display_with = "display_amount")]
    pub amount: f64,
}

/// `(branch, project, date)` pivot of receipts and amounts.
pub fn recovery_pivot(records: &[RecoveryRecord]) -> Vec<PivotRow> {
    let mut cells: BTreeMap<(String, String, NaiveDate), (u64, f64)> = BTreeMap::new();
    for r in records {
        let Some(date) = r.recovery_date else { continue };
        let cell = cells
            .entry((r.branch_id.clone(), r.project.clone(), date))
            .or_insert((0, 0.0));
        if !r.receipt_no.is_empty() {
            cell.0 += 1;
        }
        cell.1 += r.amount;
    }
    cells
        .into_iter()
        .map(|((branch_id, project, recovery_date), (receipts, amount))| PivotRow {
            branch_id,
            project,
            recovery_date,
            receipts,
            amount,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectPivot {
    pub project: String,
    pub rows: Vec<PivotRow>,
    pub receipts: u64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchPivot {
    pub branch_id: String,
    pub projects: Vec<ProjectPivot>,
    pub receipts: u64,
    pub amount: f64,
}

/// Nest pivot rows per branch and project with subtotals, as printed on the
/// per-branch recovery document.
pub fn pivot_by_branch(rows: &[PivotRow]) -> Vec<BranchPivot> {
    let mut nested: BTreeMap<&str, BTreeMap<&str, Vec<PivotRow>>> = BTreeMap::new();
    for r in rows {
        nested
            .entry(r.branch_id.as_str())
            .or_default()
            .entry(r.project.as_str())
            .or_default()
            .push(r.clone());
    }
    nested
        .into_iter()
        .map(|(branch, projects)| {
            let projects: Vec<ProjectPivot> = projects
                .into_iter()
                .map(|(project, rows)| ProjectPivot {
                    project: project.to_string(),
                    receipts: rows.iter().map(|r| r.receipts).sum(),
                    amount: rows.iter().map(|r| r.amount).sum(),
                    rows,
                })
                .collect();
            BranchPivot {
                branch_id: branch.to_string(),
                receipts: projects.iter().map(|p| p.receipts).sum(),
                amount: projects.iter().map(|p| p.amount).sum(),
                projects,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct DateSummaryRow {
    #[serde(rename = "Recovery Date")]
    #[tabled(rename = "Recovery Date", display_with = "display_date")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "Receipts Count")]
    #[tabled(rename = "Receipts Count")]
    pub receipts: u64,
    #[serde(rename = "Amount Sum")]
    #[tabled(rename = "Amount Sum", display_with = "display_amount")]
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationBranchSummary {
    pub branch_code: String,
    pub total_receipts: u64,
    pub total_amount: f64,
    pub by_date: Vec<DateSummaryRow>,
}

/// Per-branch receipt totals and per-date breakdown of a confirmation
/// (terabyte) sheet.
pub fn confirmation_summary(records: &[ConfirmationRecord]) -> Vec<ConfirmationBranchSummary> {
    let mut by_branch: BTreeMap<&str, BTreeMap<Option<NaiveDate>, (u64, f64)>> = BTreeMap::new();
    for r in records {
        let cell = by_branch
            .entry(r.branch_code.as_str())
            .or_default()
            .entry(r.recovery_date)
            .or_insert((0, 0.0));
        cell.0 += 1;
        cell.1 += r.credit_amount;
    }
    by_branch
        .into_iter()
        .map(|(branch, dates)| {
            let by_date: Vec<DateSummaryRow> = dates
                .into_iter()
                .map(|(date, (receipts, amount))| DateSummaryRow {
                    date,
                    receipts,
                    amount,
                })
                .collect();
            ConfirmationBranchSummary {
                branch_code: if branch.is_empty() {
                    UNKNOWN_BRANCH.to_string()
                } else {
                    branch.to_string()
                },
                total_receipts: by_date.iter().map(|d| d.receipts).sum(),
                total_amount: by_date.iter().map(|d| d.amount).sum(),
                by_date,
            }
        })
        .collect()
}
