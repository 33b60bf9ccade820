// Session state: every uploaded sheet plus the last reconciliation result.
//
// Handlers take the state by reference and return what they computed;
// uploads and reconciliation consume the state and hand back an updated
// copy. The whole object round-trips through JSON so a later run can pick
// up where the previous one stopped.

use crate::aggregate::{
    confirmation_summary, mdp_report, pivot_by_branch, range_amount_summary, range_count_summary,
    recovery_pivot, recovery_summary, recovery_this_month, BranchPivot, BranchSummaryRow,
    ConfirmationBranchSummary, MonthlyRecovery, RangeAmountRow, RangeCountRow,
};
use crate::enrich::with_branch_names;
use crate::error::{ReconError, Result};
use crate::flags::FlagStore;
use crate::loader::load_csv;
use crate::output::write_table_csv;
use crate::reconcile::{cascade, group_by_branch, OverdueOutcome};
use crate::records::{confirmation_listing, ConfirmationRecord, LoanRecord, RecoveryRecord};
use crate::register::{
    disbursement_register, overdue_listing, recovery_listing, RecoveryListing, RegisterEntry,
};
use crate::table::Table;
use crate::target::{branch_figures, merge, VarianceReport};
use crate::tranche::{first_tranche_view, ChequeTrancheRecord, TrancheRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SheetKind {
    DoList,
    Recovery,
    Terabyte,
    Active,
    Mdp,
    Cheque,
    Targets,
    Achievements,
    Branches,
    Disbursement,
}

impl SheetKind {
    pub fn label(self) -> &'static str {
        match self {
            SheetKind::DoList => "Do List",
            SheetKind::Recovery => "Recovery File",
            SheetKind::Terabyte => "Terabyte File",
            SheetKind::Active => "Active Sheet",
            SheetKind::Mdp => "MDP Sheet",
            SheetKind::Cheque => "Cheque Sheet",
            SheetKind::Targets => "Target Sheet",
            SheetKind::Achievements => "Achievement Sheet",
            SheetKind::Branches => "Branch File",
            SheetKind::Disbursement => "Disbursement Sheet",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub do_list: Option<Table>,
    pub recovery: Option<Table>,
    pub terabyte: Option<Table>,
    pub active: Option<Table>,
    pub mdp: Option<Table>,
    pub cheque: Option<Table>,
    pub targets: Option<Table>,
    pub achievements: Option<Table>,
    pub branches: Option<Table>,
    pub disbursement: Option<Table>,
    /// Most reconciled overdue list from the last [`AppState::reconcile`].
    pub overdue: Option<Table>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, kind: SheetKind) -> &mut Option<Table> {
        match kind {
            SheetKind::DoList => &mut self.do_list,
            SheetKind::Recovery => &mut self.recovery,
            SheetKind::Terabyte => &mut self.terabyte,
            SheetKind::Active => &mut self.active,
            SheetKind::Mdp => &mut self.mdp,
            SheetKind::Cheque => &mut self.cheque,
            SheetKind::Targets => &mut self.targets,
            SheetKind::Achievements => &mut self.achievements,
            SheetKind::Branches => &mut self.branches,
            SheetKind::Disbursement => &mut self.disbursement,
        }
    }

    pub fn sheet(&self, kind: SheetKind) -> Option<&Table> {
        match kind {
            SheetKind::DoList => self.do_list.as_ref(),
            SheetKind::Recovery => self.recovery.as_ref(),
            SheetKind::Terabyte => self.terabyte.as_ref(),
            SheetKind::Active => self.active.as_ref(),
            SheetKind::Mdp => self.mdp.as_ref(),
            SheetKind::Cheque => self.cheque.as_ref(),
            SheetKind::Targets => self.targets.as_ref(),
            SheetKind::Achievements => self.achievements.as_ref(),
            SheetKind::Branches => self.branches.as_ref(),
            SheetKind::Disbursement => self.disbursement.as_ref(),
        }
    }

    fn require(&self, kind: SheetKind) -> Result<&Table> {
        self.sheet(kind).ok_or(ReconError::NoData(kind.label()))
    }

    /// Replace one sheet. A new due, recovery or confirmation sheet
    /// invalidates the stored overdue list.
    pub fn with_upload(mut self, kind: SheetKind, table: Table) -> Self {
        debug!(sheet = kind.label(), rows = table.len(), "sheet uploaded");
        if matches!(kind, SheetKind::DoList | SheetKind::Recovery | SheetKind::Terabyte) {
            self.overdue = None;
        }
        *self.slot_mut(kind) = Some(table);
        self
    }

    /// Store an uploaded recovery sheet and write it to the cache file.
    pub fn with_recovery_upload(self, table: Table, cache: &Path) -> Result<Self> {
        write_table_csv(cache, &table)?;
        Ok(self.with_upload(SheetKind::Recovery, table))
    }

    /// Fill the recovery slot from the cache file when the session has none.
    pub fn with_cached_recovery(self, cache: &Path) -> Result<Self> {
        if self.recovery.is_some() {
            return Ok(self);
        }
        if !cache.exists() {
            debug!(path = %cache.display(), "no cached recovery sheet");
            return Ok(self);
        }
        let table = load_csv(cache, 0)?;
        info!(path = %cache.display(), rows = table.len(), "using cached recovery sheet");
        Ok(self.with_upload(SheetKind::Recovery, table))
    }

    pub fn load(path: &Path) -> Result<AppState> {
        if !path.exists() {
            debug!(path = %path.display(), "no saved session");
            return Ok(AppState::new());
        }
        let body = std::fs::read_to_string(path)?;
        let state: AppState = serde_json::from_str(&body)?;
        info!(path = %path.display(), "restored session");
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        debug!(path = %path.display(), "saved session");
        Ok(())
    }

    /// Due list against recoveries, then against the confirmation sheet when
    /// one is loaded. The most reconciled list is kept in the state.
    pub fn reconcile(mut self) -> Result<(Self, OverdueOutcome)> {
        let outcome = cascade(
            self.require(SheetKind::DoList)?,
            self.require(SheetKind::Recovery)?,
            self.terabyte.as_ref(),
        )?;
        self.overdue = Some(outcome.latest().clone());
        Ok((self, outcome))
    }

    pub fn overdue_by_branch(&self) -> Result<BTreeMap<String, Table>> {
        let overdue = self.overdue.as_ref().ok_or(ReconError::NoData("Overdue List"))?;
        Ok(group_by_branch(overdue))
    }

    pub fn overdue_listings(&self) -> Result<BTreeMap<String, Table>> {
        let overdue = self.overdue.as_ref().ok_or(ReconError::NoData("Overdue List"))?;
        Ok(overdue_listing(overdue))
    }

    fn due_records(&self) -> Result<Vec<LoanRecord>> {
        LoanRecord::from_table(self.require(SheetKind::DoList)?)
    }

    fn recovery_records(&self) -> Result<Vec<RecoveryRecord>> {
        RecoveryRecord::from_table(self.require(SheetKind::Recovery)?)
    }

    pub fn recovery_summary(&self, total_label: &str) -> Result<Vec<BranchSummaryRow>> {
        let due = self.due_records()?;
        let recovered = self.recovery_records()?;
        Ok(recovery_summary(&due, &recovered, total_label))
    }

    pub fn recovery_this_month(&self, as_of: NaiveDate, total_label: &str) -> Result<MonthlyRecovery> {
        let due = self.due_records()?;
        let recovered = self.recovery_records()?;
        Ok(recovery_this_month(&due, &recovered, as_of, total_label))
    }

    pub fn recovery_listings(&self) -> Result<BTreeMap<String, RecoveryListing>> {
        Ok(recovery_listing(&self.recovery_records()?))
    }

    pub fn range_amounts(&self) -> Result<Vec<RangeAmountRow>> {
        Ok(range_amount_summary(&self.recovery_records()?))
    }

    pub fn range_counts(&self, total_label: &str) -> Result<Vec<RangeCountRow>> {
        Ok(range_count_summary(&self.recovery_records()?, total_label))
    }

    pub fn pivot(&self) -> Result<Vec<BranchPivot>> {
        Ok(pivot_by_branch(&recovery_pivot(&self.recovery_records()?)))
    }

    pub fn mdp_report(&self, total_label: &str) -> Result<Vec<BranchSummaryRow>> {
        mdp_report(
            self.require(SheetKind::Active)?,
            self.require(SheetKind::Mdp)?,
            total_label,
        )
    }

    pub fn terabyte_listing(&self) -> Result<Table> {
        confirmation_listing(self.require(SheetKind::Terabyte)?)
    }

    pub fn terabyte_summary(&self) -> Result<Vec<ConfirmationBranchSummary>> {
        let records = ConfirmationRecord::from_table(self.require(SheetKind::Terabyte)?)?;
        Ok(confirmation_summary(&records))
    }

    pub fn cheque_view(&self, as_of: NaiveDate, saved: &FlagStore) -> Result<Vec<TrancheRow>> {
        let records = ChequeTrancheRecord::from_table(self.require(SheetKind::Cheque)?)?;
        Ok(first_tranche_view(&records, as_of, saved))
    }

    pub fn target_report(&self) -> Result<VarianceReport> {
        let targets = branch_figures(self.require(SheetKind::Targets)?)?;
        let achievements = match &self.achievements {
            Some(a) => branch_figures(a)?,
            None => Vec::new(),
        };
        Ok(merge(&targets, &achievements))
    }

    /// Attach branch names to the due list.
    pub fn enriched_due_list(&self) -> Result<Table> {
        with_branch_names(
            self.require(SheetKind::DoList)?,
            self.require(SheetKind::Branches)?,
        )
    }

    pub fn register(&self) -> Result<BTreeMap<String, Vec<RegisterEntry>>> {
        disbursement_register(self.require(SheetKind::Disbursement)?)
    }
}
