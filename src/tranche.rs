// Cheque-wise (tranche) analysis.
//
// A loan is paid out in a first and optionally a second tranche. The
// first-tranche view shows, per loan, how long ago it was disbursed,
// whether the second tranche has gone out, the user's follow-up flags, and
// the derived risk level.
use crate::error::Result;
use crate::flags::{FlagField, FlagStore, Flags};
use crate::normalize::{normalize, normalize_key, ColumnSpec, Schema};
use crate::records::branch_or_unknown;
use crate::risk::{classify, days_between, months_between, RiskLevel};
use crate::rollup::{append_grand_total, Rollup};
use crate::table::Table;
use crate::util::{date_or_none, display_date, display_opt_i64, parse_i64_safe};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tabled::Tabled;
use tracing::{debug, info};

pub const SECOND_TRANCHE_OK: &str = "OK";

const HOUSE_COMPLETE: &str = "House Complete";
const SHIFTED: &str = "Shifted";
const DESIGN: &str = "Design";

pub const CHEQUE_SCHEMA: Schema = Schema {
    sheet: "Cheque-wise List",
    columns: &[
        ColumnSpec::required(
            "sanction_no",
            &["Sanction No", "sanctionno", "sanctionnumber", "sactionno"],
        ),
        ColumnSpec::required("tranch_no", &["tranch", "tranche_no", "tranche"]),
        ColumnSpec::optional("branch_id", &["Branch", "Branch Code"], ""),
        ColumnSpec::optional(
            "date_disbursed",
            &["date_of_disbursement", "date_disburse"],
            "",
        ),
        ColumnSpec::optional("member_name", &["Name"], ""),
        ColumnSpec::optional("member_cnic", &["cnic"], ""),
        ColumnSpec::optional(HOUSE_COMPLETE, &[], ""),
        ColumnSpec::optional(SHIFTED, &[], ""),
        ColumnSpec::optional(DESIGN, &[], ""),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChequeTrancheRecord {
    pub branch_id: String,
    pub sanction_no: String,
    pub tranch_no: Option<i64>,
    pub name: String,
    pub member_cnic: String,
    pub date_disbursed: Option<NaiveDate>,
    pub flags: Flags,
}

impl ChequeTrancheRecord {
    pub fn from_table(raw: &Table) -> Result<Vec<ChequeTrancheRecord>> {
        let table = normalize(raw, &CHEQUE_SCHEMA)?;
        let records: Vec<ChequeTrancheRecord> = table
            .rows()
            .map(|r| ChequeTrancheRecord {
                branch_id: branch_or_unknown(r.get("branch_id")),
                sanction_no: r.get("sanction_no").trim().to_string(),
                tranch_no: parse_i64_safe(Some(r.get("tranch_no"))),
                name: r.get("member_name").trim().to_string(),
                member_cnic: r.get("member_cnic").trim().to_string(),
                date_disbursed: date_or_none(r.get("date_disbursed"), "date_disbursed"),
                flags: Flags {
                    house_complete: r.get(HOUSE_COMPLETE).trim().to_string(),
                    shifted: r.get(SHIFTED).trim().to_string(),
                    design: r.get(DESIGN).trim().to_string(),
                },
            })
            .collect();
        let unreadable = records.iter().filter(|r| r.tranch_no.is_none()).count();
        if unreadable > 0 {
            debug!(unreadable, "cheque rows without a readable tranche number");
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct TrancheRow {
    pub branch_id: String,
    pub sanction_no: String,
    pub tranch_no: i64,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    pub member_cnic: String,
    #[tabled(display_with = "display_date")]
    pub date_disbursed: Option<NaiveDate>,
    #[serde(rename = "Months Passed")]
    #[tabled(rename = "Months Passed", display_with = "display_opt_i64")]
    pub months_passed: Option<i64>,
    #[serde(rename = "Days Passed")]
    #[tabled(rename = "Days Passed", display_with = "display_opt_i64")]
    pub days_passed: Option<i64>,
    #[serde(rename = "2nd Tranch Status")]
    #[tabled(rename = "2nd Tranch Status")]
    pub second_tranche_status: String,
    #[serde(rename = "House Complete")]
    #[tabled(rename = "House Complete")]
    pub house_complete: String,
    #[serde(rename = "Shifted")]
    #[tabled(rename = "Shifted")]
    pub shifted: String,
    #[serde(rename = "Design")]
    #[tabled(rename = "Design")]
    pub design: String,
    #[serde(rename = "Risk Level")]
    #[tabled(rename = "Risk Level")]
    pub risk_level: RiskLevel,
}

impl TrancheRow {
    pub fn flags(&self) -> Flags {
        Flags {
            house_complete: self.house_complete.clone(),
            shifted: self.shifted.clone(),
            design: self.design.clone(),
        }
    }

    /// Replace the flags (an edit from the user) and re-derive the risk.
    pub fn set_flags(&mut self, flags: Flags) {
        self.house_complete = flags.house_complete;
        self.shifted = flags.shifted;
        self.design = flags.design;
        self.risk_level = classify(self.months_passed, &self.house_complete, &self.shifted);
    }
}

/// Normalized sanction keys that have a second-tranche record.
pub fn second_tranche_keys(records: &[ChequeTrancheRecord]) -> HashSet<String> {
    records
        .iter()
        .filter(|r| r.tranch_no == Some(2))
        .map(|r| normalize_key(&r.sanction_no))
        .collect()
}

/// One row per first-tranche record, with elapsed time measured up to
/// `as_of`. Saved flags take precedence over the uploaded sheet's values;
/// blank saved values fall back to the upload.
pub fn first_tranche_view(
    records: &[ChequeTrancheRecord],
    as_of: NaiveDate,
    saved: &FlagStore,
) -> Vec<TrancheRow> {
    let second = second_tranche_keys(records);
    let rows: Vec<TrancheRow> = records
        .iter()
        .filter(|r| r.tranch_no == Some(1))
        .map(|r| {
            let flags = match saved.get(&r.sanction_no, 1) {
                Some(s) => s.clone().or(&r.flags),
                None => r.flags.clone(),
            };
            let months_passed = r.date_disbursed.map(|d| months_between(d, as_of));
            let days_passed = r.date_disbursed.map(|d| days_between(d, as_of));
            let status = if second.contains(&normalize_key(&r.sanction_no)) {
                SECOND_TRANCHE_OK.to_string()
            } else {
                String::new()
            };
            TrancheRow {
                branch_id: r.branch_id.clone(),
                sanction_no: r.sanction_no.clone(),
                tranch_no: 1,
                name: r.name.clone(),
                member_cnic: r.member_cnic.clone(),
                date_disbursed: r.date_disbursed,
                months_passed,
                days_passed,
                second_tranche_status: status,
                risk_level: classify(months_passed, &flags.house_complete, &flags.shifted),
                house_complete: flags.house_complete,
                shifted: flags.shifted,
                design: flags.design,
            }
        })
        .collect();
    info!(
        first_tranche = rows.len(),
        second_tranche = second.len(),
        "built cheque-wise view"
    );
    rows
}

/// Set one flag on every first-tranche row of `sanction_no` and re-derive
/// its risk. Returns how many rows changed.
pub fn edit_flag(rows: &mut [TrancheRow], sanction_no: &str, field: FlagField, value: &str) -> usize {
    let key = normalize_key(sanction_no);
    let mut edited = 0;
    for row in rows.iter_mut().filter(|r| normalize_key(&r.sanction_no) == key) {
        let flags = row.flags().with(field, value);
        row.set_flags(flags);
        edited += 1;
    }
    if edited == 0 {
        debug!(sanction_no, "flag edit matched no first-tranche row");
    }
    edited
}

/// Flag store holding exactly the flags of `rows`, ready to overwrite the
/// saved file.
pub fn flags_from_view(rows: &[TrancheRow]) -> FlagStore {
    let mut store = FlagStore::new();
    for r in rows {
        store.set(&r.sanction_no, r.tranch_no, r.flags());
    }
    store
}

pub fn by_branch(rows: &[TrancheRow]) -> BTreeMap<String, Vec<TrancheRow>> {
    let mut out: BTreeMap<String, Vec<TrancheRow>> = BTreeMap::new();
    for r in rows {
        out.entry(r.branch_id.clone()).or_default().push(r.clone());
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct RiskSummaryRow {
    #[serde(rename = "Branch")]
    #[tabled(rename = "Branch")]
    pub branch: String,
    #[serde(rename = "High")]
    #[tabled(rename = "High")]
    pub high: u64,
    #[serde(rename = "Medium")]
    #[tabled(rename = "Medium")]
    pub medium: u64,
    #[serde(rename = "Low")]
    #[tabled(rename = "Low")]
    pub low: u64,
    #[serde(rename = "No Risk")]
    #[tabled(rename = "No Risk")]
    pub no_risk: u64,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: u64,
}

impl RiskSummaryRow {
    fn empty(branch: String) -> Self {
        RiskSummaryRow {
            branch,
            high: 0,
            medium: 0,
            low: 0,
            no_risk: 0,
            total: 0,
        }
    }

    fn count(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::High => self.high += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::Low => self.low += 1,
            RiskLevel::NoRisk => self.no_risk += 1,
        }
    }
}

impl Rollup for RiskSummaryRow {
    fn absorb(&mut self, other: &Self) {
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
        self.no_risk += other.no_risk;
    }

    fn recompute(&mut self) {
        self.total = self.high + self.medium + self.low + self.no_risk;
    }
}

/// Risk level counts per branch with a grand total row.
pub fn risk_summary(rows: &[TrancheRow], total_label: &str) -> Vec<RiskSummaryRow> {
    let mut per_branch: BTreeMap<&str, RiskSummaryRow> = BTreeMap::new();
    for r in rows {
        per_branch
            .entry(r.branch_id.as_str())
            .or_insert_with(|| RiskSummaryRow::empty(r.branch_id.clone()))
            .count(r.risk_level);
    }
    let mut out: Vec<RiskSummaryRow> = per_branch
        .into_values()
        .map(|mut r| {
            r.recompute();
            r
        })
        .collect();
    append_grand_total(&mut out, RiskSummaryRow::empty(total_label.to_string()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn sheet() -> Table {
        Table::from_rows(
            &["branch_id", "date_disbursed", "sanction_no", "tranch_no", "member_name", "member_cnic"],
            vec![
                vec!["B1", "2024-01-10", "S1", "1", "Ali", "111"],
                vec!["B1", "2024-03-01", "S1", "2", "Ali", "111"],
                vec!["B2", "2024-05-01", "S2", "1.0", "Sara", "222"],
                vec!["B2", "", "S3", "1", "Omar", "333"],
            ],
        )
    }

    #[test]
    fn second_tranche_status_marks_only_matched_loans() {
        let records = ChequeTrancheRecord::from_table(&sheet()).unwrap();
        let view = first_tranche_view(&records, as_of(), &FlagStore::new());
        assert_eq!(view.len(), 3);
        assert_eq!(view[0].sanction_no, "S1");
        assert_eq!(view[0].second_tranche_status, "OK");
        assert_eq!(view[1].second_tranche_status, "");
        assert_eq!(view[2].second_tranche_status, "");
    }

    #[test]
    fn elapsed_time_drives_risk() {
        let records = ChequeTrancheRecord::from_table(&sheet()).unwrap();
        let view = first_tranche_view(&records, as_of(), &FlagStore::new());
        assert_eq!(view[0].months_passed, Some(5));
        assert_eq!(view[0].risk_level, RiskLevel::High);
        assert_eq!(view[1].months_passed, Some(1));
        assert_eq!(view[1].days_passed, Some(45));
        assert_eq!(view[1].risk_level, RiskLevel::Low);
        assert_eq!(view[2].months_passed, None);
        assert_eq!(view[2].risk_level, RiskLevel::Low);
    }

    #[test]
    fn saved_flags_are_merged_back() {
        let records = ChequeTrancheRecord::from_table(&sheet()).unwrap();
        let mut saved = FlagStore::new();
        saved.set(
            "s1",
            1,
            Flags {
                house_complete: "Yes".into(),
                shifted: String::new(),
                design: String::new(),
            },
        );
        let view = first_tranche_view(&records, as_of(), &saved);
        assert_eq!(view[0].house_complete, "Yes");
        assert_eq!(view[0].risk_level, RiskLevel::NoRisk);

        let store = flags_from_view(&view);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("S1", 1).unwrap().house_complete, "Yes");
    }

    #[test]
    fn editing_flags_rederives_risk() {
        let records = ChequeTrancheRecord::from_table(&sheet()).unwrap();
        let mut view = first_tranche_view(&records, as_of(), &FlagStore::new());
        view[0].set_flags(Flags {
            house_complete: "No".into(),
            shifted: "Yes".into(),
            design: String::new(),
        });
        assert_eq!(view[0].risk_level, RiskLevel::NoRisk);
    }

    #[test]
    fn edits_apply_by_sanction_key() {
        let records = ChequeTrancheRecord::from_table(&sheet()).unwrap();
        let mut view = first_tranche_view(&records, as_of(), &FlagStore::new());
        assert_eq!(edit_flag(&mut view, " s1 ", FlagField::HouseComplete, "Yes"), 1);
        assert_eq!(view[0].risk_level, RiskLevel::NoRisk);
        assert_eq!(edit_flag(&mut view, "S9", FlagField::Design, "A"), 0);
    }

    #[test]
    fn risk_summary_totals() {
        let records = ChequeTrancheRecord::from_table(&sheet()).unwrap();
        let view = first_tranche_view(&records, as_of(), &FlagStore::new());
        let summary = risk_summary(&view, "Grand Total");
        assert_eq!(summary.len(), 3);
        assert_eq!((summary[0].high, summary[0].total), (1, 1));
        assert_eq!((summary[1].low, summary[1].total), (2, 2));
        let total = summary.last().unwrap();
        assert_eq!(total.branch, "Grand Total");
        assert_eq!(total.total, 3);
        assert_eq!(by_branch(&view)["B2"].len(), 2);
    }

    #[test]
    fn cheque_sheet_needs_tranche_column() {
        let raw = Table::from_rows(&["sanction_no"], vec![vec!["S1"]]);
        assert!(ChequeTrancheRecord::from_table(&raw).is_err());
    }
}
