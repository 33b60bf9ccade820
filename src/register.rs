// Per-branch listings handed to the document renderer: the disbursement
// register, the overdue call list and the recovery receipt list.
use crate::error::{ReconError, Result};
use crate::normalize::trim_headers;
use crate::reconcile::group_by_branch;
use crate::records::{RecoveryRecord, NAME, SANCTION_NO};
use crate::table::Table;
use crate::util::amount_or_zero;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::Tabled;

/// Column spellings fixed before the register's required-column check.
const REGISTER_RENAMES: &[(&str, &str)] = &[
    ("date_disbursed", "date_disburse"),
    ("date_of_disbursement", "date_disburse"),
    ("tranch_no", "tranch"),
    ("grouo_no", "group_no"),
];

const REGISTER_COLUMNS: &[&str] = &[
    "branch_id",
    "member_name",
    "member_cnic",
    "loan_amount",
    "tranch",
    "cheque_no",
    "sanction_no",
    "group_no",
    "date_disburse",
];

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct RegisterEntry {
    #[serde(rename = "Date Disburse")]
    #[tabled(rename = "Date Disburse")]
    pub date_disburse: String,
    #[serde(rename = "Sanction No")]
    #[tabled(rename = "Sanction No")]
    pub sanction_no: String,
    #[serde(rename = "Tranch")]
    #[tabled(rename = "Tranch")]
    pub tranch: String,
    #[serde(rename = "Cheque No")]
    #[tabled(rename = "Cheque No")]
    pub cheque_no: String,
    #[serde(rename = "Loan Amount")]
    #[tabled(rename = "Loan Amount")]
    pub loan_amount: String,
    #[serde(rename = "Group No")]
    #[tabled(rename = "Group No")]
    pub group_no: String,
    #[serde(rename = "Member Name")]
    #[tabled(rename = "Member Name")]
    pub member_name: String,
    #[serde(rename = "CNIC")]
    #[tabled(rename = "CNIC")]
    pub cnic: String,
}

/// Disbursement register split by branch. Values are passed through as
/// written; only the column spellings are fixed.
pub fn disbursement_register(raw: &Table) -> Result<BTreeMap<String, Vec<RegisterEntry>>> {
    let mut table = raw.clone();
    trim_headers(&mut table);
    for (from, to) in REGISTER_RENAMES {
        if table.has_column(to) {
            continue;
        }
        if let Some(idx) = table.column_index(from) {
            table.set_column_name(idx, to.to_string());
        }
    }
    let missing: Vec<String> = REGISTER_COLUMNS
        .iter()
        .filter(|c| !table.has_column(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ReconError::missing("Disbursement Sheet", missing));
    }

    let mut out: BTreeMap<String, Vec<RegisterEntry>> = BTreeMap::new();
    for (branch, rows) in group_by_branch(&table) {
        let entries = rows
            .rows()
            .map(|r| RegisterEntry {
                date_disburse: r.get("date_disburse").to_string(),
                sanction_no: r.get("sanction_no").to_string(),
                tranch: r.get("tranch").to_string(),
                cheque_no: r.get("cheque_no").to_string(),
                loan_amount: r.get("loan_amount").to_string(),
                group_no: r.get("group_no").to_string(),
                member_name: r.get("member_name").to_string(),
                cnic: r.get("member_cnic").to_string(),
            })
            .collect();
        out.insert(branch, entries);
    }
    Ok(out)
}

const MOBILE_NO: &str = "Mobile No";

/// Overdue call list per branch: serial number, name, sanction number and,
/// when the sheet has it, the mobile number.
pub fn overdue_listing(overdue: &Table) -> BTreeMap<String, Table> {
    let with_mobile = overdue.has_column(MOBILE_NO);
    group_by_branch(overdue)
        .into_iter()
        .map(|(branch, rows)| {
            let mut columns = vec!["Sr#".to_string(), NAME.to_string(), SANCTION_NO.to_string()];
            if with_mobile {
                columns.push(MOBILE_NO.to_string());
            }
            let mut listing = Table::new(columns);
            for (i, r) in rows.rows().enumerate() {
                let mut cells = vec![
                    (i + 1).to_string(),
                    r.get(NAME).to_string(),
                    r.get(SANCTION_NO).to_string(),
                ];
                if with_mobile {
                    cells.push(r.get(MOBILE_NO).to_string());
                }
                listing.push_row(cells);
            }
            (branch, listing)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryListing {
    pub rows: Table,
    pub total_amount: f64,
}

/// Recovery receipts per branch (`Sr#`, date as `dd-mm-yy`, amount, name,
/// sanction number) with the branch's total amount.
pub fn recovery_listing(records: &[RecoveryRecord]) -> BTreeMap<String, RecoveryListing> {
    let mut out: BTreeMap<String, RecoveryListing> = BTreeMap::new();
    for r in records {
        let listing = out.entry(r.branch_id.clone()).or_insert_with(|| RecoveryListing {
            rows: Table::new(
                ["Sr#", "Date", "amount", NAME, SANCTION_NO]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            ),
            total_amount: 0.0,
        });
        let serial = listing.rows.len() + 1;
        listing.rows.push_row(vec![
            serial.to_string(),
            r.recovery_date
                .map(|d| d.format("%d-%m-%y").to_string())
                .unwrap_or_default(),
            r.amount.to_string(),
            r.name.clone(),
            r.sanction_no.clone(),
        ]);
        listing.total_amount += r.amount;
    }
    out
}

/// Sum a money column of a listing table, treating unreadable cells as 0.
pub fn column_total(table: &Table, column: &str) -> f64 {
    table
        .column_values(column)
        .into_iter()
        .map(|v| amount_or_zero(v, column))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecoveryRecord;

    #[test]
    fn register_fixes_spellings_and_splits_branches() {
        let raw = Table::from_rows(
            &[
                "branch_id", "member_name", "member_cnic", "loan_amount", "tranch_no",
                "cheque_no", "sanction_no", "grouo_no", "date_of_disbursement",
            ],
            vec![
                vec!["B1", "Ali", "1", "5000", "1", "C1", "S1", "G1", "2024-01-01"],
                vec!["B2", "Sara", "2", "7000", "2", "C2", "S2", "G2", "2024-01-02"],
            ],
        );
        let reg = disbursement_register(&raw).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg["B1"][0].group_no, "G1");
        assert_eq!(reg["B2"][0].date_disburse, "2024-01-02");
    }

    #[test]
    fn register_lists_missing_columns() {
        let raw = Table::from_rows(&["branch_id", "sanction_no"], vec![]);
        let err = disbursement_register(&raw).unwrap_err().to_string();
        assert!(err.contains("cheque_no"));
        assert!(err.contains("date_disburse"));
    }

    #[test]
    fn overdue_listing_numbers_per_branch() {
        let overdue = Table::from_rows(
            &["Sanction No", "branch_id", "Name", "Mobile No"],
            vec![
                vec!["A1", "B1", "Ali", "0300"],
                vec!["A2", "B1", "Sara", ""],
                vec!["A3", "", "Omar", ""],
            ],
        );
        let lists = overdue_listing(&overdue);
        assert_eq!(lists["B1"].column_values("Sr#"), vec!["1", "2"]);
        assert_eq!(lists["Unknown"].row(0).get("Name"), "Omar");
        assert!(lists["B1"].has_column("Mobile No"));
    }

    #[test]
    fn recovery_listing_totals_amounts() {
        let raw = Table::from_rows(
            &["Sanction No", "branch_id", "recovery_date", "amount", "Name"],
            vec![
                vec!["A1", "B1", "2024-05-03", "100", "Ali"],
                vec!["A2", "B1", "", "abc", "Sara"],
                vec!["A3", "B2", "2024-05-04", "50.5", "Omar"],
            ],
        );
        let records = RecoveryRecord::from_table(&raw).unwrap();
        let lists = recovery_listing(&records);
        assert_eq!(lists["B1"].total_amount, 100.0);
        assert_eq!(lists["B1"].rows.row(0).get("Date"), "03-05-24");
        assert_eq!(lists["B1"].rows.row(1).get("Date"), "");
        assert_eq!(lists["B2"].total_amount, 50.5);
        assert_eq!(column_total(&lists["B2"].rows, "amount"), 50.5);
    }
}
