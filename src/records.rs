// Typed records built from normalized tables.
//
// Each sheet has a `Schema` describing its canonical columns. Building a
// record collection always goes through `normalize` first, so a missing key
// column fails here, before any aggregation starts.
use crate::error::Result;
use crate::normalize::{normalize, normalize_key, ColumnSpec, Schema};
use crate::table::{Row, Table};
use crate::util::{amount_or_zero, date_or_none};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const SANCTION_NO: &str = "Sanction No";
pub const BRANCH_ID: &str = "branch_id";
pub const AREA_ID: &str = "area_id";
pub const AMOUNT: &str = "amount";
pub const DATE_DISBURSED: &str = "date_disbursed";
pub const RECOVERY_DATE: &str = "recovery_date";
pub const RECEIPT_NO: &str = "receipt_no";
pub const PROJECT: &str = "project";
pub const NAME: &str = "Name";

/// Branch label used when a record carries no branch at all.
pub const UNKNOWN_BRANCH: &str = "Unknown";

const SANCTION_ALIASES: &[&str] = &["sanction_no", "sanctionno", "sanctionnumber", "sactionno"];
const BRANCH_ALIASES: &[&str] = &["Branch", "Branch Code", "branchcode"];
const AREA_ALIASES: &[&str] = &["Area", "areaid"];

/// Do List / disbursement sheet, also used for the Active sheet.
pub const LOAN_SCHEMA: Schema = Schema {
    sheet: "Do List",
    columns: &[
        ColumnSpec::required(SANCTION_NO, SANCTION_ALIASES),
        ColumnSpec::optional(BRANCH_ID, BRANCH_ALIASES, ""),
        ColumnSpec::optional(AREA_ID, AREA_ALIASES, ""),
        ColumnSpec::optional(AMOUNT, &["loan_amount", "Amount", "Due Amount"], "0"),
        ColumnSpec::optional(
            DATE_DISBURSED,
            &["date_of_disbursement", "date_disburse", "Disbursement Date"],
            "",
        ),
    ],
};

pub const ACTIVE_SCHEMA: Schema = Schema {
    sheet: "Active Sheet",
    columns: LOAN_SCHEMA.columns,
};

/// MDP sheet: same shape as the loan sheet, but its money column is the
/// due amount.
pub const MDP_SCHEMA: Schema = Schema {
    sheet: "MDP Sheet",
    columns: &[
        ColumnSpec::required(SANCTION_NO, SANCTION_ALIASES),
        ColumnSpec::required(BRANCH_ID, BRANCH_ALIASES),
        ColumnSpec::optional(AREA_ID, AREA_ALIASES, ""),
        ColumnSpec::optional(AMOUNT, &["Due Amount", "due_amount", "Amount"], "0"),
        ColumnSpec::optional(DATE_DISBURSED, &[], ""),
    ],
};

pub const RECOVERY_SCHEMA: Schema = Schema {
    sheet: "Recovery File",
    columns: &[
        ColumnSpec::required(SANCTION_NO, SANCTION_ALIASES),
        ColumnSpec::optional(BRANCH_ID, BRANCH_ALIASES, ""),
        ColumnSpec::optional(AREA_ID, AREA_ALIASES, ""),
        ColumnSpec::optional(RECOVERY_DATE, &["Recovery Date"], ""),
        ColumnSpec::optional(AMOUNT, &["Amount", "Credit Amount"], "0"),
        ColumnSpec::optional(RECEIPT_NO, &["Receipt No", "receiptno"], ""),
        ColumnSpec::optional(PROJECT, &["Project", "Project Name"], ""),
        ColumnSpec::optional(NAME, &["member_name"], ""),
    ],
};

pub const CREDIT_AMOUNT: &str = "Credit Amount";
pub const BRANCH_CODE: &str = "Branch Code";
pub const CONF_RECOVERY_DATE: &str = "Recovery Date";
pub const CONF_RECEIPT_NO: &str = "Receipt No";

/// Confirmation ("terabyte") sheet. Every column is required.
pub const CONFIRMATION_SCHEMA: Schema = Schema {
    sheet: "Terabyte File",
    columns: &[
        ColumnSpec::required(SANCTION_NO, SANCTION_ALIASES),
        ColumnSpec::required(CONF_RECOVERY_DATE, &[]),
        ColumnSpec::required(CONF_RECEIPT_NO, &[]),
        ColumnSpec::required(CREDIT_AMOUNT, &[]),
        ColumnSpec::required(BRANCH_CODE, &[]),
    ],
};

/// Anything that can take part in a key-based reconciliation.
pub trait Keyed {
    fn sanction_no(&self) -> &str;
    fn branch_id(&self) -> &str;
    fn area_id(&self) -> &str;
    fn amount(&self) -> f64;

    fn key(&self) -> String {
        normalize_key(self.sanction_no())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub sanction_no: String,
    pub branch_id: String,
    pub area_id: String,
    pub amount: f64,
    pub date_disbursed: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub sanction_no: String,
    pub branch_id: String,
    pub area_id: String,
    pub recovery_date: Option<NaiveDate>,
    pub amount: f64,
    pub receipt_no: String,
    pub project: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    pub sanction_no: String,
    pub recovery_date: Option<NaiveDate>,
    pub receipt_no: String,
    pub credit_amount: f64,
    pub branch_code: String,
}

/// Trimmed branch value, bucketed under `"Unknown"` when blank.
pub fn branch_or_unknown(raw: &str) -> String {
    let b = raw.trim();
    if b.is_empty() {
        UNKNOWN_BRANCH.to_string()
    } else {
        b.to_string()
    }
}

impl LoanRecord {
    fn from_row(row: &Row<'_>) -> Self {
        LoanRecord {
            sanction_no: row.get(SANCTION_NO).trim().to_string(),
            branch_id: branch_or_unknown(row.get(BRANCH_ID)),
            area_id: row.get(AREA_ID).trim().to_string(),
            amount: amount_or_zero(row.get(AMOUNT), AMOUNT),
            date_disbursed: date_or_none(row.get(DATE_DISBURSED), DATE_DISBURSED),
        }
    }

    pub fn from_table(raw: &Table) -> Result<Vec<LoanRecord>> {
        Self::with_schema(raw, &LOAN_SCHEMA)
    }

    pub fn with_schema(raw: &Table, schema: &Schema) -> Result<Vec<LoanRecord>> {
        let table = normalize(raw, schema)?;
        Ok(table.rows().map(|r| LoanRecord::from_row(&r)).collect())
    }
}

impl RecoveryRecord {
    fn from_row(row: &Row<'_>) -> Self {
        RecoveryRecord {
            sanction_no: row.get(SANCTION_NO).trim().to_string(),
            branch_id: branch_or_unknown(row.get(BRANCH_ID)),
            area_id: row.get(AREA_ID).trim().to_string(),
            recovery_date: date_or_none(row.get(RECOVERY_DATE), RECOVERY_DATE),
            amount: amount_or_zero(row.get(AMOUNT), AMOUNT),
            receipt_no: row.get(RECEIPT_NO).trim().to_string(),
            project: row.get(PROJECT).trim().to_string(),
            name: row.get(NAME).trim().to_string(),
        }
    }

    pub fn from_table(raw: &Table) -> Result<Vec<RecoveryRecord>> {
        let table = normalize(raw, &RECOVERY_SCHEMA)?;
        Ok(table.rows().map(|r| RecoveryRecord::from_row(&r)).collect())
    }
}

impl ConfirmationRecord {
    pub fn from_table(raw: &Table) -> Result<Vec<ConfirmationRecord>> {
        let table = normalize(raw, &CONFIRMATION_SCHEMA)?;
        Ok(table
            .rows()
            .map(|r| ConfirmationRecord {
                sanction_no: r.get(SANCTION_NO).trim().to_string(),
                recovery_date: date_or_none(r.get(CONF_RECOVERY_DATE), CONF_RECOVERY_DATE),
                receipt_no: r.get(CONF_RECEIPT_NO).trim().to_string(),
                credit_amount: amount_or_zero(r.get(CREDIT_AMOUNT), CREDIT_AMOUNT),
                branch_code: r.get(BRANCH_CODE).trim().to_string(),
            })
            .collect())
    }
}

/// Confirmation listing as shown per branch: a serial number followed by
/// the five confirmation columns, with dates reduced to `YYYY-MM-DD`.
pub fn confirmation_listing(raw: &Table) -> Result<Table> {
    let records = ConfirmationRecord::from_table(raw)?;
    let mut out = Table::new(
        [
            "Serial No",
            SANCTION_NO,
            CONF_RECOVERY_DATE,
            CONF_RECEIPT_NO,
            CREDIT_AMOUNT,
            BRANCH_CODE,
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
    );
    for (i, r) in records.iter().enumerate() {
        out.push_row(vec![
            (i + 1).to_string(),
            r.sanction_no.clone(),
            r.recovery_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            r.receipt_no.clone(),
            r.credit_amount.to_string(),
            r.branch_code.clone(),
        ]);
    }
    Ok(out)
}

impl Keyed for ConfirmationRecord {
    fn sanction_no(&self) -> &str {
        &self.sanction_no
    }
    fn branch_id(&self) -> &str {
        &self.branch_code
    }
    fn area_id(&self) -> &str {
        ""
    }
    fn amount(&self) -> f64 {
        self.credit_amount
    }
}

impl Keyed for LoanRecord {
    fn sanction_no(&self) -> &str {
        &self.sanction_no
    }
    fn branch_id(&self) -> &str {
        &self.branch_id
    }
    fn area_id(&self) -> &str {
        &self.area_id
    }
    fn amount(&self) -> f64 {
        self.amount
    }
}

impl Keyed for RecoveryRecord {
    fn sanction_no(&self) -> &str {
        &self.sanction_no
    }
    fn branch_id(&self) -> &str {
        &self.branch_id
    }
    fn area_id(&self) -> &str {
        &self.area_id
    }
    fn amount(&self) -> f64 {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconError;

    #[test]
    fn loan_records_from_loose_headers() {
        let raw = Table::from_rows(
            &["sanction_no ", "Branch", "loan_amount", "date_of_disbursement"],
            vec![vec![" S-1 ", "B1", "25,000", "2024-01-10"], vec!["S-2", "", "x", ""]],
        );
        let recs = LoanRecord::from_table(&raw).unwrap();
        assert_eq!(recs[0].sanction_no, "S-1");
        assert_eq!(recs[0].amount, 25000.0);
        assert_eq!(recs[0].date_disbursed, NaiveDate::from_ymd_opt(2024, 1, 10));
        assert_eq!(recs[1].branch_id, UNKNOWN_BRANCH);
        assert_eq!(recs[1].amount, 0.0);
        assert_eq!(recs[1].date_disbursed, None);
    }

    #[test]
    fn confirmation_sheet_requires_all_columns() {
        let raw = Table::from_rows(&["Sanction No", "Branch Code"], vec![]);
        match ConfirmationRecord::from_table(&raw) {
            Err(ReconError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, vec!["Recovery Date", "Receipt No", "Credit Amount"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn confirmation_listing_numbers_rows() {
        let raw = Table::from_rows(
            &["Branch Code", "Sanction No", "Recovery Date", "Receipt No", "Credit Amount", "extra"],
            vec![vec!["B1", "S1", "2024-05-01 00:00:00", "R1", "1500", "x"]],
        );
        let t = confirmation_listing(&raw).unwrap();
        assert_eq!(t.columns()[0], "Serial No");
        assert!(!t.has_column("extra"));
        assert_eq!(t.row(0).get("Serial No"), "1");
        assert_eq!(t.row(0).get("Recovery Date"), "2024-05-01");
    }

    #[test]
    fn recovery_without_key_column_is_rejected() {
        let raw = Table::from_rows(&["amount"], vec![vec!["10"]]);
        let err = RecoveryRecord::from_table(&raw).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumns { .. }));
        assert!(err.to_string().contains("Sanction No"));
    }
}
