// Set reconciliation between independently uploaded sheets.
//
// `overdue(due, paid)` keeps every row of `due` whose sanction number does
// not occur in `paid`. Keys are compared through `normalize_key`, so
// spacing and case differences between sheets do not matter. Rows keep all
// of their original columns.

use crate::error::Result;
use crate::normalize::{normalize, normalize_key, ColumnSpec, Schema};
use crate::records::{branch_or_unknown, Keyed, BRANCH_ID, SANCTION_NO};
use crate::table::Table;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

const KEY_SCHEMA: &[ColumnSpec] = &[
    ColumnSpec::required(
        SANCTION_NO,
        &["sanction_no", "sanctionno", "sanctionnumber", "sactionno"],
    ),
    ColumnSpec::optional(BRANCH_ID, &["Branch", "Branch Code", "branchcode"], ""),
];

fn key_schema(sheet: &'static str) -> Schema {
    Schema {
        sheet,
        columns: KEY_SCHEMA,
    }
}

/// Keys present in a normalized table.
fn key_set(table: &Table) -> HashSet<String> {
    table
        .column_values(SANCTION_NO)
        .into_iter()
        .map(normalize_key)
        .collect()
}

/// `due \ paid` on the sanction key.
///
/// Both sides must carry a sanction column; the error names which sheet is
/// missing it.
pub fn overdue(due: &Table, paid: &Table) -> Result<Table> {
    overdue_named(due, "Do List", paid, "Recovery File")
}

/// Same as [`overdue`] with caller-chosen sheet names for error messages.
pub fn overdue_named(
    due: &Table,
    due_sheet: &'static str,
    paid: &Table,
    paid_sheet: &'static str,
) -> Result<Table> {
    let due = normalize(due, &key_schema(due_sheet))?;
    let paid = normalize(paid, &key_schema(paid_sheet))?;
    let paid_keys = key_set(&paid);
    let out = due.filter(|r| !paid_keys.contains(&normalize_key(r.get(SANCTION_NO))));
    info!(
        due = due.len(),
        paid = paid.len(),
        overdue = out.len(),
        "reconciled {} against {}",
        due_sheet,
        paid_sheet
    );
    Ok(out)
}

/// Overdue list and, when a confirmation sheet is present, the final
/// overdue list after removing rows it confirms.
#[derive(Debug, Clone)]
pub struct OverdueOutcome {
    pub overdue: Table,
    pub final_overdue: Option<Table>,
}

impl OverdueOutcome {
    /// The most reconciled list available.
    pub fn latest(&self) -> &Table {
        self.final_overdue.as_ref().unwrap_or(&self.overdue)
    }
}

pub fn cascade(due: &Table, paid: &Table, confirmed: Option<&Table>) -> Result<OverdueOutcome> {
    let first = overdue(due, paid)?;
    let final_overdue = match confirmed {
        Some(c) => Some(overdue_named(&first, "Overdue List", c, "Terabyte File")?),
        None => None,
    };
    Ok(OverdueOutcome {
        overdue: first,
        final_overdue,
    })
}

/// Typed form of the set difference, for already-validated records.
pub fn overdue_records<T, U>(due: &[T], paid: &[U]) -> Vec<T>
where
    T: Keyed + Clone,
    U: Keyed,
{
    let paid_keys: HashSet<String> = paid.iter().map(Keyed::key).collect();
    due.iter()
        .filter(|r| !paid_keys.contains(&r.key()))
        .cloned()
        .collect()
}

/// Split rows per branch. Rows without a branch land under `"Unknown"`, so
/// the per-branch tables always add up to the input.
pub fn group_by_branch(table: &Table) -> BTreeMap<String, Table> {
    let mut groups: BTreeMap<String, Table> = BTreeMap::new();
    for r in table.rows() {
        let branch = branch_or_unknown(r.get(BRANCH_ID));
        groups
            .entry(branch)
            .or_insert_with(|| Table::new(table.columns().to_vec()))
            .push_row(r.cells().to_vec());
    }
    groups
}
