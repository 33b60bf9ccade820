// Attach branch and area names to a sheet that only carries sanction
// numbers. The first four characters of a sanction number are the branch
// code.

use crate::error::Result;
use crate::normalize::{normalize, require_columns, trim_headers, ColumnSpec, Schema};
use crate::table::Table;
use std::collections::HashMap;
use tracing::info;

pub const PREFIX_LEN: usize = 4;

const MERGE_KEY: &str = "sanctionno";

const BRANCH_REF_SCHEMA: Schema = Schema {
    sheet: "Branch File",
    columns: &[
        ColumnSpec::required("branch code", &[]),
        ColumnSpec::required("branch_name", &[]),
        ColumnSpec::required("area_name", &[]),
    ],
};

/// Branch code as it appears at the start of a sanction number.
pub fn sanction_prefix(sanction_no: &str) -> String {
    sanction_no.trim().chars().take(PREFIX_LEN).collect()
}

/// Left-join `merge` to the branch reference on the sanction prefix and
/// insert `Branch Name` and `Area Name` as the third and fourth columns.
/// Unmatched rows get blank names.
pub fn with_branch_names(merge: &Table, branches: &Table) -> Result<Table> {
    let mut out = merge.clone();
    trim_headers(&mut out);
    require_columns(&out, "Merge File", &[MERGE_KEY])?;
    let branches = normalize(branches, &BRANCH_REF_SCHEMA)?;

    let lookup: HashMap<String, (&str, &str)> = branches
        .rows()
        .map(|r| {
            (
                r.get("branch code").trim().to_string(),
                (r.get("branch_name"), r.get("area_name")),
            )
        })
        .collect();

    let mut names = Vec::with_capacity(out.len());
    let mut areas = Vec::with_capacity(out.len());
    let mut matched = 0usize;
    for r in out.rows() {
        match lookup.get(&sanction_prefix(r.get(MERGE_KEY))) {
            Some((name, area)) => {
                matched += 1;
                names.push(name.to_string());
                areas.push(area.to_string());
            }
            None => {
                names.push(String::new());
                areas.push(String::new());
            }
        }
    }
    out.insert_column(2, "Branch Name", names);
    out.insert_column(3, "Area Name", areas);
    info!(rows = out.len(), matched, "attached branch names");
    Ok(out)
}
