use crate::error::{ReconError, Result};
use crate::normalize::clean_colname;
use crate::table::Table;
use csv::ReaderBuilder;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rows above the header in exported due lists.
pub const DUE_LIST_PREAMBLE_ROWS: usize = 2;

const SANCTION_HEADERS: &[&str] = &["sanctionno", "sanctionnumber", "sactionno"];

/// Read a CSV sheet into a [`Table`], skipping `skip_rows` physical lines
/// before the header. Short rows are padded and fully blank rows dropped.
pub fn load_csv(path: &Path, skip_rows: usize) -> Result<Table> {
    let read_err = |source: csv::Error| ReconError::Read {
        path: path.display().to_string(),
        source,
    };
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_path(path)
        .map_err(read_err)?;

    let mut records = rdr.records();
    let mut skipped = 0usize;
    let header = loop {
        match records.next() {
            Some(rec) => {
                let rec = rec.map_err(read_err)?;
                if skipped < skip_rows {
                    skipped += 1;
                    continue;
                }
                break rec;
            }
            None => return Ok(Table::default()),
        }
    };

    let mut table = Table::new(header.iter().map(|h| h.trim().to_string()).collect());
    let mut blank_rows = 0usize;
    for rec in records {
        let rec = rec.map_err(read_err)?;
        if rec.iter().all(|c| c.trim().is_empty()) {
            blank_rows += 1;
            continue;
        }
        table.push_row(rec.iter().map(str::to_string).collect());
    }
    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        blank_rows,
        "loaded sheet"
    );
    Ok(table)
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub table: Table,
    pub merged_files: Vec<PathBuf>,
    /// Files with no recognizable sanction column; left out of the merge.
    pub missing_sanction_files: Vec<PathBuf>,
}

/// Combine several exported due lists into one sheet. Each file drops its
/// preamble, gets cleaned headers, and must carry a sanction number column,
/// which is renamed to `sanctionno`.
pub fn merge_due_lists(paths: &[PathBuf]) -> Result<MergeOutcome> {
    let mut out = MergeOutcome::default();
    for path in paths {
        let mut sheet = load_csv(path, DUE_LIST_PREAMBLE_ROWS)?;
        let cleaned: Vec<String> = sheet.columns().iter().map(|c| clean_colname(c)).collect();
        for (idx, name) in cleaned.into_iter().enumerate() {
            sheet.set_column_name(idx, name);
        }
        let sanction = SANCTION_HEADERS
            .iter()
            .find_map(|h| sheet.column_index(h));
        match sanction {
            Some(idx) => {
                sheet.set_column_name(idx, SANCTION_HEADERS[0].to_string());
                out.table.append(&sheet);
                out.merged_files.push(path.clone());
            }
            None => {
                warn!(path = %path.display(), "no sanction number column, file skipped");
                out.missing_sanction_files.push(path.clone());
            }
        }
    }
    info!(
        files = out.merged_files.len(),
        skipped = out.missing_sanction_files.len(),
        rows = out.table.len(),
        "merged due lists"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn temp_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reads_ragged_rows_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir, "ragged.csv", " Sanction No ,branch_id,amount\nA1,B1\n,,\nA2,B2,10,extra\n");
        let table = load_csv(&path, 0).unwrap();
        assert_eq!(table.columns(), &["Sanction No", "branch_id", "amount"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0).get("amount"), "");
        assert_eq!(table.row(1).get("amount"), "10");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_csv(Path::new("/nonexistent/do_list.csv"), 0).unwrap_err();
        assert!(err.to_string().contains("do_list.csv"));
    }

    #[test]
    fn merges_due_lists_and_reports_files_without_sanctions() {
        let dir = tempfile::tempdir().unwrap();
        let a = temp_file(&dir, "due_a.csv", "Report,,\nPrinted,,\nSanction No.,Member Name,Amount\nS1,Ali,10\n");
        let b = temp_file(&dir, "due_b.csv", "x\ny\nSanction Number,Member Name\nS2,Sara\n");
        let c = temp_file(&dir, "due_c.csv", "x\ny\nName,Amount\nOmar,5\n");
        let out = merge_due_lists(&[a, b, c.clone()]).unwrap();
        assert_eq!(out.table.len(), 2);
        assert_eq!(out.table.column_values("sanctionno"), vec!["S1", "S2"]);
        assert_eq!(out.table.row(1).get("amount"), "");
        assert_eq!(out.missing_sanction_files, vec![c]);
    }
}
