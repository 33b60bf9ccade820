use crate::error::Result;
use crate::table::Table;
use crate::util::parse_f64_safe;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style, Tabled};
use tracing::info;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = rows.len(), "wrote csv");
    Ok(())
}

pub fn write_table_csv(path: &Path, table: &Table) -> Result<()> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(table.columns())?;
    for r in table.rows() {
        wtr.write_record(r.cells())?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = table.len(), "wrote csv");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    info!(path = %path.display(), "wrote json");
    Ok(())
}

/// Write one sheet with a bold header row. Cells that read as numbers are
/// written as numbers so totals stay summable in the spreadsheet.
pub fn write_xlsx(path: &Path, sheet_name: &str, table: &Table) -> Result<()> {
    ensure_parent(path)?;
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name)?;
    for (c, name) in table.columns().iter().enumerate() {
        sheet.write_string_with_format(0, c as u16, name, &bold)?;
    }
    for (r, row) in table.rows().enumerate() {
        let xr = (r + 1) as u32;
        for (c, cell) in row.cells().iter().enumerate() {
            match numeric_cell(cell) {
                Some(n) => sheet.write_number(xr, c as u16, n)?,
                None => sheet.write_string(xr, c as u16, cell)?,
            };
        }
    }
    workbook.save(path)?;
    info!(path = %path.display(), rows = table.len(), "wrote xlsx");
    Ok(())
}

// Identifiers such as CNICs keep their leading zeros.
fn numeric_cell(cell: &str) -> Option<f64> {
    let t = cell.trim();
    if t.len() > 1 && t.starts_with('0') && !t.starts_with("0.") {
        return None;
    }
    parse_f64_safe(Some(t))
}

/// One CSV per branch under `dir`, named `<prefix>_<branch>.csv`.
pub fn write_per_branch(dir: &Path, prefix: &str, tables: &BTreeMap<String, Table>) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(tables.len());
    for (branch, table) in tables {
        let path = dir.join(format!("{}_{}.csv", prefix, file_safe(branch)));
        write_table_csv(&path, table)?;
        written.push(path);
    }
    Ok(written)
}

/// Branch ids end up in file names; keep them to a portable charset.
pub fn file_safe(name: &str) -> String {
    let s: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if s.is_empty() {
        "blank".to_string()
    } else {
        s
    }
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("\n{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    preview_table_rows(rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = tabled::Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Markdown preview of a loose sheet.
pub fn preview_sheet(title: &str, table: &Table, max_rows: usize) {
    println!("\n{}\n", title);
    if table.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(table.columns().iter().cloned());
    for r in table.rows().take(max_rows) {
        builder.push_record(r.cells().iter().cloned());
    }
    let table_str = builder.build().with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_names_become_safe_file_names() {
        assert_eq!(file_safe("B 1/2"), "B_1_2");
        assert_eq!(file_safe("  "), "blank");
        assert_eq!(file_safe("Unknown"), "Unknown");
    }

    #[test]
    fn leading_zero_cells_stay_text() {
        assert_eq!(numeric_cell("12.5"), Some(12.5));
        assert_eq!(numeric_cell("0"), Some(0.0));
        assert_eq!(numeric_cell("03001234567"), None);
        assert_eq!(numeric_cell("Ali"), None);
    }

    #[test]
    fn table_csv_keeps_header_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        let path = dir.join("t.csv");
        let t = Table::from_rows(&["b", "a"], vec![vec!["1", "2"]]);
        write_table_csv(&path, &t).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body, "b,a\n1,2\n");

        let mut per_branch = BTreeMap::new();
        per_branch.insert("B1".to_string(), t.clone());
        let written = write_per_branch(&dir, "overdue", &per_branch).unwrap();
        assert!(written[0].ends_with("overdue_B1.csv"));
    }
}
