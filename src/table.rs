// Loosely-typed tabular data as it arrives from a spreadsheet.
//
// Headers are kept in upload order and every cell is a string. Operations
// that derive new data always build a new `Table`; nothing here mutates a
// table the caller still holds unless it was handed over by value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Borrowed view of a single row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    idx: usize,
}

impl<'a> Row<'a> {
    /// Cell value, or `""` when the column does not exist.
    pub fn get(&self, column: &str) -> &'a str {
        self.table
            .column_index(column)
            .map(|c| self.table.rows[self.idx][c].as_str())
            .unwrap_or("")
    }

    pub fn cells(&self) -> &'a [String] {
        &self.table.rows[self.idx]
    }
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from string literals; short rows are padded with blanks.
    pub fn from_rows(columns: &[&str], rows: Vec<Vec<&str>>) -> Self {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for r in rows {
            table.push_row(r.into_iter().map(str::to_string).collect());
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut cells: Vec<String>) {
        cells.resize(self.columns.len(), String::new());
        self.rows.push(cells);
    }

    pub fn row(&self, idx: usize) -> Row<'_> {
        Row { table: self, idx }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.rows.len()).map(move |idx| Row { table: self, idx })
    }

    /// Values of one column; blanks when the column is absent.
    pub fn column_values(&self, name: &str) -> Vec<&str> {
        self.rows().map(|r| r.get(name)).collect()
    }

    pub fn set_column_name(&mut self, idx: usize, name: String) {
        self.columns[idx] = name;
    }

    /// Add a column filled with `default`. No-op if it already exists.
    pub fn add_column(&mut self, name: &str, default: &str) {
        if self.has_column(name) {
            return;
        }
        self.columns.push(name.to_string());
        for r in &mut self.rows {
            r.push(default.to_string());
        }
    }

    /// Insert a column at position `at`; rows past the end of `values` get a blank.
    pub fn insert_column(&mut self, at: usize, name: &str, values: Vec<String>) {
        let at = at.min(self.columns.len());
        self.columns.insert(at, name.to_string());
        let mut values = values.into_iter();
        for r in &mut self.rows {
            r.insert(at, values.next().unwrap_or_default());
        }
    }

    /// New table with the same headers holding the rows that pass `keep`.
    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&Row<'_>) -> bool,
    {
        let rows = self
            .rows()
            .filter(|r| keep(r))
            .map(|r| r.cells().to_vec())
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Stack `other` under `self`, unioning headers by name.
    pub fn append(&mut self, other: &Table) {
        for c in &other.columns {
            self.add_column(c, "");
        }
        for r in other.rows() {
            let cells = self.columns.iter().map(|c| r.get(c).to_string()).collect();
            self.rows.push(cells);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_read_as_blank() {
        let t = Table::from_rows(&["a"], vec![vec!["1"]]);
        assert_eq!(t.row(0).get("a"), "1");
        assert_eq!(t.row(0).get("b"), "");
    }

    #[test]
    fn filter_leaves_source_untouched() {
        let t = Table::from_rows(&["k"], vec![vec!["x"], vec!["y"]]);
        let f = t.filter(|r| r.get("k") == "y");
        assert_eq!(f.len(), 1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn append_unions_headers() {
        let mut a = Table::from_rows(&["k", "v"], vec![vec!["1", "a"]]);
        let b = Table::from_rows(&["k", "w"], vec![vec!["2", "b"]]);
        a.append(&b);
        assert_eq!(a.columns(), &["k", "v", "w"]);
        assert_eq!(a.row(1).get("w"), "b");
        assert_eq!(a.row(1).get("v"), "");
        assert_eq!(a.row(0).get("w"), "");
    }

    #[test]
    fn inserted_column_short_values_pad_blank() {
        let mut t = Table::from_rows(&["a", "b"], vec![vec!["1", "2"], vec!["3", "4"]]);
        t.insert_column(1, "z", vec!["9".into()]);
        assert_eq!(t.columns(), &["a", "z", "b"]);
        assert_eq!(t.column_values("z"), vec!["9", ""]);
        assert_eq!(t.row(1).get("b"), "4");
    }
}
