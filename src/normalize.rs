// Column normalization: map whatever headers an upload carries onto the
// canonical schema an operation expects.
//
// Header matching ignores case, whitespace and punctuation, so `Sanction
// No`, `sanction_no` and `SANCTIONNO` all resolve to the same column.
// Missing optional columns are created with a default; missing required
// columns produce a single error naming every one of them.

use crate::error::{ReconError, Result};
use crate::table::Table;
use tracing::debug;

/// One expected column and the historical spellings it may arrive under.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    pub default: &'static str,
    pub required: bool,
}

impl ColumnSpec {
    pub const fn required(canonical: &'static str, aliases: &'static [&'static str]) -> Self {
        ColumnSpec {
            canonical,
            aliases,
            default: "",
            required: true,
        }
    }

    pub const fn optional(
        canonical: &'static str,
        aliases: &'static [&'static str],
        default: &'static str,
    ) -> Self {
        ColumnSpec {
            canonical,
            aliases,
            default,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Human name of the sheet, used in error messages.
    pub sheet: &'static str,
    pub columns: &'static [ColumnSpec],
}

/// Lowercase alphanumerics only: `"Sanction No."` -> `"sanctionno"`.
pub fn clean_colname(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Comparison form of a join key such as a sanction number.
///
/// Trims, drops inner whitespace, lowercases, and strips the `.0` suffix a
/// numeric spreadsheet cell picks up when read as a float.
pub fn normalize_key(raw: &str) -> String {
    let mut key: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let integral = key
        .strip_suffix(".0")
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .map(str::len);
    if let Some(len) = integral {
        key.truncate(len);
    }
    key
}

/// Trim every header in place.
pub fn trim_headers(table: &mut Table) {
    for idx in 0..table.columns().len() {
        let trimmed = table.columns()[idx].trim().to_string();
        table.set_column_name(idx, trimmed);
    }
}

/// Copy `raw`, trim its headers, rename known spelling variants to their
/// canonical names and create absent optional columns.
pub fn normalize(raw: &Table, schema: &Schema) -> Result<Table> {
    let mut table = raw.clone();
    trim_headers(&mut table);

    let mut claimed: Vec<usize> = Vec::new();
    let mut missing: Vec<String> = Vec::new();

    for spec in schema.columns {
        if let Some(idx) = table.column_index(spec.canonical) {
            claimed.push(idx);
            continue;
        }
        match find_variant(&table, spec, &claimed) {
            Some(idx) => {
                debug!(
                    sheet = schema.sheet,
                    from = table.columns()[idx].as_str(),
                    to = spec.canonical,
                    "renamed column"
                );
                table.set_column_name(idx, spec.canonical.to_string());
                claimed.push(idx);
            }
            None if spec.required => missing.push(spec.canonical.to_string()),
            None => {
                debug!(
                    sheet = schema.sheet,
                    column = spec.canonical,
                    "absent column filled with default"
                );
                table.add_column(spec.canonical, spec.default);
                claimed.push(table.columns().len() - 1);
            }
        }
    }

    if !missing.is_empty() {
        return Err(ReconError::missing(schema.sheet, missing));
    }
    Ok(table)
}

fn find_variant(table: &Table, spec: &ColumnSpec, claimed: &[usize]) -> Option<usize> {
    let cleaned: Vec<String> = table.columns().iter().map(|c| clean_colname(c)).collect();
    std::iter::once(spec.canonical)
        .chain(spec.aliases.iter().copied())
        .map(clean_colname)
        .find_map(|wanted| {
            cleaned
                .iter()
                .enumerate()
                .find(|(idx, c)| **c == wanted && !claimed.contains(idx))
                .map(|(idx, _)| idx)
        })
}

/// Fail with a column error unless every name in `columns` is present.
pub fn require_columns(table: &Table, context: &str, columns: &[&str]) -> Result<()> {
    let missing: Vec<String> = columns
        .iter()
        .filter(|c| !table.has_column(c))
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReconError::missing(context, missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: Schema = Schema {
        sheet: "Test Sheet",
        columns: &[
            ColumnSpec::required("Sanction No", &["sanction_no", "sanctionnumber"]),
            ColumnSpec::optional("branch_id", &["Branch Code", "Branch"], ""),
            ColumnSpec::optional("amount", &["loan_amount"], "0"),
        ],
    };

    #[test]
    fn renames_variants_and_fills_defaults() {
        let raw = Table::from_rows(&[" sanction_no ", "Branch Code"], vec![vec!["S1", "B1"]]);
        let t = normalize(&raw, &SCHEMA).unwrap();
        assert_eq!(t.columns(), &["Sanction No", "branch_id", "amount"]);
        assert_eq!(t.row(0).get("amount"), "0");
        // caller's table is untouched
        assert_eq!(raw.columns()[0], " sanction_no ");
    }

    #[test]
    fn reports_every_missing_required_column() {
        let raw = Table::from_rows(&["Branch"], vec![]);
        match normalize(&raw, &SCHEMA) {
            Err(ReconError::MissingColumns { context, columns }) => {
                assert_eq!(context, "Test Sheet");
                assert_eq!(columns, vec!["Sanction No".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn exact_canonical_beats_alias() {
        let raw = Table::from_rows(&["Branch", "branch_id"], vec![vec!["x", "B9"]]);
        const COLUMNS: &[ColumnSpec] = &[ColumnSpec::optional("branch_id", &["Branch"], "")];
        let t = normalize(
            &raw,
            &Schema {
                sheet: "s",
                columns: COLUMNS,
            },
        )
        .unwrap();
        assert_eq!(t.row(0).get("branch_id"), "B9");
    }

    #[test]
    fn keys_compare_loosely() {
        assert_eq!(normalize_key(" AB 12 "), "ab12");
        assert_eq!(normalize_key("1234.0"), "1234");
        assert_eq!(normalize_key("12.05"), "12.05");
        assert_eq!(clean_colname("Sanction No."), "sanctionno");
    }
}
