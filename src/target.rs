// Target vs achievement per branch and project.
//
// Both sheets list one row per loan with an area, a branch, a free-text
// project label and an amount. Labels are collapsed onto canonical project
// names first, then rows are grouped by `(area, branch, project)` into a
// `{count, amount}` figure per project slot. Targets drive the report: a
// branch with no achievement row reads as all zero.

use crate::error::Result;
use crate::normalize::{normalize, ColumnSpec, Schema};
use crate::table::Table;
use crate::util::{amount_or_zero, round2};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

const AREA: &str = "Area";
const BRANCH: &str = "Branch";
const BRANCH_CODE: &str = "Branch Code";
const PROJECT: &str = "Project";
const AMOUNT: &str = "Amount";

pub const TARGET_SCHEMA: Schema = Schema {
    sheet: "Target/Achievement Sheet",
    columns: &[
        ColumnSpec::required(AREA, &["area_name", "Area Name"]),
        ColumnSpec::required(BRANCH, &["Branch Name", "branch_name"]),
        ColumnSpec::optional(BRANCH_CODE, &["branch_id", "branchcode"], ""),
        ColumnSpec::required(PROJECT, &["Project Name", "project_name"]),
        ColumnSpec::optional(AMOUNT, &["loan_amount", "amount"], "0"),
    ],
};

/// Substrings that identify a project, checked in order against the
/// upper-cased label. The first match names the canonical project.
static PROJECT_ALIASES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("YBLS", "ALS"),
        ("ALS", "ALS"),
        ("KAMYAB", "KJP"),
        ("KJP", "KJP"),
        ("PMIFL", "PMIFL"),
        ("IFL", "PMIFL"),
        ("LIVESTOCK", "Livestock"),
        ("HOUSING", "Housing"),
    ]
});

/// Canonical projects in report order.
static CANONICAL_ORDER: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut seen: Vec<&'static str> = Vec::new();
    for (_, canonical) in PROJECT_ALIASES.iter() {
        if !seen.contains(canonical) {
            seen.push(*canonical);
        }
    }
    seen
});

pub fn canonical_project(label: &str) -> String {
    let upper = label.trim().to_uppercase();
    PROJECT_ALIASES
        .iter()
        .find(|(needle, _)| upper.contains(needle))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| label.trim().to_string())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFigure {
    pub count: i64,
    pub amount: f64,
}

impl ProjectFigure {
    fn minus(self, other: ProjectFigure) -> ProjectFigure {
        ProjectFigure {
            count: self.count - other.count,
            amount: self.amount - other.amount,
        }
    }
}

/// Per-branch figures keyed by canonical project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchFigures {
    pub area: String,
    pub branch: String,
    pub branch_code: String,
    pub projects: BTreeMap<String, ProjectFigure>,
}

type BranchKey = (String, String);

fn branch_key(area: &str, branch: &str) -> BranchKey {
    (area.trim().to_lowercase(), branch.trim().to_lowercase())
}

/// Group a target or achievement sheet by `(area, branch, project)`.
pub fn branch_figures(raw: &Table) -> Result<Vec<BranchFigures>> {
    let table = normalize(raw, &TARGET_SCHEMA)?;
    let mut grouped: BTreeMap<BranchKey, BranchFigures> = BTreeMap::new();
    for r in table.rows() {
        let project = canonical_project(r.get(PROJECT));
        let entry = grouped
            .entry(branch_key(r.get(AREA), r.get(BRANCH)))
            .or_insert_with(|| BranchFigures {
                area: r.get(AREA).trim().to_string(),
                branch: r.get(BRANCH).trim().to_string(),
                branch_code: r.get(BRANCH_CODE).trim().to_string(),
                projects: BTreeMap::new(),
            });
        let fig = entry.projects.entry(project).or_default();
        fig.count += 1;
        fig.amount += amount_or_zero(r.get(AMOUNT), AMOUNT);
    }
    Ok(grouped.into_values().collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceRow {
    pub area: String,
    pub branch: String,
    pub branch_code: String,
    pub target: Vec<ProjectFigure>,
    pub achievement: Vec<ProjectFigure>,
    pub variance: Vec<ProjectFigure>,
    /// `"{count}|{amount}"` of the summed variance.
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceReport {
    /// Project slot names; every figure vector is aligned with this.
    pub projects: Vec<String>,
    pub rows: Vec<VarianceRow>,
}

fn project_slots(targets: &[BranchFigures], achievements: &[BranchFigures]) -> Vec<String> {
    let seen: BTreeSet<&str> = targets
        .iter()
        .chain(achievements)
        .flat_map(|b| b.projects.keys().map(String::as_str))
        .collect();
    let mut slots: Vec<String> = CANONICAL_ORDER
        .iter()
        .filter(|p| seen.contains(**p))
        .map(|p| p.to_string())
        .collect();
    slots.extend(
        seen.iter()
            .filter(|p| !CANONICAL_ORDER.iter().any(|c| *c == **p))
            .map(|p| p.to_string()),
    );
    slots
}

fn figures_for(b: Option<&BranchFigures>, slots: &[String]) -> Vec<ProjectFigure> {
    slots
        .iter()
        .map(|p| {
            b.and_then(|b| b.projects.get(p))
                .copied()
                .unwrap_or_default()
        })
        .collect()
}

/// Match every target branch to its achievement (case-insensitively on
/// area and branch) and compute target minus achievement per project.
pub fn merge(targets: &[BranchFigures], achievements: &[BranchFigures]) -> VarianceReport {
    let slots = project_slots(targets, achievements);
    let index: HashMap<BranchKey, &BranchFigures> = achievements
        .iter()
        .map(|a| (branch_key(&a.area, &a.branch), a))
        .collect();

    let mut matched = 0usize;
    let rows: Vec<VarianceRow> = targets
        .iter()
        .map(|t| {
            let achieved = index.get(&branch_key(&t.area, &t.branch)).copied();
            if achieved.is_some() {
                matched += 1;
            }
            let target = figures_for(Some(t), &slots);
            let achievement = figures_for(achieved, &slots);
            let variance: Vec<ProjectFigure> = target
                .iter()
                .zip(&achievement)
                .map(|(t, a)| t.minus(*a))
                .collect();
            let count: i64 = variance.iter().map(|v| v.count).sum();
            let amount: f64 = variance.iter().map(|v| v.amount).sum();
            VarianceRow {
                area: t.area.clone(),
                branch: t.branch.clone(),
                branch_code: t.branch_code.clone(),
                target,
                achievement,
                variance,
                total: format!("{}|{}", count, round2(amount)),
            }
        })
        .collect();
    if matched < targets.len() {
        debug!(
            unmatched = targets.len() - matched,
            "target branches without achievement rows read as zero"
        );
    }
    info!(branches = rows.len(), projects = slots.len(), "merged targets with achievements");
    VarianceReport {
        projects: slots,
        rows,
    }
}

impl VarianceReport {
    /// Flatten into a table: one `count|amount` column per project for
    /// target, achievement and variance, then the total.
    pub fn to_table(&self) -> Table {
        let mut columns: Vec<String> = vec![AREA.into(), BRANCH.into(), BRANCH_CODE.into()];
        for prefix in ["Target", "Achievement", "Variance"] {
            for p in &self.projects {
                columns.push(format!("{} {}", prefix, p));
            }
        }
        columns.push("Total".into());
        let mut table = Table::new(columns);
        let cell = |f: &ProjectFigure| format!("{}|{}", f.count, round2(f.amount));
        for r in &self.rows {
            let mut cells = vec![r.area.clone(), r.branch.clone(), r.branch_code.clone()];
            cells.extend(r.target.iter().map(cell));
            cells.extend(r.achievement.iter().map(cell));
            cells.extend(r.variance.iter().map(cell));
            cells.push(r.total.clone());
            table.push_row(cells);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_collapse_before_grouping() {
        assert_eq!(canonical_project("ALS-2"), "ALS");
        assert_eq!(canonical_project(" ybls phase II "), "ALS");
        assert_eq!(canonical_project("Kamyab Jawan"), "KJP");
        assert_eq!(canonical_project("Solar"), "Solar");

        let raw = Table::from_rows(
            &["Area", "Branch Name", "Project Name", "Amount"],
            vec![
                vec!["North", "Alpha", "ALS", "100"],
                vec!["North", "Alpha", "YBLS", "50"],
                vec!["North", "Alpha", "Solar", "10"],
            ],
        );
        let figs = branch_figures(&raw).unwrap();
        assert_eq!(figs.len(), 1);
        let als = figs[0].projects["ALS"];
        assert_eq!((als.count, als.amount), (2, 150.0));
        assert_eq!(figs[0].projects.len(), 2);
    }

    #[test]
    fn merge_is_case_insensitive_and_defaults_to_zero() {
        let targets = branch_figures(&Table::from_rows(
            &["Area", "Branch", "Project", "Amount"],
            vec![
                vec!["North", "Alpha", "ALS", "100"],
                vec!["North", "Alpha", "ALS", "100"],
                vec!["South", "Beta", "KJP", "300"],
            ],
        ))
        .unwrap();
        let achievements = branch_figures(&Table::from_rows(
            &["Area", "Branch", "Project", "Amount"],
            vec![vec!["NORTH", " alpha ", "als", "120"]],
        ))
        .unwrap();
        let report = merge(&targets, &achievements);
        assert_eq!(report.projects, vec!["ALS", "KJP"]);

        let alpha = &report.rows[0];
        assert_eq!(alpha.variance[0], ProjectFigure { count: 1, amount: 80.0 });
        assert_eq!(alpha.total, "1|80");

        let beta = &report.rows[1];
        assert_eq!(beta.achievement, vec![ProjectFigure::default(); 2]);
        assert_eq!(beta.variance[1], ProjectFigure { count: 1, amount: 300.0 });
        assert_eq!(beta.total, "1|300");
    }

    #[test]
    fn report_flattens_to_table() {
        let targets = branch_figures(&Table::from_rows(
            &["Area", "Branch", "Project", "Amount"],
            vec![vec!["North", "Alpha", "ALS", "100"]],
        ))
        .unwrap();
        let t = merge(&targets, &[]).to_table();
        assert_eq!(
            t.columns(),
            &["Area", "Branch", "Branch Code", "Target ALS", "Achievement ALS", "Variance ALS", "Total"]
        );
        assert_eq!(t.row(0).get("Achievement ALS"), "0|0");
        assert_eq!(t.row(0).get("Total"), "1|100");
    }

    #[test]
    fn fractional_amounts_print_at_two_decimals() {
        let targets = branch_figures(&Table::from_rows(
            &["Area", "Branch", "Project", "Amount"],
            vec![
                vec!["North", "Alpha", "ALS", "0.1"],
                vec!["North", "Alpha", "ALS", "0.2"],
            ],
        ))
        .unwrap();
        let report = merge(&targets, &[]);
        assert_eq!(report.rows[0].total, "2|0.3");
        assert_eq!(report.to_table().row(0).get("Target ALS"), "2|0.3");
    }

    #[test]
    fn missing_project_column_is_reported() {
        let raw = Table::from_rows(&["Area", "Branch"], vec![]);
        let err = branch_figures(&raw).unwrap_err();
        assert!(err.to_string().contains("Project"));
    }
}
