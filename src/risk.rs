// Risk level of a disbursed tranche.
//
// A pure function of elapsed months and two resolution flags. Confirmed
// resolution (house complete or borrower shifted) always wins; otherwise
// the elapsed time decides, and an unknown elapsed time is `Low`.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    #[serde(rename = "No Risk")]
    NoRisk,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
            RiskLevel::NoRisk => "No Risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const HIGH_RISK_MONTHS: i64 = 4;
pub const MEDIUM_RISK_MONTHS: i64 = 2;

/// `"Yes"` in any case, surrounding whitespace ignored.
pub fn is_yes(flag: &str) -> bool {
    flag.trim().eq_ignore_ascii_case("yes")
}

pub fn classify(months_passed: Option<i64>, house_complete: &str, shifted: &str) -> RiskLevel {
    if is_yes(house_complete) || is_yes(shifted) {
        return RiskLevel::NoRisk;
    }
    match months_passed {
        Some(m) if m >= HIGH_RISK_MONTHS => RiskLevel::High,
        Some(m) if m >= MEDIUM_RISK_MONTHS => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// Whole calendar months from `from` to `to`; a month only counts once its
/// day of month has been reached. Negative when `to` precedes `from`.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    if to < from {
        return -months_between(to, from);
    }
    let mut months =
        (to.year() as i64 - from.year() as i64) * 12 + to.month() as i64 - from.month() as i64;
    if to.day() < from.day() && !is_month_end_catch_up(from, to) {
        months -= 1;
    }
    months
}

// 31 Jan -> 29 Feb is a full month: `to` is the last day of its month and
// `from`'s day does not exist there.
fn is_month_end_catch_up(from: NaiveDate, to: NaiveDate) -> bool {
    let next = to.succ_opt().map(|d| d.month() != to.month()).unwrap_or(true);
    next && from.day() > to.day()
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}
