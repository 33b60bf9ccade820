// Utility helpers for lenient parsing, rounding and display formatting.
//
// Spreadsheet exports are messy: amounts carry thousands separators, dates
// come in several layouts, and blank cells are common. Everything that can
// fail here returns `Option` so callers decide between "treat as zero" and
// "drop the row".
use chrono::{NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};
use tracing::debug;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y-%b-%d",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%d-%m-%Y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in spreadsheet exports.
///
/// - Trims whitespace and strips thousands separators.
/// - Rejects values that contain alphabetic characters.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer cell. Spreadsheets often hand back `2.0` for `2`, so an
/// integral float is accepted too.
pub fn parse_i64_safe(s: Option<&str>) -> Option<i64> {
    let v = parse_f64_safe(s)?;
    if v.fract() == 0.0 {
        Some(v as i64)
    } else {
        None
    }
}

/// Parse a date in any of the layouts seen in uploaded sheets. A trailing
/// time component is accepted and discarded.
pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Amount coercion used by every aggregation: blank is zero silently, an
/// unparseable value is zero with a debug trace naming the column.
pub fn amount_or_zero(raw: &str, column: &str) -> f64 {
    if raw.trim().is_empty() {
        return 0.0;
    }
    match parse_f64_safe(Some(raw)) {
        Some(v) => v,
        None => {
            debug!(column, value = raw, "unparseable amount coerced to 0");
            0.0
        }
    }
}

/// Date coercion that logs the fallback instead of swallowing it.
pub fn date_or_none(raw: &str, column: &str) -> Option<NaiveDate> {
    let parsed = parse_date_safe(Some(raw));
    if parsed.is_none() && !raw.trim().is_empty() {
        debug!(column, value = raw, "unparseable date treated as missing");
    }
    parsed
}

/// Two-decimal rounding, ties to even.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

/// `part / whole * 100` rounded to two decimals, `0` when `whole` is zero.
pub fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    round2(part / whole * 100.0)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals with locale-aware thousands separators (`1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Display helper for tabled columns holding money.
pub fn display_amount(v: &f64) -> String {
    format_number(*v, 2)
}

/// Display helper for tabled percentage columns.
pub fn display_percent(v: &f64) -> String {
    format!("{:.2}", v)
}

pub fn display_date(d: &Option<NaiveDate>) -> String {
    d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

pub fn display_opt_i64(v: &Option<i64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}
