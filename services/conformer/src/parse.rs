//! Field-level parsing of Bronze text values.
//!
//! Bronze columns are text. Every helper returns `None` for values that are
//! blank or cannot be parsed; callers decide whether that drops the row or
//! only the field.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Accepted year window for dates and timestamps (four-digit years)
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

/// Timestamp layouts seen in the extracts, most common first
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Trim and drop empty strings
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn parse_i32(raw: Option<&str>) -> Option<i32> {
    let trimmed = raw?.trim();
    if let Ok(v) = trimmed.parse::<i32>() {
        return Some(v);
    }
    // Some exports write integral counters as "3.0"
    let f: f64 = trimmed.parse().ok()?;
    if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

pub fn parse_f64(raw: Option<&str>) -> Option<f64> {
    let v: f64 = raw?.trim().parse().ok()?;
    v.is_finite().then_some(v)
}

pub fn year_in_range(year: i32) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&year)
}

/// Parse a timestamp; date-only values land on midnight.
/// Years outside `MIN_YEAR..=MAX_YEAR` (e.g. `+262142-12-30`) are rejected.
pub fn parse_timestamp(raw: Option<&str>) -> Option<NaiveDateTime> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    year_in_range(parsed.year()).then_some(parsed)
}

/// Parse a zip-code prefix: digits only, leading zeros allowed
pub fn parse_zip_prefix(raw: Option<&str>) -> Option<i32> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}
