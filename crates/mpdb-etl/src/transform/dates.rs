use chrono::{Days, NaiveDate};
use serde_json::Value;

use super::numbers::Coerced;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse an ISO date, or the date part of an RFC 3339 / `YYYY-MM-DD HH:MM`
/// timestamp. US `MM/DD/YYYY` is accepted as a fallback.
#[must_use]
pub fn coerce_date(value: Option<&Value>) -> Coerced<NaiveDate> {
    let Some(raw) = value else {
        return Coerced::Absent;
    };
    let text = match raw {
        Value::Null => return Coerced::Absent,
        Value::String(s) if s.trim().is_empty() => return Coerced::Absent,
        Value::String(s) => s.trim(),
        other => return Coerced::Invalid(other.to_string()),
    };
    let date_part = match text.char_indices().nth(10) {
        Some((idx, 'T' | 't' | ' ')) => &text[..idx],
        _ => text,
    };
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .map_or_else(|| Coerced::Invalid(text.to_string()), Coerced::Value)
}

/// End date for a flight: the explicit end, or `start + horizon_days`.
#[must_use]
pub fn resolve_end(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    horizon_days: u32,
) -> Option<NaiveDate> {
    end.or_else(|| start.and_then(|s| s.checked_add_days(Days::new(u64::from(horizon_days)))))
}
