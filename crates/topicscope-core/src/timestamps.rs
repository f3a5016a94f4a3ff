//! Timestamp normalization for the `timestamp` filter parameter.
//!
//! The backend parses exactly one shape: UTC, millisecond precision, literal
//! `Z` suffix (`2023-01-01T00:00:00.000Z`). Whatever offset the operator typed,
//! the query always carries that shape.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Format an instant as `YYYY-MM-DDTHH:MM:SS.sssZ`.
///
/// Sub-millisecond precision is truncated, not rounded.
#[must_use]
pub fn format_millis_z<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    instant
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp as typed by an operator or found in a shared URL.
///
/// Accepts RFC 3339 with any offset, a naive date-time (taken as UTC), or a
/// bare date (midnight UTC). Returns `None` for anything else.
#[must_use]
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Truncate an instant to millisecond precision so that a parsed filter
/// compares equal to the one that produced the query.
#[must_use]
pub fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(instant.timestamp_millis())
        .single()
        .unwrap_or(instant)
}
