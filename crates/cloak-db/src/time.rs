//! Timestamp encoding for TEXT columns.
//!
//! Timestamps are written as fixed-width RFC 3339 UTC strings with
//! microsecond precision, so lexical order in SQL equals time order.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

pub fn now() -> String {
    format(Utc::now())
}

pub fn format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Also accepts SQLite's `datetime('now')`
/// shape ("YYYY-MM-DD HH:MM:SS"), which carries no zone and is UTC.
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .ok()
}
