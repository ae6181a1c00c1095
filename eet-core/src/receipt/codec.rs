//! Conversions between typed values and the protocol's string encodings.
//!
//! Formatting is total over each declared domain. Parsing never fails
//! loudly: malformed input yields `None` so callers can tell an absent
//! attribute from a malformed one.
use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// Wire timestamp: UTC, second precision, `Z` suffix.
/// The authority rejects fractional seconds.
pub fn format_timestamp<Tz: TimeZone>(value: &DateTime<Tz>) -> String {
    value
        .with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.trim()).ok()
}

pub fn format_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Only the literals `true` and `false` are accepted.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Hundredths to a decimal string with exactly two fraction digits.
pub fn format_amount(hundredths: i64) -> String {
    let sign = if hundredths < 0 { "-" } else { "" };
    let magnitude = hundredths.unsigned_abs();
    format!("{sign}{}.{:02}", magnitude / 100, magnitude % 100)
}
