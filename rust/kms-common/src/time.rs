//! Wall clock helpers.
//!
//! Proof timestamps are written as RFC 3339 with second precision and HTTP
//! `date` headers use the IMF-fixdate form from RFC 9110.

use chrono::{DateTime, SecondsFormat, Utc};

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current system time.
pub fn now() -> SystemTime {
    SystemTime::now()
}

/// Formats `time` as an RFC 3339 UTC timestamp, e.g. `2024-05-01T10:00:00Z`.
pub fn to_rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Formats `time` the way HTTP `date` headers expect it, e.g.
/// `Wed, 01 May 2024 10:00:00 GMT`.
pub fn to_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Parses an HTTP `date` header value. Returns `None` when it is not in the
/// IMF-fixdate form.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim().replace("GMT", "+0000").as_str())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc).into())
}
