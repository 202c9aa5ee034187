//! Shared timestamp/id helpers for checkpoints, ledger records and revert logs.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;
use ulid::Ulid;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 with millisecond precision and a `Z` suffix (e.g. `2026-02-27T09:00:00.000Z`).
pub fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_rfc3339() -> String {
    to_rfc3339(&now())
}

pub fn from_system_time(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// Parses an RFC 3339 timestamp and normalises it to UTC.
pub fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Filesystem-safe stamp: `:` and `.` replaced so names sort chronologically.
pub fn file_stamp(ts: &DateTime<Utc>) -> String {
    to_rfc3339(ts).replace([':', '.'], "-")
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}
