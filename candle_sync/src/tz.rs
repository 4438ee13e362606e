//! Timestamp text encoding used by the store.
//!
//! All database writes are RFC-3339 UTC strings with millisecond precision and a
//! `Z` suffix (e.g., `2024-05-01T09:00:00.000Z`). That fixed width makes text
//! comparison agree with chronological order, which the range scans rely on.
//! Local or offset timestamps are only accepted at API/CLI edges.

use anyhow::Context;
use chrono::{DateTime, Utc};

/// RFC-3339 with offset -> UTC.
///
/// Example:
/// - "2024-03-10T09:30:00-05:00" -> "2024-03-10T14:30:00Z"
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
