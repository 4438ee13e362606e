//! UTC minute bucket mapping.
//!
//! - One stable epoch: Unix (1970-01-01T00:00:00Z).
//! - A bucket id is the number of whole minutes since the epoch.
//! - Every timestamp is truncated to its bucket start before it is stored, so a
//!   candle stamped `09:00:00.000Z` and a tick at `09:00:42Z` land on the same record.

use chrono::{DateTime, Duration, Utc};

/// Unix epoch start (1970-01-01T00:00:00Z).
pub const EPOCH_UNIX: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Number of seconds in a minute.
pub const SECS_PER_MINUTE: i64 = 60;

/// Compute the minute bucket id for a UTC timestamp.
pub fn minute_id(ts_utc: DateTime<Utc>) -> u64 {
    let secs = ts_utc.signed_duration_since(EPOCH_UNIX).num_seconds();
    secs.div_euclid(SECS_PER_MINUTE) as u64
}

/// Get the UTC start instant for a minute bucket id.
pub fn minute_start_utc(id: u64) -> DateTime<Utc> {
    // Use i128 internally to avoid accidental overflow in extreme cases.
    let offset_secs = (id as i128) * (SECS_PER_MINUTE as i128);
    EPOCH_UNIX + Duration::seconds(offset_secs as i64)
}

/// Truncate a timestamp to the start of its minute.
pub fn truncate_to_minute(ts_utc: DateTime<Utc>) -> DateTime<Utc> {
    minute_start_utc(minute_id(ts_utc))
}

/// The minute immediately before `ts_utc`'s minute.
pub fn previous_minute(ts_utc: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(ts_utc) - Duration::minutes(1)
}

/// Start of the minute `n` minutes before `ts_utc`'s minute, or `None` when
/// that lies outside the representable calendar.
pub fn minutes_before(ts_utc: DateTime<Utc>, n: usize) -> Option<DateTime<Utc>> {
    let span = Duration::try_minutes(i64::try_from(n).ok()?)?;
    truncate_to_minute(ts_utc).checked_sub_signed(span)
}

/// Exclusive end bucket for a window ending at `window_end`: a partially covered
/// last minute still counts.
#[inline]
pub fn end_minute_exclusive(window_end: DateTime<Utc>) -> u64 {
    let end_id = minute_id(window_end);
    if minute_start_utc(end_id) < window_end {
        end_id + 1
    } else {
        end_id
    }
}
