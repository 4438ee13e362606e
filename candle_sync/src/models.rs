//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::minute_record`]: one row per (symbol, minute)
//! - [`crate::schema::pending_close`]: closing prices waiting for their minute
//!
//! [`MinuteRecord`] is the decoded, typed view handed to callers.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::{schema::*, store::StoreError, tz};

/// A stored minute: the widest min/max seen and the close, once known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinuteRecord {
    /// Minute start (UTC, seconds truncated).
    pub timestamp: DateTime<Utc>,
    pub min: f64,
    pub max: f64,
    /// Close of this minute, taken from the candle one minute later.
    pub closing_price: Option<f64>,
}

impl MinuteRecord {
    /// Merge an observation into this record.
    ///
    /// Commutative and associative over (min, max); a provided close replaces the old one.
    pub fn merge(&self, min: f64, max: f64, closing_price: Option<f64>) -> Self {
        Self {
            timestamp: self.timestamp,
            min: self.min.min(min),
            max: self.max.max(max),
            closing_price: closing_price.or(self.closing_price),
        }
    }
}

/// A row in [`crate::schema::minute_record`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = minute_record, check_for_backend(diesel::sqlite::Sqlite))]
pub struct MinuteRow {
    /// FK to `tracked_symbol.id`.
    pub symbol_id: i32,
    /// Minute start in RFC3339 UTC with milliseconds (e.g., "2024-05-01T09:00:00.000Z").
    pub date: String,
    pub min: f64,
    pub max: f64,
    pub closing_price: Option<f64>,
}

impl TryFrom<MinuteRow> for MinuteRecord {
    type Error = StoreError;

    fn try_from(row: MinuteRow) -> Result<Self, Self::Error> {
        let timestamp =
            tz::parse_ts_to_utc(&row.date).map_err(|_| StoreError::CorruptTimestamp(row.date))?;
        Ok(Self {
            timestamp,
            min: row.min,
            max: row.max,
            closing_price: row.closing_price,
        })
    }
}

/// Insertable form of [`MinuteRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = minute_record)]
pub struct NewMinuteRow<'a> {
    pub symbol_id: i32,
    pub date: &'a str,
    pub min: f64,
    pub max: f64,
    pub closing_price: Option<f64>,
}

/// A row in [`crate::schema::pending_close`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pending_close)]
pub struct NewPendingClose<'a> {
    pub symbol_id: i32,
    pub date: &'a str,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(min: f64, max: f64, close: Option<f64>) -> MinuteRecord {
        MinuteRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            min,
            max,
            closing_price: close,
        }
    }

    #[test]
    fn merge_widens_and_keeps_close_when_absent() {
        let merged = rec(10.0, 12.0, Some(11.0)).merge(9.5, 11.0, None);
        assert_eq!(merged.min, 9.5);
        assert_eq!(merged.max, 12.0);
        assert_eq!(merged.closing_price, Some(11.0));
    }

    #[test]
    fn merge_overwrites_close_when_provided() {
        let merged = rec(10.0, 12.0, Some(11.0)).merge(10.5, 11.5, Some(11.2));
        assert_eq!((merged.min, merged.max), (10.0, 12.0));
        assert_eq!(merged.closing_price, Some(11.2));
    }

    #[test]
    fn corrupt_date_is_reported() {
        let row = MinuteRow {
            symbol_id: 1,
            date: "yesterday".into(),
            min: 1.0,
            max: 2.0,
            closing_price: None,
        };
        assert!(matches!(
            MinuteRecord::try_from(row),
            Err(StoreError::CorruptTimestamp(d)) if d == "yesterday"
        ));
    }
}
