//! Windowed aggregation over stored minutes.
//!
//! Window convention: `num_minutes` is the window length and `offset_from_now`
//! is the number of windows. The query reads the minutes in
//! `[as_of - (num_minutes + offset_from_now), as_of]`; window `s` (for `s` in
//! `0..offset_from_now`) reduces records `[s, s + num_minutes)` of that ascending
//! sequence. The result therefore needs at least `num_minutes + offset_from_now - 1`
//! records and always holds exactly `offset_from_now` windows, oldest first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use serde::Serialize;
use thiserror::Error;

use crate::{
    bucket,
    models::MinuteRecord,
    store::{MinuteStore, StoreError},
};

/// Min/max reduced over one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateWindow {
    /// Timestamp of the most recent record inside the window.
    pub anchor_date: DateTime<Utc>,
    pub min: f64,
    pub max: f64,
}

impl AggregateWindow {
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no records in the requested range")]
    NoData,

    #[error("insufficient history: need {required} records, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("invalid window: num_minutes={num_minutes}, offset_from_now={offset_from_now}")]
    InvalidWindow {
        num_minutes: usize,
        offset_from_now: usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type AggregateResult<T> = Result<T, AggregateError>;

fn check_window(num_minutes: usize, offset_from_now: usize) -> AggregateResult<()> {
    if num_minutes == 0 || offset_from_now == 0 {
        return Err(AggregateError::InvalidWindow {
            num_minutes,
            offset_from_now,
        });
    }
    Ok(())
}

fn invalid(num_minutes: usize, offset_from_now: usize) -> AggregateError {
    AggregateError::InvalidWindow {
        num_minutes,
        offset_from_now,
    }
}

/// `num_minutes + offset_from_now`, rejecting sums that do not fit.
fn span(num_minutes: usize, offset_from_now: usize) -> AggregateResult<usize> {
    num_minutes
        .checked_add(offset_from_now)
        .ok_or_else(|| invalid(num_minutes, offset_from_now))
}

/// Sliding min/max of `window` records, `count` times, advancing one record each time.
///
/// Runs in O(len) with two monotonic deques of indices.
pub fn sliding_highlow(
    records: &[MinuteRecord],
    window: usize,
    count: usize,
) -> AggregateResult<Vec<AggregateWindow>> {
    check_window(window, count)?;
    if records.is_empty() {
        return Err(AggregateError::NoData);
    }
    let required = span(window, count - 1).map_err(|_| invalid(window, count))?;
    if records.len() < required {
        return Err(AggregateError::InsufficientHistory {
            required,
            available: records.len(),
        });
    }

    // front of `lows` is the index of the smallest min in the window, `highs` the largest max
    let mut lows: VecDeque<usize> = VecDeque::with_capacity(window);
    let mut highs: VecDeque<usize> = VecDeque::with_capacity(window);
    let mut out = Vec::with_capacity(count);

    for (i, rec) in records.iter().enumerate().take(required) {
        while lows.back().is_some_and(|&j| records[j].min >= rec.min) {
            lows.pop_back();
        }
        lows.push_back(i);
        while highs.back().is_some_and(|&j| records[j].max <= rec.max) {
            highs.pop_back();
        }
        highs.push_back(i);

        if i + 1 < window {
            continue;
        }
        let start = i + 1 - window;
        while lows.front().is_some_and(|&j| j < start) {
            lows.pop_front();
        }
        while highs.front().is_some_and(|&j| j < start) {
            highs.pop_front();
        }

        if let (Some(&lo), Some(&hi)) = (lows.front(), highs.front()) {
            out.push(AggregateWindow {
                anchor_date: rec.timestamp,
                min: records[lo].min,
                max: records[hi].max,
            });
        }
    }

    Ok(out)
}

/// Read-only queries over one symbol's store.
pub struct Aggregator<'s, S: MinuteStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: MinuteStore + ?Sized> Aggregator<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// The last `minutes` minute records up to and including the minute of `as_of`.
    pub fn get_minmax_over_time_at(
        &self,
        conn: &mut SqliteConnection,
        minutes_back: usize,
        as_of: DateTime<Utc>,
    ) -> AggregateResult<Vec<MinuteRecord>> {
        check_window(minutes_back, 1)?;
        let end = bucket::truncate_to_minute(as_of);
        let start =
            bucket::minutes_before(as_of, minutes_back - 1).ok_or_else(|| invalid(minutes_back, 1))?;
        let records = self.store.range_query(conn, start, Some(end))?;
        if records.is_empty() {
            return Err(AggregateError::NoData);
        }
        if records.len() < minutes_back {
            return Err(AggregateError::InsufficientHistory {
                required: minutes_back,
                available: records.len(),
            });
        }
        Ok(records)
    }

    pub fn get_minmax_over_time(
        &self,
        conn: &mut SqliteConnection,
        minutes_back: usize,
    ) -> AggregateResult<Vec<MinuteRecord>> {
        self.get_minmax_over_time_at(conn, minutes_back, Utc::now())
    }

    /// `offset_from_now` high/low windows of `num_minutes` each, oldest first.
    pub fn get_highlow_over_time_at(
        &self,
        conn: &mut SqliteConnection,
        num_minutes: usize,
        offset_from_now: usize,
        as_of: DateTime<Utc>,
    ) -> AggregateResult<Vec<AggregateWindow>> {
        check_window(num_minutes, offset_from_now)?;
        let end = bucket::truncate_to_minute(as_of);
        let start = bucket::minutes_before(as_of, span(num_minutes, offset_from_now)?)
            .ok_or_else(|| invalid(num_minutes, offset_from_now))?;
        let records = self.store.range_query(conn, start, Some(end))?;
        sliding_highlow(&records, num_minutes, offset_from_now)
    }

    pub fn get_highlow_over_time(
        &self,
        conn: &mut SqliteConnection,
        num_minutes: usize,
        offset_from_now: usize,
    ) -> AggregateResult<Vec<AggregateWindow>> {
        self.get_highlow_over_time_at(conn, num_minutes, offset_from_now, Utc::now())
    }

    /// `num_minutes` known closes starting `num_minutes + offset_from_now` minutes before `as_of`.
    pub fn get_closing_prices_over_time_at(
        &self,
        conn: &mut SqliteConnection,
        num_minutes: usize,
        offset_from_now: usize,
        as_of: DateTime<Utc>,
    ) -> AggregateResult<Vec<(DateTime<Utc>, f64)>> {
        if num_minutes == 0 {
            return Err(invalid(num_minutes, offset_from_now));
        }
        let not_before = bucket::minutes_before(as_of, span(num_minutes, offset_from_now)?)
            .ok_or_else(|| invalid(num_minutes, offset_from_now))?;
        let limit = i64::try_from(num_minutes).map_err(|_| invalid(num_minutes, offset_from_now))?;
        let closes = self.store.closing_prices(conn, not_before, limit)?;
        if closes.is_empty() {
            return Err(AggregateError::NoData);
        }
        if closes.len() < num_minutes {
            return Err(AggregateError::InsufficientHistory {
                required: num_minutes,
                available: closes.len(),
            });
        }
        Ok(closes)
    }

    pub fn get_closing_prices_over_time(
        &self,
        conn: &mut SqliteConnection,
        num_minutes: usize,
        offset_from_now: usize,
    ) -> AggregateResult<Vec<(DateTime<Utc>, f64)>> {
        self.get_closing_prices_over_time_at(conn, num_minutes, offset_from_now, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn series(pairs: &[(f64, f64)]) -> Vec<MinuteRecord> {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        pairs
            .iter()
            .enumerate()
            .map(|(i, &(min, max))| MinuteRecord {
                timestamp: t0 + Duration::minutes(i as i64),
                min,
                max,
                closing_price: None,
            })
            .collect()
    }

    fn brute_force(records: &[MinuteRecord], window: usize, count: usize) -> Vec<AggregateWindow> {
        (0..count)
            .map(|s| {
                let slice = &records[s..s + window];
                AggregateWindow {
                    anchor_date: slice[window - 1].timestamp,
                    min: slice.iter().map(|r| r.min).fold(f64::INFINITY, f64::min),
                    max: slice.iter().map(|r| r.max).fold(f64::NEG_INFINITY, f64::max),
                }
            })
            .collect()
    }

    #[test]
    fn windows_are_oldest_first_and_anchored_on_last_record() {
        let recs = series(&[(5.0, 6.0), (3.0, 9.0), (4.0, 4.5), (7.0, 8.0)]);
        let got = sliding_highlow(&recs, 2, 3).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!((got[0].min, got[0].max), (3.0, 9.0));
        assert_eq!((got[1].min, got[1].max), (3.0, 9.0));
        assert_eq!((got[2].min, got[2].max), (4.0, 8.0));
        assert_eq!(got[0].anchor_date, recs[1].timestamp);
        assert_eq!(got[2].anchor_date, recs[3].timestamp);
        assert_eq!(got[2].midpoint(), 6.0);
    }

    #[test]
    fn exact_minimum_history_is_enough() {
        let recs = series(&[(1.0, 2.0); 4]);
        assert_eq!(sliding_highlow(&recs, 3, 2).unwrap().len(), 2);
    }

    #[test]
    fn one_record_short_is_insufficient() {
        let recs = series(&[(1.0, 2.0); 3]);
        assert!(matches!(
            sliding_highlow(&recs, 3, 2),
            Err(AggregateError::InsufficientHistory {
                required: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn overflowing_window_is_invalid_not_a_panic() {
        let recs = series(&[(1.0, 2.0); 3]);
        assert!(matches!(
            sliding_highlow(&recs, usize::MAX, 2),
            Err(AggregateError::InvalidWindow { .. })
        ));
        assert!(matches!(
            sliding_highlow(&recs, 2, usize::MAX),
            Err(AggregateError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn empty_and_zero_windows() {
        assert!(matches!(
            sliding_highlow(&[], 3, 2),
            Err(AggregateError::NoData)
        ));
        let recs = series(&[(1.0, 2.0)]);
        assert!(matches!(
            sliding_highlow(&recs, 0, 1),
            Err(AggregateError::InvalidWindow { .. })
        ));
        assert!(matches!(
            sliding_highlow(&recs, 1, 0),
            Err(AggregateError::InvalidWindow { .. })
        ));
    }

    proptest! {
        #[test]
        fn deque_matches_brute_force(
            raw in prop::collection::vec((0.0f64..1000.0, 0.0f64..50.0), 1..120),
            window in 1usize..40,
            count in 1usize..40,
        ) {
            let pairs: Vec<(f64, f64)> = raw.iter().map(|&(lo, spread)| (lo, lo + spread)).collect();
            let recs = series(&pairs);
            match sliding_highlow(&recs, window, count) {
                Ok(got) => {
                    prop_assert!(recs.len() >= window + count - 1);
                    prop_assert_eq!(got.len(), count);
                    prop_assert_eq!(got, brute_force(&recs, window, count));
                }
                Err(AggregateError::InsufficientHistory { required, available }) => {
                    prop_assert_eq!(required, window + count - 1);
                    prop_assert!(available < required);
                }
                Err(e) => prop_assert!(false, "unexpected error: {e}"),
            }
        }
    }
}
