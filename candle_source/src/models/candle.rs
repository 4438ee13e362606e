//! Canonical in-memory representation of one exchange candle.
//!
//! This struct is the standard output of every [`CandleSource`](crate::providers::CandleSource)
//! implementation. It only lives for one ingestion cycle; the collector folds it
//! into a persisted minute record and drops it.

use chrono::{DateTime, Utc};

use crate::providers::SourceError;

/// A single OHLC-style candle for a given timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleTick {
    /// Start of the candle interval (UTC).
    pub timestamp: DateTime<Utc>,

    /// Opening price.
    pub open: f64,

    /// Lowest price during the interval.
    pub min: f64,

    /// Highest price during the interval.
    pub max: f64,

    /// Last traded price of the interval (in-progress candles report the latest trade).
    pub close: f64,

    /// Base volume traded during the interval. Not all sources supply this.
    pub volume: Option<f64>,
}

impl CandleTick {
    /// Checks the shape of a single candle: finite prices and `min <= max`.
    pub fn validate(&self) -> Result<(), SourceError> {
        let prices = [self.open, self.min, self.max, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(SourceError::Malformed(format!(
                "non-finite price in candle at {}",
                self.timestamp
            )));
        }
        if self.min > self.max {
            return Err(SourceError::Malformed(format!(
                "candle at {} has min {} above max {}",
                self.timestamp, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Sorts candles ascending by timestamp and validates each one.
///
/// Duplicate timestamps are rejected: a source must not report two candles for
/// the same interval in one response.
pub fn normalize_series(mut ticks: Vec<CandleTick>) -> Result<Vec<CandleTick>, SourceError> {
    ticks.sort_by_key(|t| t.timestamp);
    for t in &ticks {
        t.validate()?;
    }
    if let Some(pair) = ticks.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
        return Err(SourceError::Malformed(format!(
            "duplicate candle timestamp {}",
            pair[0].timestamp
        )));
    }
    Ok(ticks)
}
