//! Current price snapshot for one symbol.

use chrono::{DateTime, Utc};

/// Ticker snapshot. Bid/ask may be absent on an empty book.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub last: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub low: f64,
    pub high: f64,
    pub timestamp: DateTime<Utc>,
}
