use serde::{Deserialize, Serialize};

use crate::{models::period::Period, providers::SourceError};

/// Largest page the exchange returns for one candles request.
pub const MAX_CANDLES_LIMIT: u32 = 1000;

/// Parameters for one candles request: which symbol, how many of the most
/// recent candles, and at which period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandlesRequest {
    /// Exchange symbol (e.g., `"BTCUSD"`).
    pub symbol: String,

    /// Number of most recent candles, `1..=MAX_CANDLES_LIMIT`.
    pub limit: u32,

    /// Candle interval.
    #[serde(default)]
    pub period: Period,
}

impl CandlesRequest {
    pub fn new(symbol: impl Into<String>, limit: u32, period: Period) -> Self {
        Self {
            symbol: symbol.into(),
            limit,
            period,
        }
    }

    /// Latest single one-minute candle.
    pub fn latest_minute(symbol: impl Into<String>) -> Self {
        Self::new(symbol, 1, Period::M1)
    }

    pub fn validate(&self) -> Result<(), SourceError> {
        if self.symbol.trim().is_empty() {
            return Err(SourceError::Validation("symbol must not be empty".into()));
        }
        if !(1..=MAX_CANDLES_LIMIT).contains(&self.limit) {
            return Err(SourceError::Validation(format!(
                "limit {} outside 1..={MAX_CANDLES_LIMIT}",
                self.limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_bounds() {
        assert!(CandlesRequest::new("BTCUSD", 0, Period::M1).validate().is_err());
        assert!(CandlesRequest::new("BTCUSD", 1001, Period::M1).validate().is_err());
        assert!(CandlesRequest::new("BTCUSD", 1000, Period::M1).validate().is_ok());
        assert!(CandlesRequest::new(" ", 1, Period::M1).validate().is_err());
    }
}
