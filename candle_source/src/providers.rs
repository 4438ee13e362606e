//! Candle source abstraction.
//!
//! This module defines the [`CandleSource`] trait, the interface the collector
//! uses to pull candles and ticker snapshots from an exchange. Each concrete
//! exchange client implements it and handles its own wire format and validation.
//!
//! The trait is async and object safe, so callers can hold a
//! `Box<dyn CandleSource>` chosen at runtime.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use candle_source::models::{
//!     candle::CandleTick, request_params::CandlesRequest, ticker::Ticker,
//! };
//! use candle_source::providers::{CandleSource, SourceError};
//!
//! struct Silent;
//!
//! #[async_trait]
//! impl CandleSource for Silent {
//!     async fn get_candles(&self, req: &CandlesRequest) -> Result<Vec<CandleTick>, SourceError> {
//!         Err(SourceError::NoData { symbol: req.symbol.clone() })
//!     }
//!
//!     async fn get_ticker(&self, symbol: &str) -> Result<Ticker, SourceError> {
//!         Err(SourceError::NoData { symbol: symbol.to_string() })
//!     }
//! }
//! ```

pub mod errors;
pub mod hitbtc_rest;

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};

use crate::models::{candle::CandleTick, request_params::CandlesRequest, ticker::Ticker};

pub use errors::SourceError;

/// Trait for pulling candle data from an exchange.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetches the `req.limit` most recent candles for `req.symbol`.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<CandleTick>)` - candles ascending by timestamp, validated.
    /// * `Err(SourceError::NoData)` - the exchange returned an empty response.
    /// * `Err(SourceError::Malformed)` - a record failed shape/range validation.
    async fn get_candles(&self, req: &CandlesRequest) -> Result<Vec<CandleTick>, SourceError>;

    /// Fetches the current price snapshot for `symbol`.
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, SourceError>;
}

/// Errors that can occur while constructing a source instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// base URL is not an http(s) URL.
    #[snafu(display("Invalid exchange base URL: {url:?}"))]
    InvalidBaseUrl { url: String, backtrace: Backtrace },
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::period::Period;

    struct Fixed;
    struct Empty;

    #[async_trait]
    impl CandleSource for Fixed {
        async fn get_candles(&self, req: &CandlesRequest) -> Result<Vec<CandleTick>, SourceError> {
            let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            Ok((0..req.limit as i64)
                .map(|i| CandleTick {
                    timestamp: t + chrono::Duration::minutes(i),
                    open: 1.0,
                    min: 1.0,
                    max: 2.0,
                    close: 1.5,
                    volume: None,
                })
                .collect())
        }

        async fn get_ticker(&self, symbol: &str) -> Result<Ticker, SourceError> {
            Ok(Ticker {
                symbol: symbol.to_string(),
                last: 1.5,
                bid: None,
                ask: None,
                low: 1.0,
                high: 2.0,
                timestamp: Utc::now(),
            })
        }
    }

    #[async_trait]
    impl CandleSource for Empty {
        async fn get_candles(&self, req: &CandlesRequest) -> Result<Vec<CandleTick>, SourceError> {
            Err(SourceError::NoData {
                symbol: req.symbol.clone(),
            })
        }

        async fn get_ticker(&self, symbol: &str) -> Result<Ticker, SourceError> {
            Err(SourceError::NoData {
                symbol: symbol.to_string(),
            })
        }
    }

    // Runtime choice only works through `Box<dyn CandleSource>`.
    fn get_source(name: &str) -> Box<dyn CandleSource> {
        if name == "fixed" {
            Box::new(Fixed)
        } else {
            Box::new(Empty)
        }
    }

    #[tokio::test]
    async fn dynamic_source_dispatch() {
        let req = CandlesRequest::new("BTCUSD", 3, Period::M1);

        let candles = get_source("fixed").get_candles(&req).await.unwrap();
        assert_eq!(candles.len(), 3);

        let err = get_source("empty").get_candles(&req).await.unwrap_err();
        assert!(err.is_no_data());
        assert!(get_source("empty").get_ticker("BTCUSD").await.unwrap_err().is_no_data());
    }
}
