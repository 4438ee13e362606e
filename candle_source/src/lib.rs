//! Exchange-facing side of the collector: candle and ticker models, the
//! [`providers::CandleSource`] trait, and the HitBTC REST implementation.

pub mod models;
pub mod providers;

pub use models::{
    candle::CandleTick, period::Period, request_params::CandlesRequest, ticker::Ticker,
};
pub use providers::{CandleSource, ProviderInitError, SourceError};
