//! HitBTC public REST API (v2) candle source.

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{DEFAULT_BASE_URL, HitBtcProvider};
