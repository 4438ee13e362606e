//! Minute candle collector: a per-symbol SQLite time series of min/max/close,
//! the loop that keeps it current, and windowed queries over it.
//!
//! - [`store`]: upsert-with-merge, deferred closes, range scans
//! - [`collector`]: seeding plus the fixed-cadence sync loop
//! - [`aggregate`]: sliding high/low windows and closing-price series
//! - [`indicators`]: Ichimoku-style bands from the windows

pub mod aggregate;
pub mod bucket;
pub mod collector;
pub mod config;
pub mod db;
pub mod indicators;
pub mod models;
pub mod schema;
pub mod store;
pub mod symbol;
pub mod tz;
