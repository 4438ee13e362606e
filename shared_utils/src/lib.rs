//! Small helpers shared by the collector crates.

pub mod config;
pub mod env;
