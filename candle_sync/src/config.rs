//! Collector configuration: TOML file, defaults, and environment overrides.
//!
//! ```toml
//! [exchange]
//! base_url = "https://api.hitbtc.com"
//! timeout_ms = 10000
//!
//! [collector]
//! symbol = "BTCUSD"
//! refresh_ms = 1000
//! seed_limit = 1000
//! # cycles = 60
//!
//! [store]
//! database_url = "candles.db"
//!
//! [indicators]
//! conversion = 10
//! base = 30
//! span_b = 120
//! ```
//!
//! Every section and key is optional. `DATABASE_URL` takes precedence over
//! `store.database_url`; `CANDLE_SYNC_REFRESH_MS` over `collector.refresh_ms`.

use std::{path::Path, time::Duration};

use anyhow::{Context, bail};
use candle_source::providers::hitbtc_rest::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use shared_utils::{
    config::{ConfigError, parse_env_var},
    env::{MissingEnvVarError, get_env_var},
};

use crate::{
    collector::{CollectorConfig, DEFAULT_SEED_LIMIT},
    indicators::IchimokuPeriods,
    symbol::Symbol,
};

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const REFRESH_MS_ENV: &str = "CANDLE_SYNC_REFRESH_MS";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    pub exchange: ExchangeCfg,
    pub collector: CollectorCfg,
    pub store: StoreCfg,
    pub indicators: IchimokuPeriods,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExchangeCfg {
    pub base_url: String,
    /// Per-request HTTP timeout.
    pub timeout_ms: u64,
}

impl Default for ExchangeCfg {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct CollectorCfg {
    pub symbol: Symbol,
    pub refresh_ms: u64,
    pub seed_limit: u32,
    /// Stop after this many cycles; absent means run until interrupted.
    pub cycles: Option<u64>,
}

impl Default for CollectorCfg {
    fn default() -> Self {
        Self {
            symbol: Symbol::default(),
            refresh_ms: 1_000,
            seed_limit: DEFAULT_SEED_LIMIT,
            cycles: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreCfg {
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Parse and validate a TOML document.
    pub fn load_str(s: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::load_str(&text).with_context(|| format!("load config {}", path.display()))
    }

    /// File (or defaults), then env overrides, then validation of the merged result.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::load_path(p)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `CANDLE_SYNC_REFRESH_MS` when set.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(ms) = parse_env_var::<u64>(REFRESH_MS_ENV)? {
            self.collector.refresh_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.exchange.timeout_ms == 0 {
            bail!("exchange.timeout_ms must be positive");
        }
        if self.collector.refresh_ms == 0 {
            bail!("collector.refresh_ms must be positive");
        }
        if !(1..=DEFAULT_SEED_LIMIT).contains(&self.collector.seed_limit) {
            bail!(
                "collector.seed_limit must be within 1..={DEFAULT_SEED_LIMIT}, got {}",
                self.collector.seed_limit
            );
        }
        let p = self.indicators;
        if p.conversion == 0 || p.base == 0 || p.span_b == 0 {
            bail!("indicator periods must be positive");
        }
        Ok(())
    }

    /// `DATABASE_URL` when set, else `store.database_url`.
    pub fn database_url(&self) -> Result<String, MissingEnvVarError> {
        match get_env_var(DATABASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(url),
            _ => self
                .store
                .database_url
                .clone()
                .ok_or_else(|| MissingEnvVarError(DATABASE_URL_ENV.to_string())),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.exchange.timeout_ms)
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            symbol: self.collector.symbol.clone(),
            refresh: Duration::from_millis(self.collector.refresh_ms),
            seed_limit: self.collector.seed_limit,
            cycles: self.collector.cycles,
        }
    }
}
