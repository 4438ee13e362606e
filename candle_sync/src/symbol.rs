//! Typed symbol identity.
//!
//! A [`Symbol`] is validated once at the edge; a [`SymbolHandle`] is what the
//! store hands back after registering the symbol, and it is the only way to
//! address that symbol's rows. No table or query text is ever built from the
//! symbol string.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("symbol must not be empty")]
    Empty,
    #[error("symbol {0:?} must be 1..=32 ASCII letters or digits")]
    Invalid(String),
}

/// Exchange symbol, upper-cased (e.g., `BTCUSD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, SymbolError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(SymbolError::Empty);
        }
        if s.len() > 32 || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SymbolError::Invalid(s.to_string()));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `BTCUSD`.
impl Default for Symbol {
    fn default() -> Self {
        Self("BTCUSD".to_string())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

/// A registered symbol: its row id in `tracked_symbol` plus the symbol itself.
///
/// Only [`crate::store::ensure_schema`] constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolHandle {
    pub(crate) id: i32,
    pub(crate) symbol: Symbol,
}

impl SymbolHandle {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }
}
