use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeriodError {
    #[error("Invalid candle period: {0:?} (expected one of M1, M3, M5, M15, M30, H1, H4, D1, D7, 1M)")]
    Unknown(String),
}

/// Candle interval as named by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Period {
    #[default]
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    D7,
    /// One calendar month.
    #[serde(rename = "1M")]
    Month1,
}

impl Period {
    pub const ALL: [Period; 10] = [
        Period::M1,
        Period::M3,
        Period::M5,
        Period::M15,
        Period::M30,
        Period::H1,
        Period::H4,
        Period::D1,
        Period::D7,
        Period::Month1,
    ];

    /// Wire name used in the `period` query parameter.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Period::M1 => "M1",
            Period::M3 => "M3",
            Period::M5 => "M5",
            Period::M15 => "M15",
            Period::M30 => "M30",
            Period::H1 => "H1",
            Period::H4 => "H4",
            Period::D1 => "D1",
            Period::D7 => "D7",
            Period::Month1 => "1M",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PeriodError::Unknown(s.to_string()))
    }
}
