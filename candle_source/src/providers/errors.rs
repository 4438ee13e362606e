use thiserror::Error;

/// Errors that can occur within a [`CandleSource`](super::CandleSource) implementation.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The exchange answered with an empty payload. Transient; callers treat it as an empty cycle.
    #[error("No data returned for {symbol}")]
    NoData { symbol: String },

    /// A record failed shape or range validation.
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// An error during an API request (e.g., network failure, timeout).
    #[error("API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The exchange returned an error object (e.g., unknown symbol).
    #[error("API error: {0}")]
    Api(String),

    /// The request parameters were invalid for this source.
    #[error("Invalid parameters for provider: {0}")]
    Validation(String),
}

impl SourceError {
    /// `true` for the transient "nothing this time" condition.
    pub fn is_no_data(&self) -> bool {
        matches!(self, SourceError::NoData { .. })
    }
}
