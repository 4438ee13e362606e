use crate::{models::request_params::CandlesRequest, providers::SourceError};

/// Sort direction of the candles endpoint.
///
/// `Desc` is what makes `limit` select the *most recent* candles; the response is
/// re-sorted ascending before it leaves the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sort {
    Asc,
    #[default]
    Desc,
}

impl Sort {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Sort::Asc => "ASC",
            Sort::Desc => "DESC",
        }
    }
}

/// Symbols are plain uppercase alphanumerics on HitBTC (e.g., `BTCUSD`, `ETHBTC`).
pub fn validate_symbol(symbol: &str) -> Result<(), SourceError> {
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SourceError::Validation(format!(
            "symbol {symbol:?} must be non-empty ASCII alphanumeric"
        )));
    }
    Ok(())
}

/// Builds the query string for `GET /public/candles/{symbol}`.
pub fn construct_params(req: &CandlesRequest, sort: Sort) -> Vec<(String, String)> {
    vec![
        ("limit".to_string(), req.limit.to_string()),
        ("period".to_string(), req.period.as_str().to_string()),
        ("sort".to_string(), sort.as_str().to_string()),
    ]
}
