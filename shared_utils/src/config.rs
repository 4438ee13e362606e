use std::str::FromStr;

use thiserror::Error;

use crate::env::get_env_var_opt;

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable is set but does not parse into the expected type.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// Raw value that failed to parse.
        value: String,
    },
}

/// Reads and parses an optional environment variable.
///
/// Returns `Ok(None)` when the variable is unset or blank, and an
/// [`ConfigError::InvalidEnvVar`] when it is set to something unparsable.
pub fn parse_env_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match get_env_var_opt(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                value: raw,
            }),
    }
}
