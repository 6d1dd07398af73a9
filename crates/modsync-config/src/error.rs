//! Configuration error types.

use std::io;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// All of these are startup failures: the process is expected to exit
/// rather than retry.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// Path to the config file that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("Failed to parse config file at {path}: {source}")]
    ParseError {
        /// Path to the config file that failed to parse.
        path: String,
        /// Underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A field (or the environment variable feeding it) holds an invalid value.
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// Field or environment variable that failed validation.
        field: String,
        /// Validation failure description.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
