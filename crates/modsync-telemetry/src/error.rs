//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Initialization error.
    #[error("Initialization error: {0}")]
    InitError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// A metrics sink failed to record a value.
#[derive(Debug, Error)]
#[error("metric '{metric}' not recorded: {message}")]
pub struct MetricsError {
    /// Metric name.
    pub metric: &'static str,
    /// Failure description.
    pub message: String,
}

impl MetricsError {
    /// Create a metrics error.
    #[must_use]
    pub fn new(metric: &'static str, message: impl Into<String>) -> Self {
        Self {
            metric,
            message: message.into(),
        }
    }
}
