use thiserror::Error;

/// Errors raised while setting up or controlling the poller.
///
/// Poll attempts never return errors; their failures are reported through
/// [`PollReport`](crate::PollReport) and the health flag.
#[derive(Debug, Error)]
pub enum PollerError {
    /// The polling configuration is invalid.
    #[error("invalid polling configuration: {0}")]
    Config(#[from] modsync_config::ConfigError),
    /// The scheduler was shut down and cannot be restarted.
    #[error("poll scheduler has been shut down")]
    ShutDown,
}

/// A specialized Result type for poller operations.
pub type PollerResult<T> = Result<T, PollerError>;
