use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the module directory watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// A watcher interval is zero.
    #[error("{name} must be greater than zero")]
    InvalidInterval {
        /// Which interval.
        name: &'static str,
    },
    /// The module directory could not be listed.
    #[error("failed to list {path}: {source}")]
    Io {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A specialized Result type for watcher operations.
pub type WatchResult<T> = Result<T, WatchError>;
