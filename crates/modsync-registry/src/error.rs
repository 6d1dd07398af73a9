use thiserror::Error;

/// Errors that abort a whole synchronization attempt.
///
/// Per-module load failures are not errors; they are reported in
/// [`SyncOutcome::rejected`](crate::sync::SyncOutcome::rejected).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The fetched module map does not contain the root module.
    #[error("module map does not contain the root module '{name}'")]
    MissingRootModule {
        /// Configured root module name.
        name: String,
    },
    /// The module map could not be fetched.
    #[error("failed to fetch module map: {0}")]
    Fetch(String),
    /// The module map does not match the expected schema.
    #[error("module map does not match the expected schema: {0}")]
    ManifestParse(String),
    /// The root module failed to load or validate.
    #[error("root module '{name}' was rejected: {reason}")]
    RootModuleRejected {
        /// Root module name.
        name: String,
        /// Why the root module was rejected.
        reason: String,
    },
}

/// A specialized Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
