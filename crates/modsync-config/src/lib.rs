#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration for the modsync module map synchronizer.
//!
//! # Usage
//!
//! ```rust,no_run
//! use modsync_config::Config;
//!
//! // defaults → optional file → ONE_MAP_POLLING_MIN / ONE_MAP_POLLING_MAX / ...
//! let config = Config::load(Some(std::path::Path::new("modsync.toml"))).unwrap();
//! let bounds = config.polling.bounds().unwrap();
//! println!("polling between {:?} and {:?}", bounds.min(), bounds.max());
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`ONE_MAP_POLLING_MIN`, `ONE_MAP_POLLING_MAX`,
//!    `HOLOCRON_MODULE_MAP_URL`, `ONE_CLIENT_ROOT_MODULE_NAME`)
//! 2. **Config file** passed to [`Config::load`]
//! 3. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! Every error is a startup error. Nothing in this crate is retried.

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Layered configuration merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration from defaults, `config_path` and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file or an environment variable is
    /// malformed, or the final configuration fails validation.
    pub fn load(config_path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(config_path, &env::collect_env_vars())
    }
}
