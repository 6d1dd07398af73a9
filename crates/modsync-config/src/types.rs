//! Configuration struct definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Root configuration for a modsync process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Module map synchronization settings.
    pub sync: SyncConfig,
    /// Remote poll interval bounds.
    pub polling: PollingConfig,
    /// Local development watcher settings.
    pub dev_watch: DevWatchConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Module map synchronization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the root module. Every valid module map contains it.
    pub root_module_name: String,
    /// URL the module map is fetched from.
    pub module_map_url: String,
    /// Maximum number of non-root modules loaded concurrently.
    pub load_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_module_name: String::new(),
            module_map_url: String::new(),
            load_batch_size: 10,
        }
    }
}

/// Poll interval bounds, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Shortest delay between polls (`ONE_MAP_POLLING_MIN`).
    pub min_secs: f64,
    /// Longest delay between polls (`ONE_MAP_POLLING_MAX`).
    pub max_secs: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_secs: 5.0,
            max_secs: 300.0,
        }
    }
}

impl PollingConfig {
    /// Convert to validated [`PollingBounds`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if either bound is negative or
    /// not finite, or if `max_secs < min_secs`.
    pub fn bounds(&self) -> ConfigResult<PollingBounds> {
        PollingBounds::from_secs(self.min_secs, self.max_secs)
    }
}

/// Validated minimum and maximum poll intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingBounds {
    min: Duration,
    max: Duration,
}

impl PollingBounds {
    /// Build bounds from second values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if either value is negative or
    /// not finite, or if `max_secs < min_secs`.
    pub fn from_secs(min_secs: f64, max_secs: f64) -> ConfigResult<Self> {
        let min = seconds_to_duration("polling.min_secs", min_secs)?;
        let max = seconds_to_duration("polling.max_secs", max_secs)?;
        Self::new(min, max)
    }

    /// Build bounds from durations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if `max < min`.
    pub fn new(min: Duration, max: Duration) -> ConfigResult<Self> {
        if max < min {
            return Err(ConfigError::ValidationError {
                field: "polling.max_secs".to_owned(),
                message: format!(
                    "maximum poll interval ({}s) must not be below the minimum ({}s)",
                    max.as_secs_f64(),
                    min.as_secs_f64()
                ),
            });
        }
        Ok(Self { min, max })
    }

    /// Shortest delay between polls.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Longest delay between polls.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for PollingBounds {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}

fn seconds_to_duration(field: &str, secs: f64) -> ConfigResult<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::ValidationError {
        field: field.to_owned(),
        message: format!("{secs} is not a non-negative number of seconds"),
    })
}

/// Local development watcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevWatchConfig {
    /// Watch the module directory instead of polling the remote module map.
    pub enabled: bool,
    /// Directory holding `<module>/<version>/<module>.node.js` bundles.
    pub module_dir: PathBuf,
    /// How often the directory is scanned for changed entrypoints.
    pub change_interval_ms: u64,
    /// How long a changed entrypoint must stay unchanged before reloading.
    pub settle_interval_ms: u64,
}

impl Default for DevWatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            module_dir: PathBuf::from("static/modules"),
            change_interval_ms: 1000,
            settle_interval_ms: 400,
        }
    }
}

impl DevWatchConfig {
    /// Scan interval as a [`Duration`].
    #[must_use]
    pub fn change_interval(&self) -> Duration {
        Duration::from_millis(self.change_interval_ms)
    }

    /// Settle interval as a [`Duration`].
    #[must_use]
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter.
    pub level: String,
    /// Output format: `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Per-target directive overrides, e.g. `modsync_poller=debug`.
    pub directives: Vec<String>,
    /// Write daily-rotated log files here instead of stderr.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
            file_dir: None,
        }
    }
}
