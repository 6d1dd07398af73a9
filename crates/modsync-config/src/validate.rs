//! Post-merge configuration validation.
//!
//! Validates that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges and that cross-field invariants hold.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_sync(config)?;
    config.polling.bounds()?;
    validate_dev_watch(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_sync(config: &Config) -> ConfigResult<()> {
    let s = &config.sync;

    if s.root_module_name.trim().is_empty() {
        return Err(invalid(
            "sync.root_module_name",
            "a root module name is required (set ONE_CLIENT_ROOT_MODULE_NAME)",
        ));
    }

    if s.load_batch_size == 0 {
        return Err(invalid("sync.load_batch_size", "must be at least 1"));
    }

    // The dev watcher reads modules from disk; only remote polling needs a URL.
    if !config.dev_watch.enabled
        && !(s.module_map_url.starts_with("http://") || s.module_map_url.starts_with("https://"))
    {
        return Err(invalid(
            "sync.module_map_url",
            format!(
                "'{}' is not an http(s) URL (set HOLOCRON_MODULE_MAP_URL)",
                s.module_map_url
            ),
        ));
    }

    Ok(())
}

fn validate_dev_watch(config: &Config) -> ConfigResult<()> {
    let d = &config.dev_watch;
    if !d.enabled {
        return Ok(());
    }

    if d.change_interval_ms == 0 {
        return Err(invalid("dev_watch.change_interval_ms", "must be non-zero"));
    }
    if d.settle_interval_ms == 0 {
        return Err(invalid("dev_watch.settle_interval_ms", "must be non-zero"));
    }
    if d.module_dir.as_os_str().is_empty() {
        return Err(invalid("dev_watch.module_dir", "must not be empty"));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let format = config.logging.format.as_str();
    if !matches!(format, "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!("unsupported format '{format}'; expected one of: pretty, compact, json, full"),
        ));
    }
    Ok(())
}
