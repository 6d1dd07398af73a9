//! Subscriber setup for the sync process.
//!
//! Logs go to stderr unless a directory is configured, in which case they are
//! written to a daily-rotated `modsync.log` file there without ANSI colors.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::Subscriber;
use tracing_appender::rolling;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{TelemetryError, TelemetryResult};

/// File name prefix of rotated log files.
const LOG_FILE_PREFIX: &str = "modsync.log";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable.
    #[default]
    Pretty,
    /// One line per event, abbreviated.
    Compact,
    /// Newline-delimited JSON.
    Json,
    /// One line per event with every field.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::ConfigError(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Where log lines are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard error.
    #[default]
    Stderr,
    /// Daily-rotated files in this directory.
    File(PathBuf),
}

/// Logging setup for a sync process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default level filter, e.g. `info`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Output destination.
    pub target: LogTarget,
    /// Per-target overrides such as `modsync_poller=debug`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Log at `level` to stderr in the pretty format.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directives: Vec::new(),
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Write to daily-rotated files under `dir`.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target = LogTarget::File(dir.into());
        self
    }

    /// Add a per-target directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;
        for directive in &self.directives {
            let directive: Directive = directive
                .parse()
                .map_err(|e: ParseError| TelemetryError::ConfigError(e.to_string()))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }

    fn writer(&self) -> TelemetryResult<(BoxMakeWriter, bool)> {
        match &self.target {
            LogTarget::Stderr => Ok((BoxMakeWriter::new(std::io::stderr), true)),
            LogTarget::File(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok((BoxMakeWriter::new(rolling::daily(dir, LOG_FILE_PREFIX)), false))
            },
        }
    }

    fn layer<S>(&self, writer: BoxMakeWriter, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
        match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Full => layer.boxed(),
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::ConfigError`] for a malformed level or
/// directive, [`TelemetryError::IoError`] if the log directory cannot be
/// created, and [`TelemetryError::InitError`] if a global subscriber is
/// already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;
    let (writer, ansi) = config.writer()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(config.layer(writer, ansi))
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

#[cfg(feature = "config")]
impl TryFrom<&modsync_config::LoggingConfig> for LogConfig {
    type Error = TelemetryError;

    fn try_from(section: &modsync_config::LoggingConfig) -> TelemetryResult<Self> {
        let mut config = Self::new(section.level.clone()).with_format(section.format.parse()?);
        if let Some(dir) = &section.file_dir {
            config = config.with_log_dir(dir.clone());
        }
        config.directives.clone_from(&section.directives);
        Ok(config)
    }
}
