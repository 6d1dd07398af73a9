//! modsync Telemetry - Logging and metrics for the module map synchronizer.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - The [`SyncMetrics`] sink trait and a best-effort recording helper
//!
//! # Example
//!
//! ```rust,no_run
//! use modsync_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), modsync_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("modsync_poller=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("Logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;
pub mod metrics;

pub use error::{MetricsError, TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_logging};
pub use metrics::{NoopMetrics, SyncMetrics, TracingMetrics, record_best_effort};
