//! Best-effort metrics for the synchronization loops.
//!
//! The metrics backend is pluggable through [`SyncMetrics`]. Recording a
//! metric must never interfere with the control loop that emits it, so every
//! call site goes through [`record_best_effort`], which swallows both errors
//! and panics raised by the sink.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tracing::debug;

use crate::error::MetricsError;

/// Metric name for the poll counter.
pub const POLL_COUNT: &str = "module_map_poll_total";
/// Metric name for the "seconds until next poll" gauge.
pub const NEXT_POLL_SECONDS: &str = "module_map_next_poll_seconds";
/// Metric name for the consecutive error gauge.
pub const CONSECUTIVE_ERRORS: &str = "module_map_poll_consecutive_errors";

/// Sink for the metrics emitted by the module map poller.
pub trait SyncMetrics: Send + Sync {
    /// A poll attempt started.
    ///
    /// # Errors
    ///
    /// Returns a [`MetricsError`] if the sink could not record the value.
    fn poll_started(&self) -> Result<(), MetricsError>;

    /// The next poll is scheduled `delay` from now.
    ///
    /// # Errors
    ///
    /// Returns a [`MetricsError`] if the sink could not record the value.
    fn next_poll_in(&self, delay: Duration) -> Result<(), MetricsError>;

    /// Number of consecutive failed or partially failed poll attempts.
    ///
    /// # Errors
    ///
    /// Returns a [`MetricsError`] if the sink could not record the value.
    fn consecutive_errors(&self, count: u64) -> Result<(), MetricsError>;
}

/// Run a metrics call, discarding any error or panic it raises.
///
/// Returns `true` if the value was recorded.
pub fn record_best_effort<F>(metric: &'static str, record: F) -> bool
where
    F: FnOnce() -> Result<(), MetricsError>,
{
    match catch_unwind(AssertUnwindSafe(record)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(metric, error = %e, "metric not recorded");
            false
        },
        Err(_) => {
            debug!(metric, "metrics sink panicked; value dropped");
            false
        },
    }
}

/// Emits metrics as `tracing` debug events under the `modsync::metrics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl SyncMetrics for TracingMetrics {
    fn poll_started(&self) -> Result<(), MetricsError> {
        debug!(target: "modsync::metrics", metric = POLL_COUNT, "increment");
        Ok(())
    }

    fn next_poll_in(&self, delay: Duration) -> Result<(), MetricsError> {
        debug!(
            target: "modsync::metrics",
            metric = NEXT_POLL_SECONDS,
            value = delay.as_secs_f64(),
            "set"
        );
        Ok(())
    }

    fn consecutive_errors(&self, count: u64) -> Result<(), MetricsError> {
        debug!(
            target: "modsync::metrics",
            metric = CONSECUTIVE_ERRORS,
            value = count,
            "set"
        );
        Ok(())
    }
}

/// Discards every metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl SyncMetrics for NoopMetrics {
    fn poll_started(&self) -> Result<(), MetricsError> {
        Ok(())
    }

    fn next_poll_in(&self, _delay: Duration) -> Result<(), MetricsError> {
        Ok(())
    }

    fn consecutive_errors(&self, _count: u64) -> Result<(), MetricsError> {
        Ok(())
    }
}
