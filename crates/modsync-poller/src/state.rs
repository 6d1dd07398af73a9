//! Poll interval state and its transitions.

use std::time::Duration;

use modsync_config::PollingBounds;
use rand::Rng;
use tokio::time::Instant;

/// Lower bound of the backoff growth factor.
pub const BACKOFF_BASE: f64 = 1.25;

/// Upper bound (exclusive) of the random part added to [`BACKOFF_BASE`].
pub const BACKOFF_JITTER: f64 = 1.0 / 3.0;

/// Grow `previous` by `BACKOFF_BASE + jitter`, clamped to `max`.
///
/// `jitter` is clamped to `[0, BACKOFF_JITTER]` and a non-finite value counts
/// as zero, so the result is never below `previous * 1.25` unless `max` is
/// reached first.
#[must_use]
pub fn next_backoff(previous: Duration, max: Duration, jitter: f64) -> Duration {
    let jitter = if jitter.is_finite() {
        jitter.clamp(0.0, BACKOFF_JITTER)
    } else {
        0.0
    };
    let grown = previous.as_secs_f64() * (BACKOFF_BASE + jitter);
    Duration::try_from_secs_f64(grown).map_or(max, |next| next.min(max))
}

/// Draw a jitter value uniformly from `[0, BACKOFF_JITTER)`.
#[must_use]
pub fn random_jitter() -> f64 {
    rand::thread_rng().gen_range(0.0..BACKOFF_JITTER)
}

/// How a poll attempt ended, as far as interval bookkeeping is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    /// At least one module loaded and none were rejected.
    Loaded,
    /// Nothing needed loading.
    Unchanged,
    /// Some modules were rejected.
    Partial,
    /// The attempt was abandoned and rolled back.
    Failed,
}

/// Bookkeeping owned by the poll scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// Delay before the next scheduled poll.
    pub current_interval: Duration,
    /// When the most recent poll attempt started.
    pub last_heartbeat: Option<Instant>,
    /// When a poll attempt last reached the module map.
    pub last_success: Option<Instant>,
    /// When the driver will next poll on its own.
    pub next_poll_at: Option<Instant>,
    /// Failed or partially failed attempts since the last clean one.
    pub consecutive_errors: u64,
    /// Whether the last attempt reached the module map.
    pub healthy: bool,
    /// Attempts started since the scheduler was created.
    pub poll_count: u64,
}

impl PollState {
    /// Initial state: minimum interval, unhealthy, nothing polled yet.
    #[must_use]
    pub fn new(bounds: PollingBounds) -> Self {
        Self {
            current_interval: bounds.min(),
            last_heartbeat: None,
            last_success: None,
            next_poll_at: None,
            consecutive_errors: 0,
            healthy: false,
            poll_count: 0,
        }
    }

    /// Record the start of an attempt.
    pub fn heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = Some(now);
        self.poll_count = self.poll_count.saturating_add(1);
    }

    /// Update the interval, error count and health after an attempt.
    ///
    /// `jitter` is only used for [`AttemptKind::Unchanged`].
    pub fn complete(&mut self, kind: AttemptKind, bounds: PollingBounds, jitter: f64, now: Instant) {
        match kind {
            AttemptKind::Loaded => {
                self.current_interval = bounds.min();
                self.consecutive_errors = 0;
            },
            AttemptKind::Unchanged => {
                self.current_interval = next_backoff(self.current_interval, bounds.max(), jitter);
                self.consecutive_errors = 0;
            },
            AttemptKind::Partial | AttemptKind::Failed => {
                self.current_interval = bounds.min();
                self.consecutive_errors = self.consecutive_errors.saturating_add(1);
            },
        }

        self.healthy = kind != AttemptKind::Failed;
        if self.healthy {
            self.last_success = Some(now);
        }
    }

    /// Drop back to the minimum interval so recovery is fast.
    pub fn reset_interval(&mut self, bounds: PollingBounds) {
        self.current_interval = bounds.min();
    }

    /// Time since the last heartbeat, or `None` if nothing polled yet.
    #[must_use]
    pub fn since_heartbeat(&self, now: Instant) -> Option<Duration> {
        self.last_heartbeat
            .map(|beat| now.saturating_duration_since(beat))
    }
}
