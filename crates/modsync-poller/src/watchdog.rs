//! Liveness watchdog for the poll loop.
//!
//! The watchdog ticks at 1.1 times the maximum poll interval. If no poll
//! attempt started within the maximum interval, the loop is assumed to have
//! stopped rescheduling itself: the interval drops to the minimum, one poll
//! is enqueued and the driver task is respawned if it exited. The recovery
//! runs before anything is logged about it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::scheduler::Shared;

/// Watchdog period as a multiple of the maximum poll interval.
pub const WATCHDOG_FACTOR: f64 = 1.1;

const MIN_WATCHDOG_PERIOD: Duration = Duration::from_millis(1);

/// What a watchdog tick concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No poll has started yet.
    Idle,
    /// A poll started within the maximum interval.
    Alive {
        /// Time since the last poll started.
        elapsed: Duration,
    },
    /// No poll started within the maximum interval.
    Stalled {
        /// Time since the last poll started.
        elapsed: Duration,
    },
}

/// Classify the time since the last heartbeat against `max`.
#[must_use]
pub fn assess(since_heartbeat: Option<Duration>, max: Duration) -> Liveness {
    match since_heartbeat {
        None => Liveness::Idle,
        Some(elapsed) if elapsed > max => Liveness::Stalled { elapsed },
        Some(elapsed) => Liveness::Alive { elapsed },
    }
}

/// Tick period for a maximum poll interval of `max`.
#[must_use]
pub fn watchdog_period(max: Duration) -> Duration {
    Duration::try_from_secs_f64(max.as_secs_f64() * WATCHDOG_FACTOR)
        .unwrap_or(Duration::MAX)
        .max(MIN_WATCHDOG_PERIOD)
}

pub(crate) async fn watch(shared: Arc<Shared>) {
    let period = watchdog_period(shared.bounds.max());
    let first = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(period_ms = crate::millis(period), "Poll watchdog started");

    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {},
        }
        // A panicking log writer must not end the watchdog.
        let _ = catch_unwind(AssertUnwindSafe(|| check(&shared)));
    }

    debug!("Poll watchdog stopped");
}

/// Run one watchdog check against the scheduler state.
pub(crate) fn check(shared: &Arc<Shared>) -> Liveness {
    let max = shared.bounds.max();
    let since = shared.state().since_heartbeat(Instant::now());
    let liveness = assess(since, max);

    match liveness {
        Liveness::Idle => debug!("Poll watchdog: no poll has run yet"),
        Liveness::Alive { elapsed } => {
            debug!(elapsed_ms = crate::millis(elapsed), "Poll watchdog: polling is alive");
        },
        Liveness::Stalled { elapsed } => {
            shared.state().reset_interval(shared.bounds);
            let restarted = crate::scheduler::spawn_driver(shared);
            if !restarted {
                shared.wake.notify_one();
            }
            warn!(
                elapsed_ms = crate::millis(elapsed),
                max_ms = crate::millis(max),
                restarted,
                "Module map polling stalled; forcing a poll"
            );
        },
    }
    liveness
}
