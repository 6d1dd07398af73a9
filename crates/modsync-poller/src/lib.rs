//! Adaptive module map polling.
//!
//! [`PollingScheduler`] fetches the module map on an interval that shrinks
//! to the minimum whenever something changed or went wrong and grows with
//! random jitter while nothing changes. A watchdog restarts polling if the
//! loop stops making progress. Health is exposed through
//! [`ModuleMapHealth`] for an external health check.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use modsync_config::Config;
//! use modsync_poller::PollingScheduler;
//! use modsync_registry::{HttpManifestFetcher, ModuleLoader};
//!
//! # async fn run(loader: Arc<dyn ModuleLoader>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let fetcher = Arc::new(HttpManifestFetcher::new(&config.sync.module_map_url)?);
//! let scheduler = PollingScheduler::from_config(&config, fetcher, loader)?.build();
//!
//! let health = scheduler.health();
//! scheduler.start()?;
//! # let _ = health;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::time::Duration;

mod error;
mod health;
pub mod scheduler;
pub mod state;
pub mod watchdog;

pub use error::{PollerError, PollerResult};
pub use health::ModuleMapHealth;
pub use scheduler::{PollOutcome, PollReport, PollingScheduler, PollingSchedulerBuilder};
pub use state::{PollState, next_backoff};
pub use watchdog::Liveness;

/// Milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
