//! The adaptive module map poll scheduler.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use modsync_config::{Config, PollingBounds};
use modsync_registry::{
    ManifestFetcher, ModuleLoader, RegistryHandle, RegistryResult, RegistrySynchronizer,
    SharedContext, SyncContext, SyncOutcome,
};
use modsync_telemetry::metrics::{CONSECUTIVE_ERRORS, NEXT_POLL_SECONDS, POLL_COUNT};
use modsync_telemetry::{NoopMetrics, SyncMetrics, record_best_effort};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{PollerError, PollerResult};
use crate::health::ModuleMapHealth;
use crate::state::{AttemptKind, PollState, random_jitter};
use crate::watchdog;

/// How a call to [`PollingScheduler::poll`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Modules were loaded and none were rejected.
    Loaded {
        /// Names of the loaded modules.
        modules: BTreeSet<String>,
    },
    /// The module map had no changes to load.
    Unchanged,
    /// The map was applied but some modules were rejected.
    Partial {
        /// Names of the loaded modules.
        loaded: BTreeSet<String>,
        /// Rejected modules with the reason.
        rejected: BTreeMap<String, String>,
    },
    /// The attempt failed and shared configuration was rolled back.
    Failed {
        /// What went wrong.
        error: String,
    },
    /// Another poll was already in flight; nothing was done.
    Coalesced,
}

impl PollOutcome {
    fn from_result(result: Result<SyncOutcome, String>) -> Self {
        match result {
            Ok(sync) if !sync.rejected.is_empty() => Self::Partial {
                loaded: sync.loaded.into_keys().collect(),
                rejected: sync.rejected,
            },
            Ok(sync) if !sync.loaded.is_empty() => Self::Loaded {
                modules: sync.loaded.into_keys().collect(),
            },
            Ok(_) => Self::Unchanged,
            Err(error) => Self::Failed { error },
        }
    }

    fn kind(&self) -> Option<AttemptKind> {
        match self {
            Self::Loaded { .. } => Some(AttemptKind::Loaded),
            Self::Unchanged => Some(AttemptKind::Unchanged),
            Self::Partial { .. } => Some(AttemptKind::Partial),
            Self::Failed { .. } => Some(AttemptKind::Failed),
            Self::Coalesced => None,
        }
    }
}

/// Summary of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// How the poll ended.
    pub outcome: PollOutcome,
    /// Delay until the driver polls again.
    pub next_delay: Duration,
    /// Failed or partial attempts since the last clean one.
    pub consecutive_errors: u64,
    /// Module map health after the poll.
    pub healthy: bool,
}

/// Builder for [`PollingScheduler`].
pub struct PollingSchedulerBuilder {
    fetcher: Arc<dyn ManifestFetcher>,
    synchronizer: Arc<RegistrySynchronizer>,
    bounds: PollingBounds,
    registry: RegistryHandle,
    context: Option<SharedContext>,
    metrics: Arc<dyn SyncMetrics>,
}

impl PollingSchedulerBuilder {
    /// Set the poll interval bounds. Defaults to 5 s / 300 s.
    #[must_use]
    pub fn bounds(mut self, bounds: PollingBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Share an existing registry.
    #[must_use]
    pub fn registry(mut self, registry: RegistryHandle) -> Self {
        self.registry = registry;
        self
    }

    /// Share an existing synchronization context.
    #[must_use]
    pub fn context(mut self, context: SharedContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the metrics sink. Defaults to [`NoopMetrics`].
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build the scheduler. Nothing runs until [`PollingScheduler::start`]
    /// or [`PollingScheduler::poll`] is called.
    #[must_use]
    pub fn build(self) -> PollingScheduler {
        PollingScheduler {
            shared: Arc::new(Shared {
                fetcher: self.fetcher,
                synchronizer: self.synchronizer,
                registry: self.registry,
                context: self
                    .context
                    .unwrap_or_else(|| SyncContext::new().into_shared()),
                metrics: self.metrics,
                bounds: self.bounds,
                state: Mutex::new(PollState::new(self.bounds)),
                health: ModuleMapHealth::new(),
                in_flight: tokio::sync::Mutex::new(()),
                wake: Notify::new(),
                cancel: CancellationToken::new(),
                driver: Mutex::new(None),
                watchdog: OnceLock::new(),
            }),
        }
    }
}

impl fmt::Debug for PollingSchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingSchedulerBuilder")
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

/// Polls the module map on an adaptive interval and applies it.
///
/// After a poll that loaded modules, or one that failed, the next poll
/// happens after the minimum interval. After a poll with nothing to load the
/// interval grows by a random factor in `[1.25, 1.583)`, up to the maximum.
/// A failed attempt restores the shared [`SyncContext`] to its state before
/// the attempt and marks the module map unhealthy.
///
/// The first poll also starts a watchdog that forces a new poll if none
/// started within the maximum interval.
///
/// Dropping the scheduler stops its background tasks.
pub struct PollingScheduler {
    shared: Arc<Shared>,
}

impl PollingScheduler {
    /// Start building a scheduler.
    pub fn builder(
        fetcher: Arc<dyn ManifestFetcher>,
        synchronizer: Arc<RegistrySynchronizer>,
    ) -> PollingSchedulerBuilder {
        PollingSchedulerBuilder {
            fetcher,
            synchronizer,
            bounds: PollingBounds::default(),
            registry: RegistryHandle::new(),
            context: None,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Start building a scheduler from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::Config`] if the polling bounds are invalid.
    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn ManifestFetcher>,
        loader: Arc<dyn ModuleLoader>,
    ) -> PollerResult<PollingSchedulerBuilder> {
        let bounds = config.polling.bounds()?;
        let synchronizer = RegistrySynchronizer::new(config.sync.root_module_name.clone(), loader)
            .with_batch_size(config.sync.load_batch_size);
        Ok(Self::builder(fetcher, Arc::new(synchronizer)).bounds(bounds))
    }

    /// Spawn the driver task. The first poll runs immediately.
    ///
    /// Calling `start` while the driver is running has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn start(&self) -> PollerResult<()> {
        if self.shared.cancel.is_cancelled() {
            return Err(PollerError::ShutDown);
        }
        if spawn_driver(&self.shared) {
            info!(
                min_ms = crate::millis(self.shared.bounds.min()),
                max_ms = crate::millis(self.shared.bounds.max()),
                "Module map poller started"
            );
        }
        Ok(())
    }

    /// Run one poll attempt now.
    ///
    /// If another attempt is in flight this returns
    /// [`PollOutcome::Coalesced`] without doing anything.
    pub async fn poll(&self) -> PollReport {
        Shared::poll(&self.shared).await
    }

    /// Ask the driver to poll as soon as possible. Repeated requests before
    /// the driver gets to them collapse into one poll.
    pub fn request_poll(&self) {
        self.shared.wake.notify_one();
    }

    /// Stop the driver and watchdog. An in-flight attempt is abandoned.
    pub fn shutdown(&self) {
        if !self.shared.cancel.is_cancelled() {
            info!("Module map poller shutting down");
        }
        self.shared.stop();
    }

    /// Whether the driver task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|driver| !driver.is_finished())
    }

    /// A handle to the module map health flag.
    #[must_use]
    pub fn health(&self) -> ModuleMapHealth {
        self.shared.health.clone()
    }

    /// Whether the last attempt reached the module map.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.shared.health.is_healthy()
    }

    /// Snapshot of the interval and error bookkeeping.
    #[must_use]
    pub fn poll_state(&self) -> PollState {
        self.shared.state().clone()
    }

    /// The configured interval bounds.
    #[must_use]
    pub fn bounds(&self) -> PollingBounds {
        self.shared.bounds
    }

    /// The registry the scheduler installs modules into.
    #[must_use]
    pub fn registry(&self) -> &RegistryHandle {
        &self.shared.registry
    }

    /// The shared synchronization context.
    #[must_use]
    pub fn context(&self) -> &SharedContext {
        &self.shared.context
    }

    /// The synchronizer used for each attempt.
    #[must_use]
    pub fn synchronizer(&self) -> &Arc<RegistrySynchronizer> {
        &self.shared.synchronizer
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("bounds", &self.shared.bounds)
            .field("state", &*self.shared.state())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

pub(crate) struct Shared {
    fetcher: Arc<dyn ManifestFetcher>,
    synchronizer: Arc<RegistrySynchronizer>,
    registry: RegistryHandle,
    context: SharedContext,
    metrics: Arc<dyn SyncMetrics>,
    pub(crate) bounds: PollingBounds,
    state: Mutex<PollState>,
    health: ModuleMapHealth,
    in_flight: tokio::sync::Mutex<()>,
    pub(crate) wake: Notify,
    pub(crate) cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
    watchdog: OnceLock<JoinHandle<()>>,
}

impl Shared {
    pub(crate) fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll(self: &Arc<Self>) -> PollReport {
        let Ok(_running) = self.in_flight.try_lock() else {
            debug!("Poll already in flight; request coalesced");
            return self.report(PollOutcome::Coalesced);
        };

        self.state().heartbeat(Instant::now());
        ensure_watchdog(self);
        record_best_effort(POLL_COUNT, || self.metrics.poll_started());

        let result = {
            let mut ctx = self.context.lock().await;
            let snapshot = ctx.snapshot();
            let installed = self.registry.load();
            let attempt = AssertUnwindSafe(self.attempt(&mut ctx))
                .catch_unwind()
                .await;
            let result = match attempt {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(panic) => Err(format!("poll attempt panicked: {}", panic_message(&*panic))),
            };
            if result.is_err() {
                ctx.restore(snapshot);
                self.registry.restore(installed);
            }
            result
        };

        let outcome = PollOutcome::from_result(result);
        let report = self.finish(outcome);

        let _ = catch_unwind(AssertUnwindSafe(|| log_report(&report)));
        record_best_effort(CONSECUTIVE_ERRORS, || {
            self.metrics.consecutive_errors(report.consecutive_errors)
        });
        record_best_effort(NEXT_POLL_SECONDS, || self.metrics.next_poll_in(report.next_delay));

        report
    }

    async fn attempt(&self, ctx: &mut SyncContext) -> RegistryResult<SyncOutcome> {
        let next = self.fetcher.fetch().await?;
        self.synchronizer.apply(ctx, &self.registry, next).await
    }

    /// Update interval bookkeeping and schedule the next driver poll.
    fn finish(&self, outcome: PollOutcome) -> PollReport {
        let now = Instant::now();
        let mut state = self.state();
        if let Some(kind) = outcome.kind() {
            state.complete(kind, self.bounds, random_jitter(), now);
            state.next_poll_at = now.checked_add(state.current_interval);
            self.health.set(state.healthy);
        }
        PollReport {
            outcome,
            next_delay: state.current_interval,
            consecutive_errors: state.consecutive_errors,
            healthy: state.healthy,
        }
    }

    fn report(&self, outcome: PollOutcome) -> PollReport {
        let state = self.state();
        PollReport {
            outcome,
            next_delay: state.current_interval,
            consecutive_errors: state.consecutive_errors,
            healthy: state.healthy,
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
        if let Some(driver) = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            driver.abort();
        }
        if let Some(watchdog) = self.watchdog.get() {
            watchdog.abort();
        }
    }
}

/// Spawn the driver unless it is already running. Returns `true` if a new
/// driver task was spawned.
pub(crate) fn spawn_driver(shared: &Arc<Shared>) -> bool {
    if shared.cancel.is_cancelled() {
        return false;
    }
    let mut driver = shared.driver.lock().unwrap_or_else(PoisonError::into_inner);
    if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
        return false;
    }
    *driver = Some(tokio::spawn(drive(Arc::clone(shared))));
    true
}

fn ensure_watchdog(shared: &Arc<Shared>) {
    if shared.cancel.is_cancelled() {
        return;
    }
    shared
        .watchdog
        .get_or_init(|| tokio::spawn(watchdog::watch(Arc::clone(shared))));
}

async fn drive(shared: Arc<Shared>) {
    loop {
        if shared.cancel.is_cancelled() {
            break;
        }
        Shared::poll(&shared).await;

        let deadline = shared.state().next_poll_at;
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            () = shared.wake.notified() => {},
            () = sleep_until(deadline) => {},
        }
    }
    debug!("Poll driver stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn log_report(report: &PollReport) {
    let next_poll_ms = crate::millis(report.next_delay);
    match &report.outcome {
        PollOutcome::Loaded { modules } => {
            info!(modules = ?modules, next_poll_ms, "Module map changes loaded");
        },
        PollOutcome::Unchanged => {
            debug!(next_poll_ms, "Module map unchanged");
        },
        PollOutcome::Partial { loaded, rejected } => {
            for (module, reason) in rejected {
                warn!(module = %module, reason = %reason, "Module rejected");
            }
            warn!(
                loaded = loaded.len(),
                rejected = rejected.len(),
                consecutive_errors = report.consecutive_errors,
                next_poll_ms,
                "Module map partially applied"
            );
        },
        PollOutcome::Failed { error } => {
            error!(
                error = %error,
                consecutive_errors = report.consecutive_errors,
                next_poll_ms,
                "Module map poll failed; configuration rolled back"
            );
        },
        PollOutcome::Coalesced => {},
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
