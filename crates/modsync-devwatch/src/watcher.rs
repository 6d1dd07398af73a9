//! The development-mode module directory watcher.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use modsync_config::DevWatchConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entrypoint::{Entrypoint, ModuleFs, TokioFs};
use crate::error::{WatchError, WatchResult};
use crate::reload::ModuleReloader;
use crate::tracker::ChangeTracker;

/// Default change scan interval.
pub const DEFAULT_CHANGE_INTERVAL: Duration = Duration::from_secs(1);
/// Default settle check interval.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(400);

/// Where and how often to look for changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    module_dir: PathBuf,
    change_interval: Duration,
    settle_interval: Duration,
}

impl WatchSettings {
    /// Watch `module_dir` with the default intervals.
    pub fn new(module_dir: impl Into<PathBuf>) -> Self {
        Self {
            module_dir: module_dir.into(),
            change_interval: DEFAULT_CHANGE_INTERVAL,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
        }
    }

    /// Build settings from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidInterval`] if an interval is zero.
    pub fn from_config(config: &DevWatchConfig) -> WatchResult<Self> {
        Self::new(&config.module_dir).with_intervals(config.change_interval(), config.settle_interval())
    }

    /// Override both intervals.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidInterval`] if an interval is zero.
    pub fn with_intervals(mut self, change: Duration, settle: Duration) -> WatchResult<Self> {
        if change.is_zero() {
            return Err(WatchError::InvalidInterval {
                name: "change interval",
            });
        }
        if settle.is_zero() {
            return Err(WatchError::InvalidInterval {
                name: "settle interval",
            });
        }
        self.change_interval = change;
        self.settle_interval = settle;
        Ok(self)
    }

    /// The watched directory.
    #[must_use]
    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Delay between change scans.
    #[must_use]
    pub fn change_interval(&self) -> Duration {
        self.change_interval
    }

    /// Delay between settle checks.
    #[must_use]
    pub fn settle_interval(&self) -> Duration {
        self.settle_interval
    }
}

/// Watches a local module directory and reloads modules whose entrypoint
/// changed once their writes settle.
///
/// A change scan runs every change interval. Changed entrypoints are
/// re-checked every settle interval until two consecutive stats match, then
/// handed to a reload worker.
pub struct LocalModuleWatcher {
    settings: WatchSettings,
    fs: Arc<dyn ModuleFs>,
    reloader: ModuleReloader,
}

impl LocalModuleWatcher {
    /// Create a watcher that reads the real filesystem.
    pub fn new(settings: WatchSettings, reloader: ModuleReloader) -> Self {
        Self {
            settings,
            fs: Arc::new(TokioFs),
            reloader,
        }
    }

    /// Replace the filesystem.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn ModuleFs>) -> Self {
        self.fs = fs;
        self
    }

    /// Spawn the watcher and its reload worker. Both stop when `cancel` is
    /// cancelled; the worker finishes reloads already queued.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> WatcherHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(reload_worker(self.reloader.clone(), rx));
        let watcher = tokio::spawn(self.run(cancel, tx));
        WatcherHandle { watcher, worker }
    }

    async fn run(self, cancel: CancellationToken, reloads: mpsc::UnboundedSender<Entrypoint>) {
        let mut tracker = ChangeTracker::new(self.settings.module_dir.clone());
        let mut ticker = tokio::time::interval(self.settings.change_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut settle_at: Option<Instant> = None;
        let mut scan_failing = false;

        info!(
            dir = %self.settings.module_dir.display(),
            change_ms = millis(self.settings.change_interval),
            settle_ms = millis(self.settings.settle_interval),
            "Watching local modules"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = sleep_until(settle_at) => {
                    settle_at = None;
                    for entrypoint in tracker.settle(self.fs.as_ref()).await {
                        debug!(module = %entrypoint.module, "Entrypoint settled");
                        if reloads.send(entrypoint).is_err() {
                            warn!("Reload worker stopped; module watcher exiting");
                            return;
                        }
                    }
                },
                _ = ticker.tick() => {
                    match tracker.scan(self.fs.as_ref()).await {
                        Ok(summary) => {
                            if summary.baseline || scan_failing {
                                info!(entrypoints = summary.tracked, "Module directory scanned");
                            }
                            scan_failing = false;
                            for entrypoint in &summary.queued {
                                info!(module = %entrypoint.module, version = %entrypoint.version, "Module change detected");
                            }
                        },
                        Err(e) if scan_failing => debug!(error = %e, "Module directory scan failed"),
                        Err(e) => {
                            warn!(error = %e, "Module directory scan failed");
                            scan_failing = true;
                        },
                    }
                },
            }

            if settle_at.is_none() && tracker.has_pending() {
                settle_at = Instant::now().checked_add(self.settings.settle_interval);
            }
        }

        debug!("Module watcher stopped");
    }
}

impl fmt::Debug for LocalModuleWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalModuleWatcher")
            .field("settings", &self.settings)
            .field("reloader", &self.reloader)
            .finish_non_exhaustive()
    }
}

/// Handles to the watcher and reload worker tasks.
#[derive(Debug)]
pub struct WatcherHandle {
    watcher: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl WatcherHandle {
    /// Wait for both tasks to finish after cancellation.
    pub async fn join(self) {
        if let Err(e) = self.watcher.await {
            warn!(error = %e, "Module watcher task failed");
        }
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Module reload worker failed");
        }
    }

    /// Stop both tasks immediately, dropping queued reloads.
    pub fn abort(&self) {
        self.watcher.abort();
        self.worker.abort();
    }
}

async fn reload_worker(reloader: ModuleReloader, mut queue: mpsc::UnboundedReceiver<Entrypoint>) {
    while let Some(entrypoint) = queue.recv().await {
        reloader.reload(&entrypoint).await;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
