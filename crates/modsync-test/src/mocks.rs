//! Mock implementations for testing.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use modsync_devwatch::{FileStamp, ModuleFs};
use modsync_registry::{
    LoadError, LoadedModule, ManifestFetcher, ModuleEntry, ModuleLoader, ModuleMap,
    ModuleMetadata, RegistryError, RegistryResult,
};
use modsync_telemetry::{MetricsError, SyncMetrics};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
enum FetchStep {
    Map(ModuleMap),
    Error(String),
    Panic(String),
    Hang,
}

#[derive(Debug, Default)]
struct FetcherState {
    queue: VecDeque<FetchStep>,
    current: Option<ModuleMap>,
    fetches: usize,
}

/// Mock module map fetcher.
///
/// Queued steps are consumed one per fetch. When the queue is empty the most
/// recently served map is returned again.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    state: Arc<Mutex<FetcherState>>,
}

impl MockFetcher {
    /// Create a fetcher with no map; fetching fails until one is set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `map` whenever the queue is empty.
    #[must_use]
    pub fn with_map(self, map: ModuleMap) -> Self {
        self.set_map(map);
        self
    }

    /// Serve `map` whenever the queue is empty.
    pub fn set_map(&self, map: ModuleMap) {
        lock(&self.state).current = Some(map);
    }

    /// Serve `map` on the next queued fetch, then keep serving it.
    pub fn push_map(&self, map: ModuleMap) {
        lock(&self.state).queue.push_back(FetchStep::Map(map));
    }

    /// Fail the next queued fetch.
    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.state)
            .queue
            .push_back(FetchStep::Error(message.into()));
    }

    /// Panic on the next queued fetch.
    pub fn push_panic(&self, message: impl Into<String>) {
        lock(&self.state)
            .queue
            .push_back(FetchStep::Panic(message.into()));
    }

    /// Never complete the next queued fetch.
    pub fn push_hang(&self) {
        lock(&self.state).queue.push_back(FetchStep::Hang);
    }

    /// Number of fetches started.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        lock(&self.state).fetches
    }
}

#[async_trait]
impl ManifestFetcher for MockFetcher {
    async fn fetch(&self) -> RegistryResult<ModuleMap> {
        let step = {
            let mut state = lock(&self.state);
            state.fetches = state.fetches.saturating_add(1);
            match state.queue.pop_front() {
                Some(FetchStep::Map(map)) => {
                    state.current = Some(map.clone());
                    FetchStep::Map(map)
                },
                Some(step) => step,
                None => match &state.current {
                    Some(map) => FetchStep::Map(map.clone()),
                    None => FetchStep::Error("no module map configured".to_string()),
                },
            }
        };

        match step {
            FetchStep::Map(map) => Ok(map),
            FetchStep::Error(message) => Err(RegistryError::Fetch(message)),
            FetchStep::Panic(message) => panic!("{message}"),
            FetchStep::Hang => futures::future::pending().await,
        }
    }
}

#[derive(Debug, Default)]
struct LoaderState {
    failures: HashMap<String, String>,
    panics: HashSet<String>,
    metadata: HashMap<String, ModuleMetadata>,
    calls: Vec<String>,
}

/// Mock module loader.
///
/// Loads succeed by default, with the version taken from the entry's URL.
#[derive(Debug, Clone, Default)]
pub struct MockLoader {
    state: Arc<Mutex<LoaderState>>,
}

impl MockLoader {
    /// Create a loader where every module loads.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make loads of `name` fail with `reason`.
    pub fn fail(&self, name: &str, reason: &str) {
        lock(&self.state)
            .failures
            .insert(name.to_string(), reason.to_string());
    }

    /// Make loads of `name` panic.
    pub fn panic_on(&self, name: &str) {
        lock(&self.state).panics.insert(name.to_string());
    }

    /// Make loads of `name` succeed again.
    pub fn succeed(&self, name: &str) {
        let mut state = lock(&self.state);
        state.failures.remove(name);
        state.panics.remove(name);
    }

    /// Metadata returned for `name`.
    pub fn set_metadata(&self, name: &str, metadata: ModuleMetadata) {
        lock(&self.state)
            .metadata
            .insert(name.to_string(), metadata);
    }

    /// Module names passed to `load`, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Return and clear the recorded calls.
    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.state).calls)
    }

    /// How many times `name` was loaded.
    #[must_use]
    pub fn load_count(&self, name: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| *call == name)
            .count()
    }
}

#[async_trait]
impl ModuleLoader for MockLoader {
    async fn load(&self, name: &str, entry: &ModuleEntry) -> Result<LoadedModule, LoadError> {
        let (failure, panics, metadata) = {
            let mut state = lock(&self.state);
            state.calls.push(name.to_string());
            (
                state.failures.get(name).cloned(),
                state.panics.contains(name),
                state.metadata.get(name).cloned().unwrap_or_default(),
            )
        };

        if panics {
            panic!("mock loader panicked on {name}");
        }
        if let Some(reason) = failure {
            return Err(LoadError::new(reason));
        }
        Ok(LoadedModule {
            name: name.to_string(),
            version: entry.version().unwrap_or("0.0.0").to_string(),
            entry: entry.clone(),
            metadata,
        })
    }
}

/// A metric call observed by [`RecordingMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    /// `poll_started`
    PollStarted,
    /// `next_poll_in`
    NextPollIn(Duration),
    /// `consecutive_errors`
    ConsecutiveErrors(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkMode {
    Ok,
    Failing,
    Panicking,
}

/// Metrics sink that records every call.
///
/// The failing and panicking variants still record the call before
/// misbehaving.
#[derive(Debug, Clone)]
pub struct RecordingMetrics {
    events: Arc<Mutex<Vec<MetricEvent>>>,
    mode: SinkMode,
}

impl Default for RecordingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingMetrics {
    /// A sink that accepts every value.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            mode: SinkMode::Ok,
        }
    }

    /// A sink whose every call returns an error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            mode: SinkMode::Failing,
            ..Self::new()
        }
    }

    /// A sink whose every call panics.
    #[must_use]
    pub fn panicking() -> Self {
        Self {
            mode: SinkMode::Panicking,
            ..Self::new()
        }
    }

    /// Every recorded call.
    #[must_use]
    pub fn events(&self) -> Vec<MetricEvent> {
        lock(&self.events).clone()
    }

    /// Number of `poll_started` calls.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| matches!(event, MetricEvent::PollStarted))
            .count()
    }

    /// Every delay passed to `next_poll_in`.
    #[must_use]
    pub fn next_poll_delays(&self) -> Vec<Duration> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                MetricEvent::NextPollIn(delay) => Some(*delay),
                _ => None,
            })
            .collect()
    }

    /// The last consecutive error count reported.
    #[must_use]
    pub fn last_consecutive_errors(&self) -> Option<u64> {
        lock(&self.events)
            .iter()
            .rev()
            .find_map(|event| match event {
                MetricEvent::ConsecutiveErrors(count) => Some(*count),
                _ => None,
            })
    }

    fn record(&self, metric: &'static str, event: MetricEvent) -> Result<(), MetricsError> {
        lock(&self.events).push(event);
        match self.mode {
            SinkMode::Ok => Ok(()),
            SinkMode::Failing => Err(MetricsError::new(metric, "sink unavailable")),
            SinkMode::Panicking => panic!("metrics sink exploded recording {metric}"),
        }
    }
}

impl SyncMetrics for RecordingMetrics {
    fn poll_started(&self) -> Result<(), MetricsError> {
        self.record("poll_started", MetricEvent::PollStarted)
    }

    fn next_poll_in(&self, delay: Duration) -> Result<(), MetricsError> {
        self.record("next_poll_in", MetricEvent::NextPollIn(delay))
    }

    fn consecutive_errors(&self, count: u64) -> Result<(), MetricsError> {
        self.record("consecutive_errors", MetricEvent::ConsecutiveErrors(count))
    }
}

#[derive(Debug, Default)]
struct FsState {
    files: BTreeMap<PathBuf, FileStamp>,
    clock_ms: u64,
    stats: usize,
}

/// In-memory [`ModuleFs`].
///
/// Every write advances a logical clock, so each write produces a distinct
/// modification time regardless of real or paused time.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<FsState>>,
}

impl MemoryFs {
    /// Create an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite `path` with `size` bytes.
    pub fn write(&self, path: impl AsRef<Path>, size: u64) {
        let mut state = lock(&self.state);
        state.clock_ms = state.clock_ms.saturating_add(1);
        let mtime = SystemTime::UNIX_EPOCH
            .checked_add(Duration::from_millis(state.clock_ms))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        state
            .files
            .insert(path.as_ref().to_path_buf(), FileStamp { mtime, size });
    }

    /// Append `bytes` to `path`, creating it if needed.
    pub fn append(&self, path: impl AsRef<Path>, bytes: u64) {
        let size = lock(&self.state)
            .files
            .get(path.as_ref())
            .map_or(0, |stamp| stamp.size);
        self.write(path, size.saturating_add(bytes));
    }

    /// Delete `path`.
    pub fn remove(&self, path: impl AsRef<Path>) {
        lock(&self.state).files.remove(path.as_ref());
    }

    /// Number of `stat` calls served.
    #[must_use]
    pub fn stat_count(&self) -> usize {
        lock(&self.state).stats
    }
}

#[async_trait]
impl ModuleFs for MemoryFs {
    async fn list_candidates(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(lock(&self.state)
            .files
            .keys()
            .filter_map(|path| path.strip_prefix(root).ok())
            .filter(|relative| relative.components().count() == 3)
            .map(Path::to_path_buf)
            .collect())
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStamp> {
        let mut state = lock(&self.state);
        state.stats = state.stats.saturating_add(1);
        state
            .files
            .get(path)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}
