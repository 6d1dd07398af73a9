//! Change detection and write settling for module entrypoints.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::entrypoint::{Entrypoint, FileStamp, ModuleFs, list_entrypoints, stat_all};
use crate::error::{WatchError, WatchResult};

/// Result of one change scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Entrypoints found on disk.
    pub tracked: usize,
    /// Entrypoints that were new or modified and now wait to settle.
    pub queued: Vec<Entrypoint>,
    /// Whether this scan only established the baseline.
    pub baseline: bool,
}

#[derive(Debug, Clone)]
struct Pending {
    entrypoint: Entrypoint,
    stamp: FileStamp,
}

/// Tracks entrypoint stamps between scans and the set of entrypoints whose
/// writes have not settled yet.
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    root: PathBuf,
    previous: Option<BTreeMap<PathBuf, FileStamp>>,
    pending: BTreeMap<PathBuf, Pending>,
}

impl ChangeTracker {
    /// Track entrypoints under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            previous: None,
            pending: BTreeMap::new(),
        }
    }

    /// The watched module directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether any entrypoint waits to settle.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Paths waiting to settle.
    pub fn pending_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.pending.keys()
    }

    /// List and stat every entrypoint and queue the ones that are new or
    /// modified since the previous scan.
    ///
    /// The first scan only records a baseline and queues nothing.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] if the module directory cannot be listed.
    /// The previous snapshot is kept in that case.
    pub async fn scan(&mut self, fs: &dyn ModuleFs) -> WatchResult<ScanSummary> {
        let entrypoints = list_entrypoints(fs, &self.root)
            .await
            .map_err(|source| WatchError::Io {
                path: self.root.clone(),
                source,
            })?;
        let stats = stat_all(fs, entrypoints.iter().map(|e| e.path.as_path())).await;

        let mut snapshot = BTreeMap::new();
        let mut queued = Vec::new();
        for entrypoint in entrypoints {
            let Some(Ok(stamp)) = stats.get(&entrypoint.path) else {
                // Removed between listing and stat.
                continue;
            };
            let stamp = *stamp;
            snapshot.insert(entrypoint.path.clone(), stamp);

            let Some(previous) = &self.previous else {
                continue;
            };
            if previous.get(&entrypoint.path) != Some(&stamp) {
                queued.push(entrypoint.clone());
                self.pending
                    .insert(entrypoint.path.clone(), Pending { entrypoint, stamp });
            }
        }

        let baseline = self.previous.is_none();
        let tracked = snapshot.len();
        self.previous = Some(snapshot);

        Ok(ScanSummary {
            tracked,
            queued,
            baseline,
        })
    }

    /// Re-stat every pending entrypoint and return those whose stamp did
    /// not change since they were queued.
    ///
    /// Settled entrypoints leave the pending set. Entrypoints that changed
    /// again stay pending with the new stamp. Entrypoints that disappeared are
    /// dropped. Fresh stamps also update the scan snapshot, so a write that
    /// was already seen here is not queued again by the next scan.
    pub async fn settle(&mut self, fs: &dyn ModuleFs) -> Vec<Entrypoint> {
        let stats = stat_all(fs, self.pending.keys().map(PathBuf::as_path)).await;

        let mut settled = Vec::new();
        for (path, stat) in stats {
            match stat {
                Ok(stamp) => {
                    if let Some(previous) = self.previous.as_mut() {
                        previous.insert(path.clone(), stamp);
                    }
                    let Some(pending) = self.pending.get_mut(&path) else {
                        continue;
                    };
                    if pending.stamp == stamp {
                        if let Some(done) = self.pending.remove(&path) {
                            settled.push(done.entrypoint);
                        }
                    } else {
                        debug!(path = %path.display(), "Entrypoint still being written");
                        pending.stamp = stamp;
                    }
                },
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Pending entrypoint vanished");
                    self.pending.remove(&path);
                },
            }
        }
        settled
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};

    use async_trait::async_trait;

    use super::*;

    const ROOT: &str = "/srv/modules";

    #[derive(Default)]
    struct FakeFs {
        files: Mutex<BTreeMap<PathBuf, FileStamp>>,
    }

    impl FakeFs {
        fn write(&self, relative: &str, secs: u64, size: u64) {
            self.files.lock().unwrap().insert(
                Path::new(ROOT).join(relative),
                FileStamp {
                    mtime: SystemTime::UNIX_EPOCH
                        .checked_add(Duration::from_secs(secs))
                        .unwrap(),
                    size,
                },
            );
        }

        fn delete(&self, relative: &str) {
            self.files
                .lock()
                .unwrap()
                .remove(&Path::new(ROOT).join(relative));
        }
    }

    #[async_trait]
    impl ModuleFs for FakeFs {
        async fn list_candidates(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
            Ok(self
                .files
                .lock()
                .unwrap()
                .keys()
                .filter_map(|path| path.strip_prefix(root).ok())
                .map(Path::to_path_buf)
                .collect())
        }

        async fn stat(&self, path: &Path) -> io::Result<FileStamp> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .copied()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    fn modules(entrypoints: &[Entrypoint]) -> Vec<&str> {
        entrypoints.iter().map(|e| e.module.as_str()).collect()
    }

    #[tokio::test]
    async fn test_first_scan_is_baseline() {
        let fs = FakeFs::default();
        fs.write("mod-a/1.0.0/mod-a.node.js", 1, 100);
        let mut tracker = ChangeTracker::new(ROOT);

        let summary = tracker.scan(&fs).await.unwrap();
        assert!(summary.baseline);
        assert_eq!(summary.tracked, 1);
        assert!(summary.queued.is_empty());
        assert!(!tracker.has_pending());
    }

    #[tokio::test]
    async fn test_modified_entrypoint_settles() {
        let fs = FakeFs::default();
        fs.write("mod-a/1.0.0/mod-a.node.js", 1, 100);
        let mut tracker = ChangeTracker::new(ROOT);
        tracker.scan(&fs).await.unwrap();

        fs.write("mod-a/1.0.0/mod-a.node.js", 2, 150);
        let summary = tracker.scan(&fs).await.unwrap();
        assert!(!summary.baseline);
        assert_eq!(modules(&summary.queued), ["mod-a"]);
        assert!(tracker.has_pending());

        let settled = tracker.settle(&fs).await;
        assert_eq!(modules(&settled), ["mod-a"]);
        assert!(!tracker.has_pending());
    }

    #[tokio::test]
    async fn test_new_entrypoint_is_queued() {
        let fs = FakeFs::default();
        let mut tracker = ChangeTracker::new(ROOT);
        tracker.scan(&fs).await.unwrap();

        fs.write("mod-b/2.0.0/mod-b.node.js", 5, 10);
        let summary = tracker.scan(&fs).await.unwrap();
        assert_eq!(modules(&summary.queued), ["mod-b"]);
        assert_eq!(summary.queued[0].version, "2.0.0");
    }

    #[tokio::test]
    async fn test_write_in_progress_stays_pending() {
        let fs = FakeFs::default();
        fs.write("mod-a/1.0.0/mod-a.node.js", 1, 100);
        let mut tracker = ChangeTracker::new(ROOT);
        tracker.scan(&fs).await.unwrap();

        fs.write("mod-a/1.0.0/mod-a.node.js", 2, 4096);
        tracker.scan(&fs).await.unwrap();

        fs.write("mod-a/1.0.0/mod-a.node.js", 2, 8192);
        assert!(tracker.settle(&fs).await.is_empty());
        assert!(tracker.has_pending());

        let settled = tracker.settle(&fs).await;
        assert_eq!(modules(&settled), ["mod-a"]);

        let summary = tracker.scan(&fs).await.unwrap();
        assert!(summary.queued.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_changes_are_ignored() {
        let fs = FakeFs::default();
        fs.write("mod-a/1.0.0/mod-a.node.js", 1, 100);
        fs.write("mod-a/1.0.0/vendors-chunk.node.js", 1, 100);
        let mut tracker = ChangeTracker::new(ROOT);
        tracker.scan(&fs).await.unwrap();

        fs.write("mod-a/1.0.0/vendors-chunk.node.js", 9, 900);
        let summary = tracker.scan(&fs).await.unwrap();
        assert_eq!(summary.tracked, 1);
        assert!(summary.queued.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_entrypoint_is_dropped() {
        let fs = FakeFs::default();
        fs.write("mod-a/1.0.0/mod-a.node.js", 1, 100);
        let mut tracker = ChangeTracker::new(ROOT);
        tracker.scan(&fs).await.unwrap();

        fs.write("mod-a/1.0.0/mod-a.node.js", 2, 100);
        tracker.scan(&fs).await.unwrap();
        fs.delete("mod-a/1.0.0/mod-a.node.js");

        assert!(tracker.settle(&fs).await.is_empty());
        assert!(!tracker.has_pending());
    }

    #[tokio::test]
    async fn test_list_failure_keeps_snapshot() {
        struct BrokenFs;

        #[async_trait]
        impl ModuleFs for BrokenFs {
            async fn list_candidates(&self, _root: &Path) -> io::Result<Vec<PathBuf>> {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            }

            async fn stat(&self, _path: &Path) -> io::Result<FileStamp> {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            }
        }

        let fs = FakeFs::default();
        fs.write("mod-a/1.0.0/mod-a.node.js", 1, 100);
        let mut tracker = ChangeTracker::new(ROOT);
        tracker.scan(&fs).await.unwrap();

        let err = tracker.scan(&BrokenFs).await.unwrap_err();
        assert!(matches!(err, WatchError::Io { .. }));

        let summary = tracker.scan(&fs).await.unwrap();
        assert!(!summary.baseline);
        assert!(summary.queued.is_empty());
    }
}
