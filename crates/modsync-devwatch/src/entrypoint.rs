//! Entrypoint discovery and stat access.
//!
//! Module bundles are laid out as `<module>/<version>/<file>`. Only
//! `<module>.node.js` files are entrypoints; every other file in a version
//! directory is a chunk and never triggers a reload.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

/// File name suffix of server entrypoints.
pub const ENTRYPOINT_SUFFIX: &str = ".node.js";

/// Modification time and size of a file. Two equal stamps taken some time
/// apart mean the file was not written in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// Last modification time.
    pub mtime: SystemTime,
    /// Size in bytes.
    pub size: u64,
}

/// A module entrypoint found on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entrypoint {
    /// Module name, taken from the first path segment.
    pub module: String,
    /// Version directory name.
    pub version: String,
    /// Full path of the entrypoint file.
    pub path: PathBuf,
}

/// Parse a path relative to the module directory as an entrypoint.
///
/// Returns `None` unless the path is `<module>/<version>/<module>.node.js`.
#[must_use]
pub fn parse_entrypoint(root: &Path, relative: &Path) -> Option<Entrypoint> {
    let mut segments = Vec::with_capacity(3);
    for component in relative.components() {
        let Component::Normal(segment) = component else {
            return None;
        };
        segments.push(segment.to_str()?);
    }
    let [module, version, file] = segments.as_slice() else {
        return None;
    };

    let stem = file.strip_suffix(ENTRYPOINT_SUFFIX)?;
    (stem == *module && !module.is_empty()).then(|| Entrypoint {
        module: (*module).to_owned(),
        version: (*version).to_owned(),
        path: root.join(relative),
    })
}

/// Filesystem access used by the watcher.
#[async_trait]
pub trait ModuleFs: Send + Sync {
    /// Paths, relative to `root`, of every file exactly three levels below
    /// it (`*/*/*`).
    ///
    /// # Errors
    ///
    /// Returns an error if `root` itself cannot be read.
    async fn list_candidates(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    /// Stat a single file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    async fn stat(&self, path: &Path) -> io::Result<FileStamp>;
}

/// [`ModuleFs`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

#[async_trait]
impl ModuleFs for TokioFs {
    async fn list_candidates(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for module in subdirectories(root).await? {
            let module_dir = root.join(&module);
            let versions = match subdirectories(&module_dir).await {
                Ok(versions) => versions,
                Err(e) => {
                    debug!(path = %module_dir.display(), error = %e, "Skipping unreadable module directory");
                    continue;
                },
            };
            for version in versions {
                let version_dir = module_dir.join(&version);
                let files = match files_in(&version_dir).await {
                    Ok(files) => files,
                    Err(e) => {
                        debug!(path = %version_dir.display(), error = %e, "Skipping unreadable version directory");
                        continue;
                    },
                };
                found.extend(files.into_iter().map(|file| module.join(&version).join(file)));
            }
        }
        Ok(found)
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStamp> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(FileStamp {
            mtime: metadata.modified()?,
            size: metadata.len(),
        })
    }
}

async fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(PathBuf::from(entry.file_name()));
        }
    }
    Ok(dirs)
}

async fn files_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(PathBuf::from(entry.file_name()));
        }
    }
    Ok(files)
}

/// List the entrypoints under `root`, sorted by path.
///
/// # Errors
///
/// Returns an error if `root` cannot be read.
pub async fn list_entrypoints(fs: &dyn ModuleFs, root: &Path) -> io::Result<Vec<Entrypoint>> {
    let mut entrypoints: Vec<Entrypoint> = fs
        .list_candidates(root)
        .await?
        .iter()
        .filter_map(|relative| parse_entrypoint(root, relative))
        .collect();
    entrypoints.sort();
    Ok(entrypoints)
}

/// Stat every distinct path once, concurrently.
pub async fn stat_all<'a, I>(fs: &dyn ModuleFs, paths: I) -> BTreeMap<PathBuf, io::Result<FileStamp>>
where
    I: IntoIterator<Item = &'a Path>,
{
    let unique: BTreeSet<&Path> = paths.into_iter().collect();
    let stats = join_all(unique.iter().map(|path| fs.stat(path))).await;
    unique
        .into_iter()
        .map(Path::to_path_buf)
        .zip(stats)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_entrypoint() {
        let root = Path::new("/srv/modules");

        let entry = parse_entrypoint(root, Path::new("mod-a/1.0.0/mod-a.node.js")).unwrap();
        assert_eq!(entry.module, "mod-a");
        assert_eq!(entry.version, "1.0.0");
        assert_eq!(entry.path, root.join("mod-a/1.0.0/mod-a.node.js"));
    }

    #[test]
    fn test_non_entrypoints_are_ignored() {
        let root = Path::new("/srv/modules");
        for path in [
            "mod-a/1.0.0/chunk-1234.node.js",
            "mod-a/1.0.0/mod-a.browser.js",
            "mod-a/1.0.0/mod-b.node.js",
            "mod-a/mod-a.node.js",
            "mod-a/1.0.0/nested/mod-a.node.js",
            "../1.0.0/...node.js",
            "/1.0.0/.node.js",
        ] {
            assert!(parse_entrypoint(root, Path::new(path)).is_none(), "{path}");
        }
    }

    struct CountingFs {
        stats: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl ModuleFs for CountingFs {
        async fn list_candidates(&self, _root: &Path) -> io::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }

        async fn stat(&self, path: &Path) -> io::Result<FileStamp> {
            self.stats.lock().unwrap().push(path.to_path_buf());
            Ok(FileStamp {
                mtime: SystemTime::UNIX_EPOCH,
                size: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_stat_all_deduplicates() {
        let fs = CountingFs {
            stats: Mutex::new(Vec::new()),
        };
        let a = Path::new("/m/a/1/a.node.js");
        let b = Path::new("/m/b/1/b.node.js");

        let stats = stat_all(&fs, [a, b, a, a]).await;
        assert_eq!(stats.len(), 2);
        assert_eq!(fs.stats.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tokio_fs_lists_entrypoints() {
        let dir = tempfile::tempdir().unwrap();
        let version_dir = dir.path().join("mod-a").join("1.0.0");
        std::fs::create_dir_all(&version_dir).unwrap();
        std::fs::write(version_dir.join("mod-a.node.js"), "module.exports = 1;").unwrap();
        std::fs::write(version_dir.join("chunk-1.node.js"), "chunk").unwrap();
        std::fs::write(version_dir.join("mod-a.browser.js"), "browser").unwrap();
        std::fs::write(dir.path().join("mod-a").join("README.md"), "stray").unwrap();

        let entrypoints = list_entrypoints(&TokioFs, dir.path()).await.unwrap();
        assert_eq!(entrypoints.len(), 1);
        assert_eq!(entrypoints[0].module, "mod-a");

        let stamp = TokioFs.stat(&entrypoints[0].path).await.unwrap();
        assert_eq!(stamp.size, 19);
        assert!(stamp.mtime > SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(1)).unwrap());
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            list_entrypoints(&TokioFs, &dir.path().join("absent"))
                .await
                .is_err()
        );
    }
}
