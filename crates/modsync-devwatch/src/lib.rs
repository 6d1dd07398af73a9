//! Development-mode module directory watcher.
//!
//! Instead of polling a remote module map, a developer's server watches the
//! local build output. [`LocalModuleWatcher`] stats every
//! `<module>/<version>/<module>.node.js` entrypoint once per second, waits
//! for a changed entrypoint to stop changing, then reloads only that module
//! through the same [`RegistrySynchronizer`](modsync_registry::RegistrySynchronizer)
//! the poller uses.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod entrypoint;
mod error;
pub mod reload;
pub mod tracker;
pub mod watcher;

pub use entrypoint::{Entrypoint, FileStamp, ModuleFs, TokioFs};
pub use error::{WatchError, WatchResult};
pub use reload::ModuleReloader;
pub use tracker::{ChangeTracker, ScanSummary};
pub use watcher::{LocalModuleWatcher, WatchSettings, WatcherHandle};
