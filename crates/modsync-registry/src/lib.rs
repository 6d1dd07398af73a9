//! Module map schema, diffing and registry synchronization.
//!
//! The pieces fit together like this:
//!
//! - [`ManifestFetcher`] produces a [`ModuleMap`] snapshot.
//! - [`changed_modules`] decides which modules must be (re)loaded.
//! - [`RegistrySynchronizer`] loads them through a [`ModuleLoader`], runs each
//!   through a [`ModuleLoadHook`] and installs a new [`ModuleRegistry`]
//!   behind a [`RegistryHandle`].
//!
//! Everything mutable lives in a [`SyncContext`] that callers snapshot before
//! an attempt and restore if the attempt fails.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod context;
pub mod diff;
pub mod error;
pub mod externals;
pub mod fetch;
pub mod hook;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod sync;

pub use context::{ConfigSnapshot, SharedConfig, SharedContext, SyncContext};
pub use diff::{changed_modules, removed_modules};
pub use error::{RegistryError, RegistryResult};
pub use externals::ExternalsUsage;
#[cfg(feature = "http")]
pub use fetch::HttpManifestFetcher;
pub use fetch::{FileManifestFetcher, ManifestFetcher};
pub use hook::{ExternalsHook, ModuleLoadHook};
pub use loader::{LoadError, LoadedModule, ModuleLoader, ModuleMetadata};
pub use manifest::{BundleRecord, ModuleEntry, ModuleMap};
pub use registry::{ModuleRegistry, RegistryHandle};
pub use sync::{DEFAULT_BATCH_SIZE, ReloadOutcome, RegistrySynchronizer, SyncOutcome};
