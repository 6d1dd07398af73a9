//! Module loading seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::manifest::ModuleEntry;

/// Metadata a loaded module publishes about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleMetadata {
    /// Externals this module provides to others, name to version. Only the
    /// root module's list is honoured.
    pub provided_externals: BTreeMap<String, String>,
    /// Externals this module expects the root to provide, name to semver
    /// range.
    pub required_externals: BTreeMap<String, String>,
    /// Application settings. Only the root module's settings are honoured.
    pub app_config: serde_json::Map<String, serde_json::Value>,
}

/// A module that was fetched and instantiated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModule {
    /// Module name.
    pub name: String,
    /// Loaded version.
    pub version: String,
    /// The manifest entry the module was loaded from.
    pub entry: ModuleEntry,
    /// Published metadata.
    pub metadata: ModuleMetadata,
}

/// Why a module could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct LoadError(pub String);

impl LoadError {
    /// Create a load error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Fetches and instantiates a single module bundle.
///
/// Implementations own bundle download, integrity checking and evaluation.
/// They are expected to log their own failures.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Load `name` from `entry`.
    async fn load(&self, name: &str, entry: &ModuleEntry) -> Result<LoadedModule, LoadError>;
}
