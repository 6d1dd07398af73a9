//! Module map types.
//!
//! A module map lists every deployable module with one bundle record per
//! runtime target. Bundle URLs follow the layout
//! `<base>/<module>/<version>/<module>.<target>.js`.
//!
//! Parsing is strict: an entry missing a required target or field fails the
//! whole map rather than yielding partial data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Location and integrity hash of one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRecord {
    /// Content address of the bundle.
    pub url: String,
    /// Subresource integrity value for the bundle.
    pub integrity: String,
}

/// All bundles published for one module.
///
/// Two entries are equal only if every target's URL and integrity match.
/// `base_url` is not compared.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEntry {
    /// Directory URL the bundles are served from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Server-side bundle.
    pub node: BundleRecord,
    /// Modern browser bundle.
    pub browser: BundleRecord,
    /// Legacy browser bundle, if one was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_browser: Option<BundleRecord>,
}

impl PartialEq for ModuleEntry {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
            && self.browser == other.browser
            && self.legacy_browser == other.legacy_browser
    }
}

impl ModuleEntry {
    /// The version segment of the server bundle URL.
    ///
    /// Returns `None` if the URL does not follow the
    /// `<module>/<version>/<module>.node.js` layout.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        let path = self.node.url.split(['?', '#']).next()?;
        let mut segments = path.rsplit('/');
        let file = segments.next()?;
        let version = segments.next()?;
        let name = segments.next()?;

        let stem = file.strip_suffix(".js")?;
        let module = stem.rsplit_once('.').map_or(stem, |(module, _target)| module);
        (module == name && !version.is_empty()).then_some(version)
    }
}

/// A snapshot of the remote module map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMap {
    /// Cache key published alongside the map.
    #[serde(default)]
    pub key: String,
    /// Modules keyed by name.
    pub modules: BTreeMap<String, ModuleEntry>,
}

impl ModuleMap {
    /// Parse a module map from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ManifestParse`] if the bytes are not a module
    /// map with well-formed entries.
    pub fn from_slice(bytes: &[u8]) -> RegistryResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| RegistryError::ManifestParse(e.to_string()))
    }

    /// Look up a module entry.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.get(name)
    }

    /// Whether the map lists `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Module names in sorted order.
    pub fn module_names(&self) -> impl Iterator<Item = &String> {
        self.modules.keys()
    }

    /// Number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the map lists no modules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Insert or replace a module entry.
    pub fn insert(&mut self, name: impl Into<String>, entry: ModuleEntry) {
        self.modules.insert(name.into(), entry);
    }

    /// Remove a module entry.
    pub fn remove(&mut self, name: &str) -> Option<ModuleEntry> {
        self.modules.remove(name)
    }
}
