//! The in-memory module registry.
//!
//! Readers take an [`Arc`] snapshot and never observe a partially applied
//! update: every write installs a whole new [`ModuleRegistry`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::loader::LoadedModule;
use crate::manifest::ModuleMap;

/// Immutable view of the loaded modules and the map they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleRegistry {
    /// The module map the loaded modules were resolved against.
    pub module_map: ModuleMap,
    /// Loaded modules keyed by name.
    pub modules: BTreeMap<String, Arc<LoadedModule>>,
}

impl ModuleRegistry {
    /// Look up a loaded module.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Arc<LoadedModule>> {
        self.modules.get(name)
    }

    /// Version of a loaded module.
    #[must_use]
    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.modules.get(name).map(|m| m.version.as_str())
    }

    /// A copy of this registry with `module` installed, leaving every other
    /// module untouched.
    #[must_use]
    pub fn with_module(&self, module: LoadedModule) -> Self {
        let mut next = self.clone();
        next.module_map
            .insert(module.name.clone(), module.entry.clone());
        next.modules.insert(module.name.clone(), Arc::new(module));
        next
    }
}

/// Shared handle to the current [`ModuleRegistry`].
#[derive(Clone, Default)]
pub struct RegistryHandle {
    inner: Arc<ArcSwap<ModuleRegistry>>,
}

impl RegistryHandle {
    /// Create a handle holding an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current registry.
    #[must_use]
    pub fn load(&self) -> Arc<ModuleRegistry> {
        self.inner.load_full()
    }

    /// Install `registry` as the current registry.
    pub fn store(&self, registry: ModuleRegistry) {
        self.inner.store(Arc::new(registry));
    }

    /// Reinstall a registry previously taken with [`load`](Self::load).
    pub fn restore(&self, snapshot: Arc<ModuleRegistry>) {
        self.inner.store(snapshot);
    }

    /// Replace a single module in the current registry.
    pub fn replace_module(&self, module: LoadedModule) {
        self.inner
            .rcu(|current| Arc::new(current.with_module(module.clone())));
    }
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.inner.load();
        f.debug_struct("RegistryHandle")
            .field("map_key", &current.module_map.key)
            .field("modules", &current.modules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ModuleMetadata;
    use crate::manifest::{BundleRecord, ModuleEntry};

    fn loaded(name: &str, version: &str) -> LoadedModule {
        let bundle = BundleRecord {
            url: format!("https://cdn.example.com/{name}/{version}/{name}.node.js"),
            integrity: format!("sha256-{version}"),
        };
        LoadedModule {
            name: name.to_owned(),
            version: version.to_owned(),
            entry: ModuleEntry {
                base_url: None,
                node: bundle.clone(),
                browser: bundle,
                legacy_browser: None,
            },
            metadata: ModuleMetadata::default(),
        }
    }

    #[test]
    fn test_replace_module_keeps_others() {
        let handle = RegistryHandle::new();
        handle.replace_module(loaded("mod-a", "1.0.0"));
        handle.replace_module(loaded("mod-b", "1.0.0"));

        let before = handle.load();
        handle.replace_module(loaded("mod-a", "1.1.0"));
        let after = handle.load();

        assert_eq!(before.version_of("mod-a"), Some("1.0.0"));
        assert_eq!(after.version_of("mod-a"), Some("1.1.0"));
        assert!(Arc::ptr_eq(
            before.module("mod-b").unwrap(),
            after.module("mod-b").unwrap()
        ));
        assert_eq!(
            after.module_map.get("mod-a").unwrap().version(),
            Some("1.1.0")
        );
    }

    #[test]
    fn test_store_replaces_whole_registry() {
        let handle = RegistryHandle::new();
        handle.replace_module(loaded("mod-a", "1.0.0"));

        handle.store(ModuleRegistry::default());
        assert!(handle.load().modules.is_empty());
    }

    #[test]
    fn test_restore_reinstalls_snapshot() {
        let handle = RegistryHandle::new();
        handle.replace_module(loaded("mod-a", "1.0.0"));
        let snapshot = handle.load();

        handle.replace_module(loaded("mod-a", "2.0.0"));
        handle.restore(Arc::clone(&snapshot));

        assert_eq!(handle.load().version_of("mod-a"), Some("1.0.0"));
        assert!(Arc::ptr_eq(&handle.load(), &snapshot));
    }
}
