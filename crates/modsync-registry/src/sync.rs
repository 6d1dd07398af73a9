//! Applying a fetched module map to the registry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::context::SyncContext;
use crate::diff::{changed_modules, removed_modules};
use crate::error::{RegistryError, RegistryResult};
use crate::hook::{ExternalsHook, ModuleLoadHook};
use crate::loader::{LoadError, LoadedModule, ModuleLoader};
use crate::manifest::{ModuleEntry, ModuleMap};
use crate::registry::{ModuleRegistry, RegistryHandle};

/// Default number of modules loaded concurrently.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Result of one [`RegistrySynchronizer::apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Modules that loaded and passed validation.
    pub loaded: BTreeMap<String, ModuleEntry>,
    /// Modules that failed to load or validate, with the reason.
    pub rejected: BTreeMap<String, String>,
    /// Modules dropped because the new map no longer lists them.
    pub removed: BTreeSet<String>,
}

impl SyncOutcome {
    /// Whether nothing was loaded, rejected or removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty() && self.rejected.is_empty() && self.removed.is_empty()
    }
}

/// Outcome of reloading a single module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The module was reloaded and installed.
    Reloaded {
        /// Newly installed version.
        version: String,
    },
    /// The current module map does not list the module.
    NotInMap,
    /// The module failed to load or validate; the previous version stays.
    Rejected {
        /// Why the module was rejected.
        reason: String,
    },
}

/// Loads the modules a new module map changed and installs them.
pub struct RegistrySynchronizer {
    root_module_name: String,
    loader: Arc<dyn ModuleLoader>,
    hook: Arc<dyn ModuleLoadHook>,
    batch_size: usize,
}

impl RegistrySynchronizer {
    /// Create a synchronizer using the [`ExternalsHook`].
    pub fn new(root_module_name: impl Into<String>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            root_module_name: root_module_name.into(),
            loader,
            hook: Arc::new(ExternalsHook),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Replace the module-load hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ModuleLoadHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Set how many modules load concurrently. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The configured root module name.
    #[must_use]
    pub fn root_module_name(&self) -> &str {
        &self.root_module_name
    }

    /// Load every module that changed between the registry's current map
    /// and `next`, then install the result as a new registry.
    ///
    /// The root module, when changed, is loaded first and alone. Other
    /// modules load concurrently and are validated in name order. A rejected
    /// module keeps its previous version and map entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingRootModule`] if `next` lacks the root
    /// module and [`RegistryError::RootModuleRejected`] if the root module
    /// fails. In both cases the registry is left untouched, but `ctx` may have
    /// been partially updated and should be restored by the caller.
    pub async fn apply(
        &self,
        ctx: &mut SyncContext,
        registry: &RegistryHandle,
        next: ModuleMap,
    ) -> RegistryResult<SyncOutcome> {
        let current = registry.load();
        let changed = changed_modules(&current.module_map, &next, &ctx.externals, &self.root_module_name)?;
        let removed = removed_modules(&current.module_map, &next);

        debug!(
            changed = changed.len(),
            removed = removed.len(),
            "Computed module map changes"
        );

        let mut outcome = SyncOutcome {
            removed,
            ..SyncOutcome::default()
        };
        let mut modules = current.modules.clone();

        if changed.contains(&self.root_module_name) {
            let root = self.load_root(ctx, &next).await?;
            outcome.loaded.insert(root.name.clone(), root.entry.clone());
            modules.insert(root.name.clone(), Arc::new(root));
        }

        let pending: Vec<(String, ModuleEntry)> = changed
            .into_iter()
            .filter(|name| *name != self.root_module_name)
            .filter_map(|name| next.get(&name).cloned().map(|entry| (name, entry)))
            .collect();

        let results: Vec<(String, Result<LoadedModule, LoadError>)> = stream::iter(pending)
            .map(|(name, entry)| {
                let loader = Arc::clone(&self.loader);
                async move {
                    let result = loader.load(&name, &entry).await;
                    (name, result)
                }
            })
            .buffered(self.batch_size)
            .collect()
            .await;

        for (name, result) in results {
            let validated = result
                .map_err(|e| e.to_string())
                .and_then(|module| {
                    self.hook
                        .on_module_load(ctx, &module, false)
                        .map(|()| module)
                });
            match validated {
                Ok(module) => {
                    outcome.loaded.insert(name.clone(), module.entry.clone());
                    modules.insert(name, Arc::new(module));
                },
                Err(reason) => {
                    debug!(module = %name, %reason, "Module rejected");
                    outcome.rejected.insert(name, reason);
                },
            }
        }

        let mut module_map = next;
        for name in outcome.rejected.keys() {
            match current.module_map.get(name) {
                Some(previous) => module_map.insert(name.clone(), previous.clone()),
                None => {
                    module_map.remove(name);
                },
            }
        }
        for name in &outcome.removed {
            modules.remove(name);
            ctx.externals.remove(name);
        }

        info!(
            loaded = outcome.loaded.len(),
            rejected = outcome.rejected.len(),
            removed = outcome.removed.len(),
            "Module map applied"
        );

        // Nothing may fail after the swap.
        registry.store(ModuleRegistry {
            module_map,
            modules,
        });
        Ok(outcome)
    }

    /// Reload one module from the registry's current map entry.
    ///
    /// Only that module is replaced; every other loaded module is untouched.
    pub async fn reload_module(
        &self,
        ctx: &mut SyncContext,
        registry: &RegistryHandle,
        name: &str,
    ) -> ReloadOutcome {
        let Some(entry) = registry.load().module_map.get(name).cloned() else {
            return ReloadOutcome::NotInMap;
        };
        let is_root = name == self.root_module_name;

        let module = match self.loader.load(name, &entry).await {
            Ok(module) => module,
            Err(e) => return ReloadOutcome::Rejected { reason: e.to_string() },
        };
        if let Err(reason) = self.hook.on_module_load(ctx, &module, is_root) {
            return ReloadOutcome::Rejected { reason };
        }

        let version = module.version.clone();
        registry.replace_module(module);
        ReloadOutcome::Reloaded { version }
    }

    async fn load_root(&self, ctx: &mut SyncContext, next: &ModuleMap) -> RegistryResult<LoadedModule> {
        let name = self.root_module_name.as_str();
        let rejected = |reason: String| RegistryError::RootModuleRejected {
            name: name.to_owned(),
            reason,
        };

        let entry = next.get(name).ok_or_else(|| RegistryError::MissingRootModule {
            name: name.to_owned(),
        })?;
        let module = self
            .loader
            .load(name, entry)
            .await
            .map_err(|e| rejected(e.to_string()))?;
        self.hook
            .on_module_load(ctx, &module, true)
            .map_err(rejected)?;

        info!(module = %name, version = %module.version, "Root module loaded");
        Ok(module)
    }
}

impl fmt::Debug for RegistrySynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySynchronizer")
            .field("root_module_name", &self.root_module_name)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::loader::ModuleMetadata;
    use crate::manifest::BundleRecord;

    const ROOT: &str = "root";

    #[derive(Default)]
    struct TestLoader {
        failures: Mutex<HashMap<String, String>>,
        metadata: Mutex<HashMap<String, ModuleMetadata>>,
        calls: Mutex<Vec<String>>,
    }

    impl TestLoader {
        fn fail(&self, name: &str, reason: &str) {
            self.failures
                .lock()
                .unwrap()
                .insert(name.to_owned(), reason.to_owned());
        }

        fn succeed(&self, name: &str) {
            self.failures.lock().unwrap().remove(name);
        }

        fn set_metadata(&self, name: &str, metadata: ModuleMetadata) {
            self.metadata
                .lock()
                .unwrap()
                .insert(name.to_owned(), metadata);
        }

        fn take_calls(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    #[async_trait]
    impl ModuleLoader for TestLoader {
        async fn load(&self, name: &str, entry: &ModuleEntry) -> Result<LoadedModule, LoadError> {
            self.calls.lock().unwrap().push(name.to_owned());
            if let Some(reason) = self.failures.lock().unwrap().get(name) {
                return Err(LoadError::new(reason.clone()));
            }
            Ok(LoadedModule {
                name: name.to_owned(),
                version: entry.version().unwrap_or("0.0.0").to_owned(),
                entry: entry.clone(),
                metadata: self
                    .metadata
                    .lock()
                    .unwrap()
                    .get(name)
                    .cloned()
                    .unwrap_or_default(),
            })
        }
    }

    fn entry(name: &str, version: &str) -> ModuleEntry {
        let bundle = |target: &str| BundleRecord {
            url: format!("https://cdn.example.com/{name}/{version}/{name}.{target}.js"),
            integrity: format!("sha256-{name}-{version}-{target}"),
        };
        ModuleEntry {
            base_url: None,
            node: bundle("node"),
            browser: bundle("browser"),
            legacy_browser: None,
        }
    }

    fn map(modules: &[(&str, &str)]) -> ModuleMap {
        let mut map = ModuleMap::default();
        for (name, version) in modules {
            map.insert(*name, entry(name, version));
        }
        map
    }

    fn externals(list: &[(&str, &str)]) -> BTreeMap<String, String> {
        list.iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn setup() -> (Arc<TestLoader>, RegistrySynchronizer, RegistryHandle, SyncContext) {
        let loader = Arc::new(TestLoader::default());
        let sync = RegistrySynchronizer::new(ROOT, Arc::clone(&loader) as Arc<dyn ModuleLoader>)
            .with_batch_size(2);
        (loader, sync, RegistryHandle::new(), SyncContext::new())
    }

    #[tokio::test]
    async fn test_first_apply_loads_root_first() {
        let (loader, sync, registry, mut ctx) = setup();

        let outcome = sync
            .apply(
                &mut ctx,
                &registry,
                map(&[("mod-b", "1.0.0"), (ROOT, "1.0.0"), ("mod-a", "1.0.0")]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.loaded.len(), 3);
        assert!(outcome.rejected.is_empty());
        assert_eq!(loader.take_calls(), [ROOT, "mod-a", "mod-b"]);

        let current = registry.load();
        assert_eq!(current.version_of("mod-b"), Some("1.0.0"));
        assert_eq!(ctx.config.root_version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_unchanged_map_loads_nothing() {
        let (loader, sync, registry, mut ctx) = setup();
        let first = map(&[(ROOT, "1.0.0"), ("mod-a", "1.0.0")]);

        sync.apply(&mut ctx, &registry, first.clone()).await.unwrap();
        loader.take_calls();

        let outcome = sync.apply(&mut ctx, &registry, first).await.unwrap();
        assert!(outcome.is_empty());
        assert!(loader.take_calls().is_empty());
    }

    #[tokio::test]
    async fn test_root_change_reloads_externals_users() {
        let (loader, sync, registry, mut ctx) = setup();
        loader.set_metadata(
            ROOT,
            ModuleMetadata {
                provided_externals: externals(&[("react", "17.0.2")]),
                ..ModuleMetadata::default()
            },
        );
        loader.set_metadata(
            "mod-a",
            ModuleMetadata {
                required_externals: externals(&[("react", "^17.0.0")]),
                ..ModuleMetadata::default()
            },
        );

        sync.apply(
            &mut ctx,
            &registry,
            map(&[(ROOT, "1.0.0"), ("mod-a", "1.0.0"), ("mod-b", "1.0.0")]),
        )
        .await
        .unwrap();
        assert!(ctx.externals.contains("mod-a"));
        assert!(!ctx.externals.contains("mod-b"));
        loader.take_calls();

        let outcome = sync
            .apply(
                &mut ctx,
                &registry,
                map(&[(ROOT, "1.1.0"), ("mod-a", "1.0.0"), ("mod-b", "1.0.0")]),
            )
            .await
            .unwrap();

        let loaded: Vec<&String> = outcome.loaded.keys().collect();
        assert_eq!(loaded, ["mod-a", ROOT]);
        assert_eq!(loader.take_calls(), [ROOT, "mod-a"]);
        assert!(ctx.externals.contains("mod-a"));
    }

    #[tokio::test]
    async fn test_rejected_module_keeps_previous_version() {
        let (loader, sync, registry, mut ctx) = setup();
        sync.apply(&mut ctx, &registry, map(&[(ROOT, "1.0.0"), ("mod-a", "1.0.0")]))
            .await
            .unwrap();

        loader.fail("mod-a", "bundle failed integrity check");
        let outcome = sync
            .apply(&mut ctx, &registry, map(&[(ROOT, "1.0.0"), ("mod-a", "2.0.0")]))
            .await
            .unwrap();

        assert!(outcome.loaded.is_empty());
        assert_eq!(outcome.rejected["mod-a"], "bundle failed integrity check");

        let current = registry.load();
        assert_eq!(current.version_of("mod-a"), Some("1.0.0"));
        assert_eq!(current.module_map.get("mod-a").unwrap().version(), Some("1.0.0"));

        loader.succeed("mod-a");
        let retry = sync
            .apply(&mut ctx, &registry, map(&[(ROOT, "1.0.0"), ("mod-a", "2.0.0")]))
            .await
            .unwrap();
        assert!(retry.loaded.contains_key("mod-a"));
        assert_eq!(registry.load().version_of("mod-a"), Some("2.0.0"));
    }

    #[tokio::test]
    async fn test_rejected_new_module_is_left_out_of_map() {
        let (loader, sync, registry, mut ctx) = setup();
        loader.fail("mod-new", "syntax error");

        let outcome = sync
            .apply(&mut ctx, &registry, map(&[(ROOT, "1.0.0"), ("mod-new", "1.0.0")]))
            .await
            .unwrap();

        assert!(outcome.rejected.contains_key("mod-new"));
        let current = registry.load();
        assert!(!current.module_map.contains("mod-new"));
        assert!(current.module("mod-new").is_none());
    }

    #[tokio::test]
    async fn test_root_rejection_is_fatal_and_leaves_registry() {
        let (loader, sync, registry, mut ctx) = setup();
        sync.apply(&mut ctx, &registry, map(&[(ROOT, "1.0.0")]))
            .await
            .unwrap();
        let before = registry.load();

        loader.fail(ROOT, "root exploded");
        let err = sync
            .apply(&mut ctx, &registry, map(&[(ROOT, "2.0.0"), ("mod-a", "1.0.0")]))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::RootModuleRejected { .. }));
        assert!(Arc::ptr_eq(&before, &registry.load()));
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let (loader, sync, registry, mut ctx) = setup();

        let err = sync
            .apply(&mut ctx, &registry, map(&[("mod-a", "1.0.0")]))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::MissingRootModule { .. }));
        assert!(loader.take_calls().is_empty());
    }

    #[tokio::test]
    async fn test_removed_modules_are_unloaded() {
        let (_loader, sync, registry, mut ctx) = setup();
        sync.apply(&mut ctx, &registry, map(&[(ROOT, "1.0.0"), ("mod-a", "1.0.0")]))
            .await
            .unwrap();
        ctx.externals.record("mod-a");

        let outcome = sync
            .apply(&mut ctx, &registry, map(&[(ROOT, "1.0.0")]))
            .await
            .unwrap();

        assert!(outcome.removed.contains("mod-a"));
        assert!(registry.load().module("mod-a").is_none());
        assert!(!ctx.externals.contains("mod-a"));
    }

    #[tokio::test]
    async fn test_reload_module() {
        let (loader, sync, registry, mut ctx) = setup();
        sync.apply(&mut ctx, &registry, map(&[(ROOT, "1.0.0"), ("mod-a", "1.0.0")]))
            .await
            .unwrap();
        let before = registry.load();
        loader.take_calls();

        let outcome = sync.reload_module(&mut ctx, &registry, "mod-a").await;
        assert_eq!(
            outcome,
            ReloadOutcome::Reloaded {
                version: "1.0.0".to_owned()
            }
        );
        assert_eq!(loader.take_calls(), ["mod-a"]);

        let after = registry.load();
        assert!(!Arc::ptr_eq(before.module("mod-a").unwrap(), after.module("mod-a").unwrap()));
        assert!(Arc::ptr_eq(before.module(ROOT).unwrap(), after.module(ROOT).unwrap()));

        assert_eq!(
            sync.reload_module(&mut ctx, &registry, "mod-unknown").await,
            ReloadOutcome::NotInMap
        );

        loader.fail("mod-a", "half-written bundle");
        let rejected = sync.reload_module(&mut ctx, &registry, "mod-a").await;
        assert!(matches!(rejected, ReloadOutcome::Rejected { .. }));
        assert!(Arc::ptr_eq(after.module("mod-a").unwrap(), registry.load().module("mod-a").unwrap()));
    }
}
