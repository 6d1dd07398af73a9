//! Process-wide synchronization state and its rollback snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::externals::ExternalsUsage;

/// Configuration contributed by the most recently loaded root module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedConfig {
    /// Version of the root module that produced this configuration.
    pub root_version: Option<String>,
    /// Externals provided by the root module, keyed by package name, with the
    /// provided version.
    pub provided_externals: BTreeMap<String, String>,
    /// Application settings published by the root module.
    pub settings: serde_json::Map<String, serde_json::Value>,
}

/// Mutable state shared by every synchronization attempt.
///
/// Owned by one synchronizer instance and guarded by a single async mutex
/// ([`SharedContext`]) so attempts and single-module reloads never interleave.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncContext {
    /// Root module configuration.
    pub config: SharedConfig,
    /// Modules that consume root-provided externals.
    pub externals: ExternalsUsage,
}

impl SyncContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current state for rollback.
    #[must_use]
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            config: self.config.clone(),
            externals: self.externals.clone(),
        }
    }

    /// Restore the state captured by [`snapshot`](Self::snapshot).
    pub fn restore(&mut self, snapshot: ConfigSnapshot) {
        self.config = snapshot.config;
        self.externals = snapshot.externals;
    }

    /// Wrap the context for sharing between tasks.
    #[must_use]
    pub fn into_shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }
}

/// A verbatim copy of a [`SyncContext`] taken before an attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    config: SharedConfig,
    externals: ExternalsUsage,
}

impl ConfigSnapshot {
    /// The captured root module configuration.
    #[must_use]
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// The captured externals users.
    #[must_use]
    pub fn externals(&self) -> &ExternalsUsage {
        &self.externals
    }
}

/// Handle to the context shared between the scheduler and the dev watcher.
pub type SharedContext = Arc<Mutex<SyncContext>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_discards_partial_updates() {
        let mut ctx = SyncContext::new();
        ctx.config.root_version = Some("1.0.0".to_owned());
        ctx.config
            .provided_externals
            .insert("react".to_owned(), "17.0.2".to_owned());
        ctx.externals.record("mod-a");

        let snapshot = ctx.snapshot();

        ctx.externals.clear();
        ctx.config.root_version = Some("2.0.0".to_owned());
        ctx.config.provided_externals.clear();
        ctx.externals.record("mod-b");

        ctx.restore(snapshot.clone());
        assert_eq!(ctx.config, *snapshot.config());
        assert_eq!(ctx.config.root_version.as_deref(), Some("1.0.0"));
        assert!(ctx.externals.contains("mod-a"));
        assert!(!ctx.externals.contains("mod-b"));
    }
}
