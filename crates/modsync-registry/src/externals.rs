//! Modules that consume externals provided by the root module.

use std::collections::BTreeSet;

/// Names of non-root modules that declared required externals.
///
/// Every member has to be re-evaluated whenever the root module changes,
/// because the root decides which external versions are provided. The set is
/// cleared when the root module loads and refilled as the other modules load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalsUsage {
    modules: BTreeSet<String>,
}

impl ExternalsUsage {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `module` uses externals. Returns `true` if it was not
    /// already recorded.
    pub fn record(&mut self, module: impl Into<String>) -> bool {
        self.modules.insert(module.into())
    }

    /// Forget `module`. Returns `true` if it was recorded.
    pub fn remove(&mut self, module: &str) -> bool {
        self.modules.remove(module)
    }

    /// Forget every module.
    pub fn clear(&mut self) {
        self.modules.clear();
    }

    /// Whether `module` is recorded.
    #[must_use]
    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    /// Recorded module names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.modules.iter()
    }

    /// Number of recorded modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExternalsUsage {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            modules: iter.into_iter().map(Into::into).collect(),
        }
    }
}
