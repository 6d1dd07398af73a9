//! The externally observable module map health flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the most recent poll attempt reached the module map.
///
/// Cloning yields another handle to the same flag. The flag starts out
/// unhealthy until the first attempt succeeds.
#[derive(Debug, Clone, Default)]
pub struct ModuleMapHealth {
    healthy: Arc<AtomicBool>,
}

impl ModuleMapHealth {
    /// Create a flag in the unhealthy state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current health.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }
}
