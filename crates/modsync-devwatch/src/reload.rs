//! Single-module reload pipeline.

use std::sync::Arc;

use futures::FutureExt;
use modsync_registry::{RegistryHandle, RegistrySynchronizer, ReloadOutcome, SharedContext};
use tracing::{debug, info, warn};

use crate::entrypoint::Entrypoint;

/// Reloads modules whose entrypoint settled on disk.
#[derive(Debug, Clone)]
pub struct ModuleReloader {
    synchronizer: Arc<RegistrySynchronizer>,
    registry: RegistryHandle,
    context: SharedContext,
}

impl ModuleReloader {
    /// Create a reloader sharing the registry and context with the rest of
    /// the process.
    pub fn new(
        synchronizer: Arc<RegistrySynchronizer>,
        registry: RegistryHandle,
        context: SharedContext,
    ) -> Self {
        Self {
            synchronizer,
            registry,
            context,
        }
    }

    /// Reload the module behind `entrypoint`.
    ///
    /// A module missing from the current module map is skipped with a
    /// warning. A failed load leaves the previous version installed.
    pub async fn reload(&self, entrypoint: &Entrypoint) -> ReloadOutcome {
        let module = entrypoint.module.as_str();
        info!(module, version = %entrypoint.version, "Reloading module");

        let attempt = {
            let mut ctx = self.context.lock().await;
            std::panic::AssertUnwindSafe(self.synchronizer.reload_module(
                &mut ctx,
                &self.registry,
                module,
            ))
            .catch_unwind()
            .await
        };
        let outcome = attempt.unwrap_or_else(|_| ReloadOutcome::Rejected {
            reason: "module loader panicked".to_owned(),
        });

        match &outcome {
            ReloadOutcome::Reloaded { version } => {
                info!(module, version = %version, "Module reloaded");
            },
            ReloadOutcome::NotInMap => {
                warn!(
                    module,
                    "Module is not in the module map; serve it before it can be reloaded"
                );
            },
            ReloadOutcome::Rejected { reason } => {
                debug!(module, reason = %reason, "Module reload rejected; keeping previous version");
            },
        }
        outcome
    }
}
