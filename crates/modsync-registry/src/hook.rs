//! Module-load validation hooks.

use semver::{Version, VersionReq};
use tracing::debug;

use crate::context::{SharedConfig, SyncContext};
use crate::loader::LoadedModule;

/// Invoked once for every module that loaded successfully, before it is
/// installed in the registry.
///
/// Returning an error rejects the module; the reason is reported in the
/// synchronization outcome.
pub trait ModuleLoadHook: Send + Sync {
    /// Validate `module` and update `ctx` accordingly.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason if the module must not be installed.
    fn on_module_load(
        &self,
        ctx: &mut SyncContext,
        module: &LoadedModule,
        is_root: bool,
    ) -> Result<(), String>;
}

/// Default hook: tracks externals usage and checks required external
/// versions against what the root module provides.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalsHook;

impl ModuleLoadHook for ExternalsHook {
    fn on_module_load(
        &self,
        ctx: &mut SyncContext,
        module: &LoadedModule,
        is_root: bool,
    ) -> Result<(), String> {
        if is_root {
            ctx.externals.clear();
            ctx.config = SharedConfig {
                root_version: Some(module.version.clone()),
                provided_externals: module.metadata.provided_externals.clone(),
                settings: module.metadata.app_config.clone(),
            };
            debug!(
                module = %module.name,
                version = %module.version,
                externals = ctx.config.provided_externals.len(),
                "Root module configuration applied"
            );
            return Ok(());
        }

        ctx.externals.remove(&module.name);
        if module.metadata.required_externals.is_empty() {
            return Ok(());
        }

        for (external, range) in &module.metadata.required_externals {
            check_external(&ctx.config, external, range)?;
        }
        ctx.externals.record(module.name.clone());
        Ok(())
    }
}

fn check_external(config: &SharedConfig, external: &str, range: &str) -> Result<(), String> {
    let req = VersionReq::parse(range)
        .map_err(|e| format!("invalid version range '{range}' for external '{external}': {e}"))?;

    let Some(provided) = config.provided_externals.get(external) else {
        return Err(format!("external '{external}' is not provided by the root module"));
    };

    let version = Version::parse(provided).map_err(|e| {
        format!("root module provides unparseable version '{provided}' of '{external}': {e}")
    })?;

    if req.matches(&version) {
        Ok(())
    } else {
        Err(format!(
            "external '{external}' {provided} does not satisfy required range '{range}'"
        ))
    }
}
