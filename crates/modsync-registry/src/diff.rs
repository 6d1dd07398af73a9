//! Module map diffing.

use std::collections::BTreeSet;

use crate::error::{RegistryError, RegistryResult};
use crate::externals::ExternalsUsage;
use crate::manifest::ModuleMap;

/// Compute the names of modules that must be (re)loaded to move from
/// `current` to `next`.
///
/// A module is included when its entry in `next` differs from its entry in
/// `current`, which covers newly added modules. When the root module's own
/// entry changed, every externals user that is still listed in `next` is
/// included as well. Modules that only exist in `current` are not part of the
/// result; see [`removed_modules`].
///
/// # Errors
///
/// Returns [`RegistryError::MissingRootModule`] if `next` does not list
/// `root_module_name`.
pub fn changed_modules(
    current: &ModuleMap,
    next: &ModuleMap,
    externals: &ExternalsUsage,
    root_module_name: &str,
) -> RegistryResult<BTreeSet<String>> {
    let Some(next_root) = next.get(root_module_name) else {
        return Err(RegistryError::MissingRootModule {
            name: root_module_name.to_owned(),
        });
    };

    let mut changed: BTreeSet<String> = next
        .modules
        .iter()
        .filter(|(name, entry)| current.get(name) != Some(*entry))
        .map(|(name, _)| name.clone())
        .collect();

    if current.get(root_module_name) != Some(next_root) {
        changed.extend(
            externals
                .iter()
                .filter(|name| next.contains(name))
                .cloned(),
        );
    }

    Ok(changed)
}

/// Names of modules listed in `current` but not in `next`.
#[must_use]
pub fn removed_modules(current: &ModuleMap, next: &ModuleMap) -> BTreeSet<String> {
    current
        .module_names()
        .filter(|name| !next.contains(name))
        .cloned()
        .collect()
}
