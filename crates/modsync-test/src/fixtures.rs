//! Module map fixtures.

use std::collections::BTreeMap;

use modsync_registry::{BundleRecord, ModuleEntry, ModuleMap, ModuleMetadata};

/// Root module name used by the fixtures.
pub const TEST_ROOT: &str = "frank-lloyd-root";

/// A module entry for `name` at `version` with all three targets.
#[must_use]
pub fn module_entry(name: &str, version: &str) -> ModuleEntry {
    let bundle = |target: &str| BundleRecord {
        url: format!("https://cdn.example.com/{name}/{version}/{name}.{target}.js"),
        integrity: format!("sha256-{name}-{version}-{target}"),
    };
    ModuleEntry {
        base_url: Some(format!("https://cdn.example.com/{name}/{version}/")),
        node: bundle("node"),
        browser: bundle("browser"),
        legacy_browser: Some(bundle("legacy.browser")),
    }
}

/// A module map listing `(name, version)` pairs.
#[must_use]
pub fn module_map(modules: &[(&str, &str)]) -> ModuleMap {
    let mut map = ModuleMap {
        key: format!("key-{}", modules.len()),
        modules: BTreeMap::new(),
    };
    for (name, version) in modules {
        map.insert(*name, module_entry(name, version));
    }
    map
}

/// Metadata for a root module providing `externals` (name, version).
#[must_use]
pub fn root_metadata(externals: &[(&str, &str)]) -> ModuleMetadata {
    ModuleMetadata {
        provided_externals: pairs(externals),
        ..ModuleMetadata::default()
    }
}

/// Metadata for a module requiring `externals` (name, semver range).
#[must_use]
pub fn consumer_metadata(externals: &[(&str, &str)]) -> ModuleMetadata {
    ModuleMetadata {
        required_externals: pairs(externals),
        ..ModuleMetadata::default()
    }
}

fn pairs(list: &[(&str, &str)]) -> BTreeMap<String, String> {
    list.iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
