//! Environment variable overrides.
//!
//! Unlike config files, the environment is authoritative: a recognised
//! variable replaces whatever the file layers set. Numeric variables are
//! parsed here so a malformed value fails at startup with the variable name
//! in the error.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// How an environment variable's text is turned into a TOML value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvKind {
    /// Non-negative, finite number of seconds.
    Seconds,
    /// Taken verbatim.
    Text,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: EnvKind,
}

/// All supported environment variables.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "ONE_MAP_POLLING_MIN",
        field_path: "polling.min_secs",
        kind: EnvKind::Seconds,
    },
    EnvMapping {
        var_name: "ONE_MAP_POLLING_MAX",
        field_path: "polling.max_secs",
        kind: EnvKind::Seconds,
    },
    EnvMapping {
        var_name: "HOLOCRON_MODULE_MAP_URL",
        field_path: "sync.module_map_url",
        kind: EnvKind::Text,
    },
    EnvMapping {
        var_name: "ONE_CLIENT_ROOT_MODULE_NAME",
        field_path: "sync.root_module_name",
        kind: EnvKind::Text,
    },
];

/// Snapshot the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Apply recognised environment variables on top of the merged config tree.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the variable if a numeric
/// variable does not parse as a non-negative, finite number.
pub fn apply_env_overrides<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        let value = match mapping.kind {
            EnvKind::Seconds => toml::Value::Float(parse_seconds(mapping.var_name, raw)?),
            EnvKind::Text => toml::Value::String(raw.clone()),
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var override"
        );
        set_field(merged, mapping.field_path, value);
        count = count.saturating_add(1);
    }

    Ok(count)
}

/// Parse a seconds value, rejecting anything that is not a non-negative,
/// finite number.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] with `var_name` as the field.
pub fn parse_seconds(var_name: &str, raw: &str) -> ConfigResult<f64> {
    let invalid = |message: String| ConfigError::ValidationError {
        field: var_name.to_owned(),
        message,
    };

    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("'{raw}' is not a number")))?;

    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid(format!("'{raw}' must be a finite, non-negative number")));
    }

    Ok(secs)
}

/// Set a dotted field path in the TOML tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_parse_seconds() {
        assert!((parse_seconds("X", "5").unwrap() - 5.0).abs() < f64::EPSILON);
        assert!((parse_seconds("X", " 0.25 ").unwrap() - 0.25).abs() < f64::EPSILON);
        assert!(parse_seconds("X", "0").is_ok());
    }

    #[test]
    fn test_parse_seconds_rejects_garbage() {
        for raw in ["", "abc", "-1", "NaN", "inf", "5s"] {
            let err = parse_seconds("ONE_MAP_POLLING_MIN", raw).unwrap_err();
            assert!(
                matches!(err, ConfigError::ValidationError { ref field, .. } if field == "ONE_MAP_POLLING_MIN"),
                "expected validation error for {raw:?}"
            );
        }
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut merged: toml::Value = toml::from_str(
            r#"
            [polling]
            min_secs = 5.0
            max_secs = 300.0
            "#,
        )
        .unwrap();

        let applied = apply_env_overrides(
            &mut merged,
            &env(&[("ONE_MAP_POLLING_MIN", "1"), ("ONE_MAP_POLLING_MAX", "60")]),
        )
        .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(merged["polling"]["min_secs"].as_float(), Some(1.0));
        assert_eq!(merged["polling"]["max_secs"].as_float(), Some(60.0));
    }

    #[test]
    fn test_overrides_create_missing_tables() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        apply_env_overrides(
            &mut merged,
            &env(&[("ONE_CLIENT_ROOT_MODULE_NAME", "frank-lloyd-root")]),
        )
        .unwrap();
        assert_eq!(
            merged["sync"]["root_module_name"].as_str(),
            Some("frank-lloyd-root")
        );
    }

    #[test]
    fn test_unrelated_vars_ignored() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let applied = apply_env_overrides(&mut merged, &env(&[("PATH", "/usr/bin")])).unwrap();
        assert_eq!(applied, 0);
        assert!(merged.as_table().unwrap().is_empty());
    }
}
