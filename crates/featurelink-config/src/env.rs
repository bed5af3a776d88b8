//! `FEATURELINK_*` environment overrides.
//!
//! Applied after every file layer, so they win over file values.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// How an environment variable's string is turned into a TOML value.
#[derive(Clone, Copy)]
enum Kind {
    Bool,
    Integer,
    String,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: Kind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "FEATURELINK_ENABLED",
        field_path: "featurelink.enabled",
        kind: Kind::Bool,
    },
    EnvMapping {
        var_name: "FEATURELINK_LOG_LEVEL",
        field_path: "logging.level",
        kind: Kind::String,
    },
    EnvMapping {
        var_name: "FEATURELINK_CACHE_DIR",
        field_path: "runtime.cache_dir",
        kind: Kind::String,
    },
    EnvMapping {
        var_name: "FEATURELINK_BUILD_TIMEOUT_SECS",
        field_path: "runtime.build_timeout_secs",
        kind: Kind::Integer,
    },
];

/// Snapshot the `FEATURELINK_*` variables of this process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("FEATURELINK_"))
        .collect()
}

/// Apply every mapped variable present in `env_vars` to `merged`.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a value cannot be coerced to the
/// field's type.
pub fn apply_env_overrides<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;
    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let value = coerce(mapping, raw)?;
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

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let raw = raw.trim();
    let invalid = |expected: &str| ConfigError::EnvError {
        var_name: mapping.var_name.to_owned(),
        message: format!("expected {expected}, got '{raw}'"),
    };
    match mapping.kind {
        Kind::Bool => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(invalid("a boolean")),
        },
        Kind::Integer => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|_| invalid("an integer")),
        Kind::String => Ok(toml::Value::String(raw.to_owned())),
    }
}

/// Set `path` (dot-separated) in `root`, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn overrides_are_typed() {
        let mut merged: toml::Value = toml::from_str("[featurelink]\nenabled = false\n").unwrap();
        let applied = apply_env_overrides(
            &mut merged,
            &vars(&[
                ("FEATURELINK_ENABLED", "yes"),
                ("FEATURELINK_BUILD_TIMEOUT_SECS", "42"),
                ("FEATURELINK_CACHE_DIR", "/var/cache/features"),
                ("FEATURELINK_UNRELATED", "x"),
            ]),
        )
        .unwrap();

        assert_eq!(applied, 3);
        assert_eq!(merged["featurelink"]["enabled"].as_bool(), Some(true));
        assert_eq!(merged["runtime"]["build_timeout_secs"].as_integer(), Some(42));
        assert_eq!(
            merged["runtime"]["cache_dir"].as_str(),
            Some("/var/cache/features")
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let result = apply_env_overrides(
            &mut merged,
            &vars(&[("FEATURELINK_BUILD_TIMEOUT_SECS", "soon")]),
        );
        assert!(matches!(
            result,
            Err(ConfigError::EnvError { var_name, .. }) if var_name == "FEATURELINK_BUILD_TIMEOUT_SECS"
        ));
    }
}
