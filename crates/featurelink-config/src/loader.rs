//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge the config file (explicit path, else `{workspace}/featurelink.toml`)
//! 3. Apply `FEATURELINK_*` environment overrides
//! 4. Deserialize merged tree → `Config`
//! 5. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::deep_merge;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// File name looked up in the workspace root.
pub const CONFIG_FILE_NAME: &str = "featurelink.toml";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Config files merged over the defaults, in order.
    pub loaded_files: Vec<String>,
    /// Number of environment overrides applied.
    pub env_overrides: usize,
}

/// Load the configuration with layered precedence, reading the process
/// environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a config file is malformed, an override is
/// invalid, or the final configuration fails validation.
pub fn load(workspace_root: Option<&Path>, explicit: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_with_env(workspace_root, explicit, &collect_env_vars())
}

/// [`load`] with an explicit environment snapshot.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<S: ::std::hash::BuildHasher>(
    workspace_root: Option<&Path>,
    explicit: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    // 1. Parse embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut loaded_files = Vec::new();

    // 2. Config file. An explicit path must exist; the workspace file is optional.
    let file = match explicit {
        Some(path) => Some((read_file(path)?, path.to_path_buf())),
        None => workspace_root
            .map(|root| root.join(CONFIG_FILE_NAME))
            .map(|path| try_load_file(&path).map(|v| v.map(|v| (v, path))))
            .transpose()?
            .flatten(),
    };
    if let Some((overlay, path)) = file {
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "loaded config file");
        loaded_files.push(path.display().to_string());
    }

    // 3. Environment overrides.
    let env_overrides = apply_env_overrides(&mut merged, env_vars)?;
    if env_overrides > 0 {
        debug!(count = env_overrides, "applied environment overrides");
    }

    // 4. Deserialize.
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    // 5. Validate.
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        loaded_files,
        env_overrides,
    })
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = read_file(path)?;
    let config: Config = overlay
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let read_error = |source| ConfigError::ReadError {
        path: path.display().to_string(),
        source,
    };
    try_load_file(path)?.ok_or_else(|| {
        read_error(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "config file not found",
        ))
    })
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Default location of the workspace config file.
#[must_use]
pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert!(!config.featurelink.enabled);
        assert_eq!(config.runtime.build_timeout_secs, 300);
        assert_eq!(config.codegen.build_timeout_secs, 600);
        assert_eq!(config.scanner.markers.len(), 6);
        assert_eq!(config.scanner.type_pattern, Config::default().scanner.type_pattern);
        assert_eq!(config.scanner.package_pattern, Config::default().scanner.package_pattern);
    }

    #[test]
    fn test_load_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load_with_env(Some(dir.path()), None, &no_env()).unwrap();
        assert!(resolved.loaded_files.is_empty());
        assert!(resolved.config.featurelink.features.is_empty());
    }

    #[test]
    fn test_workspace_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            workspace_config_path(dir.path()),
            r#"
            [featurelink]
            enabled = true
            [[featurelink.features]]
            source = "https://example/repo.git"

            [runtime]
            build_timeout_secs = 60
            "#,
        )
        .unwrap();
        let env: HashMap<String, String> =
            [("FEATURELINK_BUILD_TIMEOUT_SECS".to_owned(), "90".to_owned())].into();

        let resolved = load_with_env(Some(dir.path()), None, &env).unwrap();
        assert_eq!(resolved.loaded_files.len(), 1);
        assert_eq!(resolved.env_overrides, 1);
        assert!(resolved.config.featurelink.enabled);
        assert_eq!(resolved.config.featurelink.features[0].branch, "main");
        assert_eq!(resolved.config.runtime.build_timeout_secs, 90);
        assert_eq!(resolved.config.runtime.compiled_extension, "wasm");
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let result = load_with_env(None, Some(Path::new("/nonexistent/featurelink.toml")), &no_env());
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_load_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[[featurelink.features]]\nsource = \"\"\n").unwrap();
        assert!(matches!(
            load_file(&path),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&file_path, data).unwrap();

        let result = try_load_file(&file_path);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }
}
