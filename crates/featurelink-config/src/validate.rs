//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_features(config)?;
    validate_timeouts(config)?;
    validate_build(config)?;
    validate_scanner(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_features(config: &Config) -> ConfigResult<()> {
    for (i, feature) in config.featurelink.features.iter().enumerate() {
        if feature.source.trim().is_empty() {
            return Err(invalid(
                format!("featurelink.features[{i}].source"),
                "source must not be empty",
            ));
        }
        if feature.branch.trim().is_empty() {
            return Err(invalid(
                format!("featurelink.features[{i}].branch"),
                "branch must not be empty",
            ));
        }
    }
    Ok(())
}

fn validate_timeouts(config: &Config) -> ConfigResult<()> {
    for (field, secs) in [
        ("runtime.build_timeout_secs", config.runtime.build_timeout_secs),
        ("runtime.call_timeout_secs", config.runtime.call_timeout_secs),
        ("codegen.build_timeout_secs", config.codegen.build_timeout_secs),
    ] {
        if secs == 0 {
            return Err(invalid(field, "timeout must be greater than zero"));
        }
    }
    if config.runtime.memory_max_pages == 0 {
        return Err(invalid(
            "runtime.memory_max_pages",
            "memory cap must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_build(config: &Config) -> ConfigResult<()> {
    if config.build.program.trim().is_empty() {
        return Err(invalid("build.program", "build program must not be empty"));
    }
    if config.build.artifact_extension.trim_start_matches('.').is_empty() {
        return Err(invalid(
            "build.artifact_extension",
            "artifact extension must not be empty",
        ));
    }
    if config.runtime.compiled_extension.trim_start_matches('.').is_empty() {
        return Err(invalid(
            "runtime.compiled_extension",
            "compiled extension must not be empty",
        ));
    }
    Ok(())
}

fn validate_scanner(config: &Config) -> ConfigResult<()> {
    let scanner = &config.scanner;
    if scanner.extension.trim_start_matches('.').is_empty() {
        return Err(invalid("scanner.extension", "extension must not be empty"));
    }
    if scanner.package_pattern.is_empty() || scanner.type_pattern.is_empty() {
        return Err(invalid("scanner", "package and type patterns are required"));
    }
    if scanner.markers.iter().any(|m| m.trim().is_empty()) {
        return Err(invalid("scanner.markers", "markers must not be blank"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let logging = &config.logging;
    if !matches!(
        logging.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!("unknown level '{}'", logging.level),
        ));
    }
    if !matches!(logging.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected pretty, compact, json or full",
                logging.format
            ),
        ));
    }
    match logging.target.as_str() {
        "stderr" | "stdout" => Ok(()),
        "file" if logging.directory.is_some() => Ok(()),
        "file" => Err(invalid(
            "logging.directory",
            "a directory is required when target is 'file'",
        )),
        other => Err(invalid(
            "logging.target",
            format!("unknown target '{other}'; expected stderr, stdout or file"),
        )),
    }
}
