//! CLI handlers for the `featurelink config` subcommand.

use std::path::Path;

use anyhow::{Context, Result};
use featurelink_config::Config;

/// Print the resolved configuration as TOML.
pub(crate) fn show_config(workspace_root: &Path, explicit: Option<&Path>) -> Result<()> {
    let resolved = Config::load(Some(workspace_root), explicit)?;
    let output =
        toml::to_string_pretty(&resolved.config).context("failed to format config")?;
    println!("{output}");
    Ok(())
}

/// Validate the configuration.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn validate_config(workspace_root: &Path, explicit: Option<&Path>) -> Result<()> {
    match Config::load(Some(workspace_root), explicit) {
        Ok(resolved) => {
            println!("Configuration is valid.");
            if !resolved.loaded_files.is_empty() {
                println!("\nLoaded files:");
                for path in &resolved.loaded_files {
                    println!("  - {path}");
                }
            }
            if resolved.env_overrides > 0 {
                println!("\n{} environment override(s) applied.", resolved.env_overrides);
            }
            Ok(())
        },
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        },
    }
}
