//! featurelink CLI.
//!
//! Generates feature descriptors at build time and dry-runs the startup
//! integration against an empty host.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use featurelink_config::Config;

mod commands;

use commands::{config, descriptors, fetch, generate, integrate};

/// featurelink - integrate externally sourced features into a host
#[derive(Parser)]
#[command(name = "featurelink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "FEATURELINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate descriptors for the configured features
    Generate,

    /// List descriptors written by earlier generation runs
    Descriptors,

    /// Run startup integration against an empty host and report
    Integrate,

    /// Fetch (or update) one feature source into the cache
    Fetch {
        /// Git URL or local path
        source: String,

        /// Branch to check out
        #[arg(short, long, default_value = "main")]
        branch: String,
    },

    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Validate the configuration and list loaded files
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let workspace_root = std::env::current_dir().context("cannot determine working directory")?;
    let explicit = cli.config.as_deref();

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Show => config::show_config(&workspace_root, explicit),
            ConfigCommands::Validate => config::validate_config(&workspace_root, explicit),
        },
        command => {
            let config = load_config(&workspace_root, explicit, cli.verbose)?;
            match command {
                Commands::Generate => generate::run_generate(&config, &workspace_root).await,
                Commands::Descriptors => descriptors::list_descriptors(&config, &workspace_root),
                Commands::Integrate => integrate::run_integrate(&config, &workspace_root).await,
                Commands::Fetch { source, branch } => {
                    fetch::run_fetch(&config, &source, &branch).await
                },
                Commands::Config { .. } => unreachable!("handled above"),
            }
        },
    }
}

/// Load configuration and install logging from its `[logging]` section.
fn load_config(workspace_root: &Path, explicit: Option<&Path>, verbose: bool) -> Result<Config> {
    let resolved = Config::load(Some(workspace_root), explicit)?;
    let mut config = resolved.config;
    if verbose {
        "debug".clone_into(&mut config.logging.level);
    }
    if let Err(e) = featurelink_telemetry::setup_from_section(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
    }
    tracing::debug!(
        files = ?resolved.loaded_files,
        env_overrides = resolved.env_overrides,
        "Configuration loaded"
    );
    Ok(config)
}
