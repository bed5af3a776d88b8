//! Fetching feature sources with `git`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ToolchainError, ToolchainResult};

/// Number of hex characters of the location hash used as the workspace name.
const WORKSPACE_HASH_LEN: usize = 16;

/// Obtains a feature's source tree.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Return a local workspace for `source` at `branch`, reusing and
    /// updating a cached clone when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ToolchainError::Fetch`] if no workspace could be produced.
    async fn fetch(&self, source: &str, branch: &str) -> ToolchainResult<PathBuf>;

    /// Clone `source` at `branch` into the empty directory `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolchainError::Fetch`] if the clone fails.
    async fn clone_into(&self, source: &str, branch: &str, dest: &Path) -> ToolchainResult<()>;
}

/// [`Fetcher`] backed by the `git` command line.
///
/// Cached workspaces live under `base_dir`, one directory per source location
/// named by a truncated blake3 hash of the location. Distinct locations that
/// collide on the truncated hash share a workspace.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    base_dir: PathBuf,
    program: String,
}

impl GitFetcher {
    /// Create a fetcher caching workspaces under `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            program: "git".to_string(),
        }
    }

    /// Use a different git executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Cache root.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Workspace directory used for `source`.
    #[must_use]
    pub fn workspace_for(&self, source: &str) -> PathBuf {
        let hash = blake3::hash(source.as_bytes()).to_hex();
        let name = hash.get(..WORKSPACE_HASH_LEN).unwrap_or(hash.as_str());
        self.base_dir.join(name)
    }

    fn command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        // Only PATH and HOME are inherited so GIT_* variables from the
        // environment cannot redirect the clone or run helpers.
        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        if let Ok(home) = std::env::var("HOME") {
            cmd.env("HOME", home);
        }
        cmd.env("GIT_CONFIG_NOSYSTEM", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn run(&self, source: &str, cwd: Option<&Path>, args: &[&str]) -> ToolchainResult<()> {
        debug!(feature = source, args = ?args, "Running git");
        let output = self
            .command(cwd)
            .args(args)
            .output()
            .await
            .map_err(|e| fetch_error(source, format!("failed to run {}: {e}", self.program)))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(fetch_error(
            source,
            format!("git {} failed: {}", args.first().unwrap_or(&""), stderr.trim()),
        ))
    }

    async fn update(&self, source: &str, branch: &str, dir: &Path) {
        info!(feature = source, workspace = %dir.display(), "Updating existing workspace");
        if let Err(e) = self.run(source, Some(dir), &["fetch", "origin"]).await {
            warn!(feature = source, error = %e, "Fetch failed, continuing with cached clone");
        }
        if let Err(e) = self.run(source, Some(dir), &["checkout", "-f", branch]).await {
            debug!(feature = source, branch, error = %e, "Checkout failed, keeping current branch");
        }
        if let Err(e) = self.run(source, Some(dir), &["pull", "--ff-only"]).await {
            warn!(feature = source, error = %e, "Pull failed, continuing with cached clone");
        }
    }
}

fn fetch_error(source: &str, message: String) -> ToolchainError {
    ToolchainError::Fetch {
        source_location: source.to_string(),
        message,
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch(&self, source: &str, branch: &str) -> ToolchainResult<PathBuf> {
        let dir = self.workspace_for(source);
        if dir.join(".git").exists() {
            self.update(source, branch, &dir).await;
            return Ok(dir);
        }
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| fetch_error(source, format!("cannot create {}: {e}", self.base_dir.display())))?;
        Fetcher::clone_into(self, source, branch, &dir).await?;
        Ok(dir)
    }

    async fn clone_into(&self, source: &str, branch: &str, dest: &Path) -> ToolchainResult<()> {
        info!(feature = source, branch, dest = %dest.display(), "Cloning feature");
        let dest_str = dest.to_string_lossy();
        self.run(
            source,
            None,
            &["clone", "--branch", branch, "--", source, &dest_str],
        )
        .await?;
        info!(feature = source, dest = %dest.display(), "Cloned feature");
        Ok(())
    }
}
