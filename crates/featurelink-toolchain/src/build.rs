//! Running the external build command.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactSelector;
use crate::error::{ToolchainError, ToolchainResult};

/// Turns a feature workspace into a loadable artifact.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Build `workspace` and return the path of the produced artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool is unavailable, the build times out or
    /// fails, or no artifact is produced.
    async fn build(&self, workspace: &Path, timeout: Duration) -> ToolchainResult<PathBuf>;
}

/// The build command line and where it leaves its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildCommand {
    /// Executable to run.
    pub program: String,
    /// Arguments passed to `program`.
    pub args: Vec<String>,
    /// Arguments for the availability check run before building; empty
    /// skips the check.
    pub probe_args: Vec<String>,
    /// Output directory, relative to the workspace.
    pub artifact_dir: PathBuf,
    /// Artifact file extension.
    pub artifact_extension: String,
}

impl Default for BuildCommand {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: ["build", "--release", "--target", "wasm32-wasip1"]
                .map(String::from)
                .to_vec(),
            probe_args: vec!["--version".to_string()],
            artifact_dir: PathBuf::from("target").join("wasm32-wasip1").join("release"),
            artifact_extension: "wasm".to_string(),
        }
    }
}

impl From<&featurelink_config::BuildSection> for BuildCommand {
    fn from(section: &featurelink_config::BuildSection) -> Self {
        Self {
            program: section.program.clone(),
            args: section.args.clone(),
            probe_args: section.probe_args.clone(),
            artifact_dir: section.artifact_dir.clone(),
            artifact_extension: section.artifact_extension.clone(),
        }
    }
}

/// [`Builder`] that runs a [`BuildCommand`] as a child process.
///
/// Output lines are logged under the `featurelink::build` target as they
/// arrive. A build that outlives its timeout is killed.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    command: BuildCommand,
}

impl CommandBuilder {
    /// Create a builder for `command`.
    #[must_use]
    pub fn new(command: BuildCommand) -> Self {
        Self { command }
    }

    /// The configured command.
    #[must_use]
    pub fn command(&self) -> &BuildCommand {
        &self.command
    }

    async fn probe(&self) -> ToolchainResult<()> {
        if self.command.probe_args.is_empty() {
            return Ok(());
        }
        let probe = Command::new(&self.command.program)
            .args(&self.command.probe_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        match tokio::time::timeout(Duration::from_secs(10), probe).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ToolchainError::BuildToolUnavailable(format!(
                "`{} {}` exited with {status}",
                self.command.program,
                self.command.probe_args.join(" ")
            ))),
            Ok(Err(e)) => Err(ToolchainError::BuildToolUnavailable(format!(
                "`{}` could not be started: {e}",
                self.command.program
            ))),
            Err(_) => Err(ToolchainError::BuildToolUnavailable(format!(
                "`{} {}` did not answer",
                self.command.program,
                self.command.probe_args.join(" ")
            ))),
        }
    }
}

/// How long output is drained after the build exits. Processes the build
/// left running can hold the pipes open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn stream_to_log<R>(reader: R, program: String) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "featurelink::build", "[{program}] {line}");
        }
    })
}

#[async_trait]
impl Builder for CommandBuilder {
    async fn build(&self, workspace: &Path, timeout: Duration) -> ToolchainResult<PathBuf> {
        self.probe().await?;

        info!(
            workspace = %workspace.display(),
            program = %self.command.program,
            args = ?self.command.args,
            "Building feature"
        );
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolchainError::BuildToolUnavailable(e.to_string()))?;

        let mut loggers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            loggers.push(stream_to_log(stdout, self.command.program.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            loggers.push(stream_to_log(stderr, self.command.program.clone()));
        }

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(workspace = %workspace.display(), secs = timeout.as_secs(), "Build timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out build");
                }
                for logger in loggers {
                    logger.abort();
                }
                return Err(ToolchainError::BuildTimeout {
                    secs: timeout.as_secs(),
                });
            },
        };
        for mut logger in loggers {
            match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut logger).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => warn!(error = %e, "Build output logger failed"),
                Err(_) => {
                    warn!(
                        program = %self.command.program,
                        "Build output still open after exit, no longer logging it"
                    );
                    logger.abort();
                },
            }
        }

        if !status.success() {
            return Err(ToolchainError::BuildFailed {
                code: status.code(),
            });
        }

        let output_dir = workspace.join(&self.command.artifact_dir);
        let artifact = ArtifactSelector::new(&self.command.artifact_extension)
            .select(&output_dir)
            .ok_or(ToolchainError::NoArtifact(output_dir))?;
        debug!(artifact = %artifact.display(), "Build produced artifact");
        Ok(artifact)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandBuilder {
        CommandBuilder::new(BuildCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            probe_args: vec!["-c".to_string(), "true".to_string()],
            artifact_dir: PathBuf::from("out"),
            artifact_extension: "wasm".to_string(),
        })
    }

    #[test]
    fn default_targets_wasi() {
        let cmd = BuildCommand::default();
        assert_eq!(cmd.program, "cargo");
        assert!(cmd.args.contains(&"wasm32-wasip1".to_string()));
        assert_eq!(cmd.artifact_extension, "wasm");
    }

    #[tokio::test]
    async fn returns_selected_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let builder = sh("mkdir -p out && echo building && touch out/feature.wasm");

        let artifact = builder
            .build(dir.path(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(artifact, dir.path().join("out").join("feature.wasm"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_build_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("exit 3")
            .build(dir.path(), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::BuildFailed { code: Some(3) }));
    }

    #[tokio::test]
    async fn missing_output_is_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("true")
            .build(dir.path(), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::NoArtifact(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn lingering_grandchild_does_not_stall_build() {
        let dir = tempfile::tempdir().unwrap();
        let builder = sh("mkdir -p out && touch out/feature.wasm && { sleep 30 & } && exit 0");
        let started = std::time::Instant::now();

        let artifact = builder
            .build(dir.path(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(artifact, dir.path().join("out").join("feature.wasm"));
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn slow_build_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("sleep 30")
            .build(dir.path(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::BuildTimeout { .. }));
    }

    #[tokio::test]
    async fn unavailable_tool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let builder = CommandBuilder::new(BuildCommand {
            program: "featurelink-no-such-build-tool".to_string(),
            ..BuildCommand::default()
        });
        let err = builder
            .build(dir.path(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::BuildToolUnavailable(_)));
    }
}
