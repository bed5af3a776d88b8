//! Toolchain error types.

use std::path::PathBuf;

/// Errors from fetching or building a feature.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// The source could not be cloned or updated.
    #[error("failed to fetch {source_location}: {message}")]
    Fetch {
        /// The source location.
        source_location: String,
        /// What went wrong.
        message: String,
    },

    /// The build program could not be run.
    #[error("build tool unavailable: {0}")]
    BuildToolUnavailable(String),

    /// The build exceeded its time limit and was killed.
    #[error("build timed out after {secs}s")]
    BuildTimeout {
        /// The limit that was exceeded.
        secs: u64,
    },

    /// The build exited unsuccessfully.
    #[error("build failed with exit code {}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    BuildFailed {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },

    /// The build succeeded but left no usable artifact.
    #[error("no artifact found in {}", .0.display())]
    NoArtifact(PathBuf),

    /// Filesystem or process I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for toolchain operations.
pub type ToolchainResult<T> = Result<T, ToolchainError>;
