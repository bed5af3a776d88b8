//! Generator error types.

use std::path::PathBuf;

use featurelink_toolchain::ToolchainError;

/// Errors raised while generating one feature's descriptor.
///
/// The generator catches these at the per-feature boundary; a failed
/// feature is logged and the run moves on.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// The source tree could not be walked or read.
    #[error("scan failed at {}: {message}", path.display())]
    Scan {
        /// Offending path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A regenerated source could not be written.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Fetching or building the feature failed.
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// A configured scanner pattern is not a valid regular expression.
    #[error("invalid scanner pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Descriptor metadata could not be rendered.
    #[error("cannot render descriptor: {0}")]
    Render(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a [`GeneratedSink`](crate::GeneratedSink).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The type was already regenerated in this run.
    #[error("source already generated for {0}")]
    AlreadyGenerated(String),

    /// The source could not be written.
    #[error("cannot write {}: {source}", path.display())]
    Io {
        /// Target file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for generator operations.
pub type CodegenResult<T> = Result<T, CodegenError>;
