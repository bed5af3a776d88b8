//! Integration error types.

use std::path::PathBuf;

use featurelink_core::CoreError;
use featurelink_toolchain::ToolchainError;

/// Errors raised while integrating one feature.
///
/// The engine catches these at the per-feature boundary; they only surface
/// in logs and in the [`IntegrationReport`](crate::IntegrationReport).
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    /// The descriptor's artifact location could not be found.
    #[error("cannot resolve artifact location: {0}")]
    Resolution(String),

    /// The feature's source could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(#[source] ToolchainError),

    /// The feature could not be built.
    #[error("build failed: {0}")]
    Build(#[source] ToolchainError),

    /// Code could not be loaded from an artifact.
    #[error("cannot load {}: {message}", artifact.display())]
    Isolation {
        /// The artifact being loaded.
        artifact: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Building or populating the nested registry failed.
    #[error("registry error: {0}")]
    Registry(#[from] CoreError),

    /// A type could not be exposed to the host.
    #[error("cannot expose {type_name}: {message}")]
    Exposure {
        /// The exposed type.
        type_name: String,
        /// What went wrong.
        message: String,
    },

    /// A descriptor candidate exists but could not be read.
    #[error("cannot read descriptor {candidate}: {message}")]
    Descriptor {
        /// The descriptor type name.
        candidate: String,
        /// What went wrong.
        message: String,
    },

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for integration operations.
pub type IntegrationResult<T> = Result<T, IntegrationError>;
