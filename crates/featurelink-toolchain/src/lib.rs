//! External collaborators used by featurelink.
//!
//! - [`Fetcher`] obtains a feature's source tree ([`GitFetcher`] shells out to `git`)
//! - [`Builder`] turns a source tree into an artifact ([`CommandBuilder`] runs a
//!   configurable build command with a hard timeout)
//! - [`ArtifactSelector`] picks the produced artifact from the build output

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod artifact;
pub mod build;
pub mod error;
pub mod fetch;

pub use artifact::ArtifactSelector;
pub use build::{BuildCommand, Builder, CommandBuilder};
pub use error::{ToolchainError, ToolchainResult};
pub use fetch::{Fetcher, GitFetcher};
