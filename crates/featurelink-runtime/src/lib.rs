//! Runtime integration of externally sourced features into a host registry.
//!
//! At startup the [`IntegrationEngine`] takes each configured feature and:
//!
//! - looks for a generated descriptor ([`DescriptorSource`]);
//! - loads its artifact into an [`IsolationUnit`] (a WASM module, see
//!   [`WasmUnit`]), or falls back to fetching and building it;
//! - stands up a nested [`Registry`](featurelink_core::Registry) parented to
//!   the host's;
//! - publishes the descriptor's exposed types to the host ([`expose`]),
//!   wrapping contracts in a [`ForwardingProxy`];
//! - records what must be closed on shutdown ([`TeardownTracker`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use featurelink_config::Config;
//! use featurelink_core::{Registry, TypeCatalog};
//! use featurelink_runtime::IntegrationEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(Some(std::path::Path::new(".")), None)?.config;
//! let host = Registry::root("host", Arc::new(TypeCatalog::new("host")));
//!
//! let engine = IntegrationEngine::from_config(&config, std::env::current_dir()?);
//! let report = engine.integrate_configured(&host, &config).await;
//! println!("{} integrated, {} skipped", report.integrated(), report.failed());
//!
//! engine.shutdown();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod descriptors;
pub mod engine;
pub mod error;
pub mod exposure;
pub mod fast_path;
pub mod isolation;
pub mod module_dir;
pub mod teardown;
pub mod wasm;

pub use descriptors::{DescriptorSource, MetadataDirectory, StaticDescriptors, find_descriptor};
pub use engine::{
    EngineSettings, FeatureOutcome, FeatureReport, IntegrationEngine, IntegrationPath,
    IntegrationReport, build_command, feature_spec,
};
pub use error::{IntegrationError, IntegrationResult};
pub use exposure::{ForwardingProxy, expose};
pub use fast_path::copy_compiled_output;
pub use isolation::{IsolatedCodeSpace, IsolationLoader, IsolationUnit};
pub use module_dir::ModuleDirectory;
pub use teardown::{FeatureScope, TeardownTracker};
pub use wasm::{WasmComponent, WasmLimits, WasmLoader, WasmUnit};
