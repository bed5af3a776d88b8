//! Build-time descriptor generation.
//!
//! For every configured feature the [`DescriptorGenerator`] clones the
//! source, scans it with a [`SourceScanner`], regenerates the matching
//! sources into the host ([`GeneratedSink`]), builds the feature and writes
//! a [`Descriptor`](featurelink_core::Descriptor) the runtime picks up on
//! its next start.
//!
//! ```rust,no_run
//! use featurelink_codegen::{DescriptorGenerator, GenerationContext};
//! use featurelink_config::Config;
//! use featurelink_core::FeatureSpec;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(Some(std::path::Path::new(".")), None)?.config;
//! let generator = DescriptorGenerator::from_config(&config, std::env::current_dir()?)?;
//!
//! let features = [FeatureSpec::new("https://example.com/billing.git").with_package("a.billing")];
//! let report = generator.generate(&mut GenerationContext::new(), &features).await;
//! for (written, _) in report.descriptors() {
//!     println!("{}", written.type_name);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod generator;
pub mod naming;
pub mod scanner;
pub mod sink;
pub mod writer;

pub use error::{CodegenError, CodegenResult, SinkError};
pub use generator::{
    DescriptorGenerator, FeatureGeneration, GenerationContext, GenerationOutcome,
    GenerationReport, GeneratorSettings,
};
pub use naming::feature_name;
pub use scanner::{ScanResult, SourceDialect, SourceScanner};
pub use sink::{DirectorySink, GeneratedSink};
pub use writer::{DescriptorWriter, WrittenDescriptor};
