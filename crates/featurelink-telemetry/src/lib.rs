//! Logging setup and run correlation for featurelink.
//!
//! # Example
//!
//! ```rust,no_run
//! use featurelink_telemetry::{LogConfig, LogFormat, RunContext, RunGuard, setup_logging};
//!
//! # fn main() -> Result<(), featurelink_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("featurelink_runtime=trace");
//! setup_logging(&config)?;
//!
//! let _run = RunGuard::new(RunContext::new("integrate"));
//! tracing::info!("Integrating features");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod logging;

pub use context::{RunContext, RunGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    LogConfig, LogFormat, LogTarget, setup_default_logging, setup_from_section, setup_logging,
};
