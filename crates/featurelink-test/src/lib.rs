//! Shared test utilities for featurelink.
//!
//! Fakes for the external collaborators (fetcher, builder, isolation loader),
//! scripted components, and fixtures for contracts and host registries.
//!
//! ```toml
//! [dev-dependencies]
//! featurelink-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use featurelink_test::{greeter_contract, greeter_def, host_registry};
//! use featurelink_core::TypeDef;
//!
//! let host = host_registry([
//!     TypeDef::interface(greeter_contract("x.Service")),
//!     greeter_def("x.impls.Hello", "x.Service", "hello"),
//! ]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
