//! Core model for the featurelink feature-integration engine.
//!
//! This crate holds the contract shared by the build-time generator and the
//! runtime engine, plus the service-container primitives the engine drives:
//!
//! - [`FeatureSpec`]: one configured feature (source location, branch, packages)
//! - [`Descriptor`]: precomputed metadata describing how to load and what to expose
//! - [`TypeName`]: a fully-qualified, dot-separated type name
//! - [`Component`] / [`Contract`]: instances and the capability contracts they implement
//! - [`CodeSpace`]: the set of types a registry can name (host or isolation unit)
//! - [`Registry`]: a scoped service container with optional parent
//! - [`ExposureBinding`]: a type published into the host registry under a name
//!
//! # Naming
//!
//! Registries bind scanned components under the decapitalized simple name
//! (`a.b.GreetingService` → `greetingService`) and explicitly registered types
//! under their fully-qualified name.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod code_space;
pub mod component;
pub mod contract;
pub mod descriptor;
pub mod error;
pub mod feature;
pub mod names;
pub mod registry;

pub use code_space::{CodeSpace, Factory, LayeredCodeSpace, TypeCatalog, TypeDef, TypeKind};
pub use component::{Component, MethodSignature};
pub use contract::{Contract, ContractMethod, DefaultMethod};
pub use descriptor::{DESCRIPTOR_PACKAGE, Descriptor, ExposureBinding, ExposureKind};
pub use error::{CoreError, CoreResult};
pub use feature::FeatureSpec;
pub use names::TypeName;
pub use registry::{Registry, Supplier};
