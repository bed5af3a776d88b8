//! Isolation units: code loaded from one artifact, owned by one feature.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use featurelink_core::{CodeSpace, TypeDef, TypeName};

use crate::error::IntegrationResult;

/// The types loaded from one artifact.
///
/// A unit belongs to exactly one feature and lives until that feature is
/// torn down. Closing it releases everything tied to the artifact's code;
/// components created from it stop working afterwards.
pub trait IsolationUnit: CodeSpace {
    /// The artifact this unit was loaded from.
    fn artifact(&self) -> &Path;

    /// Packages the unit declares types in.
    fn packages(&self) -> Vec<String>;

    /// Release the loaded code. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if resources could not be released cleanly.
    fn close(&self) -> IntegrationResult<()>;
}

/// Constructs isolation units from artifact files.
pub trait IsolationLoader: Send + Sync {
    /// Load `artifact` into a fresh unit.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError::Isolation`](crate::IntegrationError::Isolation)
    /// if the artifact cannot be loaded.
    fn load(&self, artifact: &Path) -> IntegrationResult<Arc<dyn IsolationUnit>>;
}

/// The code source of a registry built over an isolation unit.
///
/// Names resolve against the unit first and then the host, so contracts the
/// host declares are usable. Candidates for instantiation (package scans and
/// contract implementors) come from the unit alone.
pub struct IsolatedCodeSpace {
    unit: Arc<dyn IsolationUnit>,
    host: Arc<dyn CodeSpace>,
}

impl IsolatedCodeSpace {
    /// `unit`'s types, with names falling back to `host`.
    #[must_use]
    pub fn new(unit: Arc<dyn IsolationUnit>, host: Arc<dyn CodeSpace>) -> Self {
        Self { unit, host }
    }
}

impl std::fmt::Debug for IsolatedCodeSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedCodeSpace")
            .field("unit", &self.unit.label())
            .field("host", &self.host.label())
            .finish()
    }
}

impl CodeSpace for IsolatedCodeSpace {
    fn label(&self) -> String {
        format!("{} > {}", self.unit.label(), self.host.label())
    }

    fn resolve(&self, name: &TypeName) -> Option<TypeDef> {
        self.unit.resolve(name).or_else(|| self.host.resolve(name))
    }

    fn types_in_package(&self, package: &str) -> Vec<TypeDef> {
        self.unit.types_in_package(package)
    }

    fn implementors(&self, contract: &TypeName) -> Vec<TypeDef> {
        self.unit.implementors(contract)
    }

    fn resource(&self, location: &str) -> Option<PathBuf> {
        self.unit
            .resource(location)
            .or_else(|| self.host.resource(location))
    }
}
