//! Descriptor model shared by the generator (producer) and the engine (consumer).

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Package that generated descriptor types live in.
pub const DESCRIPTOR_PACKAGE: &str = "generated";

/// Precomputed metadata for one feature.
///
/// When `artifact_location` is absent the exposed types must already be
/// resolvable in the host's own code space. A non-empty `exposed_types`
/// is authoritative over what the host sees; `packages` drive component
/// discovery when `exposed_types` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Path of the built artifact (absolute, working-dir relative, or a resource).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<String>,
    /// Packages to scan.
    #[serde(default)]
    pub packages: BTreeSet<String>,
    /// Fully-qualified names of the types to expose to the host.
    #[serde(default)]
    pub exposed_types: BTreeSet<String>,
}

impl Descriptor {
    /// The artifact location, if present and not blank.
    #[must_use]
    pub fn artifact(&self) -> Option<&str> {
        self.artifact_location
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Parse a descriptor from its TOML metadata form.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the document is malformed.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Render the TOML metadata form.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Render a Rust source declaring `<feature>Descriptor` with the three
    /// well-known associated constants.
    #[must_use]
    pub fn to_rust_source(&self, feature_name: &str) -> String {
        let type_name = format!("{feature_name}Descriptor");
        let mut out = String::new();
        let _ = writeln!(out, "// @generated by featurelink. Do not edit.");
        let _ = writeln!(out);
        let _ = writeln!(out, "/// Descriptor for the `{feature_name}` feature.");
        let _ = writeln!(out, "pub struct {type_name};");
        let _ = writeln!(out);
        let _ = writeln!(out, "impl {type_name} {{");
        match self.artifact() {
            Some(location) => {
                let _ = writeln!(out, "    /// Path relative to the project root.");
                let _ = writeln!(
                    out,
                    "    pub const ARTIFACT_LOCATION: Option<&'static str> = Some({location:?});"
                );
            },
            None => {
                let _ = writeln!(
                    out,
                    "    pub const ARTIFACT_LOCATION: Option<&'static str> = None;"
                );
            },
        }
        let _ = writeln!(
            out,
            "    pub const PACKAGES: &'static [&'static str] = &[{}];",
            quoted_list(&self.packages)
        );
        let _ = writeln!(
            out,
            "    pub const EXPOSED_TYPES: &'static [&'static str] = &[{}];",
            quoted_list(&self.exposed_types)
        );
        let _ = writeln!(out, "}}");
        out
    }

    /// Build a descriptor from the constants of a compiled-in generated type.
    #[must_use]
    pub fn from_static(
        artifact_location: Option<&str>,
        packages: &[&str],
        exposed_types: &[&str],
    ) -> Self {
        Self {
            artifact_location: artifact_location.map(str::to_string),
            packages: packages.iter().map(|s| (*s).to_string()).collect(),
            exposed_types: exposed_types.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

fn quoted_list(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// How an exposed type is published to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureKind {
    /// A forwarding proxy implementing a contract.
    Interface,
    /// The nested instance itself.
    Concrete,
}

/// A type published into the host registry. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureBinding {
    /// Name the binding is registered under in the host.
    pub binding_name: String,
    /// Fully-qualified name of the exposed type.
    pub source_type: String,
    /// Proxy or direct instance.
    pub kind: ExposureKind,
}
