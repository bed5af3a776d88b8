//! Where the engine looks for generated descriptors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use featurelink_core::{Descriptor, FeatureSpec, TypeName};
use tracing::{debug, warn};

use crate::error::{IntegrationError, IntegrationResult};

/// Looks up generated descriptors by type name (`generated.<Name>Descriptor`).
pub trait DescriptorSource: Send + Sync {
    /// `None` if this source has no such descriptor; `Some(Err(_))` if it
    /// has one that could not be read.
    fn lookup(&self, type_name: &str) -> Option<IntegrationResult<Descriptor>>;
}

/// Reads descriptor metadata written by the generator, one TOML file per
/// descriptor at `<root>/generated/<Name>Descriptor.toml`.
#[derive(Debug, Clone)]
pub struct MetadataDirectory {
    root: PathBuf,
}

impl MetadataDirectory {
    /// Read descriptors under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The metadata root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the metadata file for `type_name`.
    #[must_use]
    pub fn path_for(&self, type_name: &TypeName) -> PathBuf {
        self.root.join(type_name.relative_path("toml"))
    }
}

impl DescriptorSource for MetadataDirectory {
    fn lookup(&self, type_name: &str) -> Option<IntegrationResult<Descriptor>> {
        let name = TypeName::new(type_name).ok()?;
        let path = self.path_for(&name);
        if !path.is_file() {
            return None;
        }
        let read = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| Descriptor::from_toml(&text).map_err(|e| e.to_string()));
        Some(read.map_err(|message| IntegrationError::Descriptor {
            candidate: type_name.to_string(),
            message,
        }))
    }
}

/// Descriptors compiled into the host, registered by type name.
#[derive(Debug, Clone, Default)]
pub struct StaticDescriptors {
    descriptors: HashMap<String, Descriptor>,
}

impl StaticDescriptors {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its type name.
    #[must_use]
    pub fn with(mut self, type_name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.descriptors.insert(type_name.into(), descriptor);
        self
    }

    /// Register a descriptor under its type name.
    pub fn insert(&mut self, type_name: impl Into<String>, descriptor: Descriptor) {
        self.descriptors.insert(type_name.into(), descriptor);
    }
}

impl DescriptorSource for StaticDescriptors {
    fn lookup(&self, type_name: &str) -> Option<IntegrationResult<Descriptor>> {
        self.descriptors.get(type_name).cloned().map(Ok)
    }
}

/// Probe `sources` for each of the feature's descriptor candidates in order.
///
/// An unreadable candidate is logged and treated as absent; probing goes on
/// with the next candidate.
#[must_use]
pub fn find_descriptor(
    sources: &[Arc<dyn DescriptorSource>],
    feature: &FeatureSpec,
) -> Option<(String, Descriptor)> {
    for candidate in feature.descriptor_candidates() {
        for source in sources {
            match source.lookup(&candidate) {
                None => {},
                Some(Ok(descriptor)) => {
                    debug!(feature = %feature.source, candidate, "Found generated descriptor");
                    return Some((candidate, descriptor));
                },
                Some(Err(e)) => {
                    warn!(feature = %feature.source, candidate, error = %e, "Failed reading descriptor");
                },
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, name: &str, body: &str) {
        let dir = root.join("generated");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{name}.toml")), body).unwrap();
    }

    #[test]
    fn reads_metadata_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "BillingDescriptor",
            "artifact_location = \"feat.wasm\"\npackages = [\"a.billing\"]\nexposed_types = []\n",
        );
        let source = MetadataDirectory::new(dir.path());

        let found = source.lookup("generated.BillingDescriptor").unwrap().unwrap();
        assert_eq!(found.artifact(), Some("feat.wasm"));
        assert!(source.lookup("generated.OtherDescriptor").is_none());
    }

    #[test]
    fn unreadable_candidate_falls_through_to_next() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "RepoDescriptor", "packages = 3");
        write(dir.path(), "BillingDescriptor", "exposed_types = [\"a.billing.Api\"]");
        let sources: Vec<Arc<dyn DescriptorSource>> =
            vec![Arc::new(MetadataDirectory::new(dir.path()))];
        let feature = FeatureSpec::new("https://example/repo.git").with_package("a.billing");

        let (candidate, descriptor) = find_descriptor(&sources, &feature).unwrap();
        assert_eq!(candidate, "generated.BillingDescriptor");
        assert!(descriptor.exposed_types.contains("a.billing.Api"));
    }

    #[test]
    fn sources_are_consulted_in_order() {
        let first = StaticDescriptors::new().with(
            "generated.RepoDescriptor",
            Descriptor::from_static(Some("first.wasm"), &[], &[]),
        );
        let second = StaticDescriptors::new().with(
            "generated.RepoDescriptor",
            Descriptor::from_static(Some("second.wasm"), &[], &[]),
        );
        let sources: Vec<Arc<dyn DescriptorSource>> = vec![Arc::new(first), Arc::new(second)];

        let (_, descriptor) =
            find_descriptor(&sources, &FeatureSpec::new("https://example/repo.git")).unwrap();
        assert_eq!(descriptor.artifact(), Some("first.wasm"));
        assert!(find_descriptor(&sources, &FeatureSpec::new("elsewhere")).is_none());
    }
}
