//! The integration engine.
//!
//! Features are integrated one at a time, in configuration order. Each is
//! run through an ordered chain of strategies; the first that applies
//! integrates the feature:
//!
//! 1. [`IntegrationPath::DescriptorArtifact`]: a descriptor names an
//!    artifact. It is loaded into its own isolation unit, a nested registry
//!    is built over it, and the descriptor's exposed types are published to
//!    the host.
//! 2. [`IntegrationPath::DescriptorTypes`]: a descriptor names exposed types
//!    but no artifact. The types are taken from the host's own code space.
//! 3. [`IntegrationPath::CompiledOutput`]: no descriptor. The feature is
//!    fetched and its compiled output is copied into the host's. Nothing is
//!    exposed; the types are reachable by package scanning only.
//! 4. [`IntegrationPath::BuildAndIsolate`]: the fetched feature is built and
//!    loaded into an isolation unit. Nothing is exposed.
//!
//! Failure of one feature is logged and recorded in the report; the next
//! feature is processed regardless.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use featurelink_config::Config;
use featurelink_core::{
    CodeSpace, Descriptor, ExposureBinding, FeatureSpec, Registry,
};
use featurelink_toolchain::{BuildCommand, Builder, CommandBuilder, Fetcher, GitFetcher};
use tracing::{debug, error, info, warn};

use crate::descriptors::{DescriptorSource, MetadataDirectory, find_descriptor};
use crate::error::{IntegrationError, IntegrationResult};
use crate::exposure::expose;
use crate::fast_path::copy_compiled_output;
use crate::isolation::{IsolatedCodeSpace, IsolationLoader, IsolationUnit};
use crate::teardown::{FeatureScope, TeardownTracker};
use crate::wasm::{WasmLimits, WasmLoader};

/// Paths and limits the engine works with.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base for relative artifact locations.
    pub working_dir: PathBuf,
    /// Timeout for building a feature.
    pub build_timeout: Duration,
    /// Compiled output inside a fetched feature workspace.
    pub feature_output_dir: PathBuf,
    /// The host's compiled output, which the fast path copies into.
    pub host_output_dir: PathBuf,
    /// Extension of compiled units.
    pub compiled_extension: String,
}

impl EngineSettings {
    /// Defaults rooted at `working_dir`.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            host_output_dir: working_dir.join("target/featurelink/components"),
            working_dir,
            build_timeout: Duration::from_secs(300),
            feature_output_dir: PathBuf::from("target/featurelink/components"),
            compiled_extension: "wasm".to_string(),
        }
    }

    /// Settings from the `[runtime]` section, with relative host paths
    /// resolved against `working_dir`.
    #[must_use]
    pub fn from_config(config: &Config, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        let runtime = &config.runtime;
        Self {
            host_output_dir: working_dir.join(&runtime.host_output_dir),
            working_dir,
            build_timeout: Duration::from_secs(runtime.build_timeout_secs),
            feature_output_dir: runtime.feature_output_dir.clone(),
            compiled_extension: runtime.compiled_extension.clone(),
        }
    }
}

/// Convert a configured feature entry into a [`FeatureSpec`].
#[must_use]
pub fn feature_spec(entry: &featurelink_config::FeatureEntry) -> FeatureSpec {
    entry
        .packages
        .iter()
        .fold(
            FeatureSpec::new(entry.source.clone()).with_branch(entry.branch.clone()),
            |spec, package| spec.with_package(package.clone()),
        )
}

/// Convert the `[build]` section into a [`BuildCommand`].
#[must_use]
pub fn build_command(config: &Config) -> BuildCommand {
    BuildCommand::from(&config.build)
}

/// Which strategy integrated a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationPath {
    /// Descriptor with an artifact, loaded in isolation and exposed.
    DescriptorArtifact,
    /// Descriptor with exposed types only, taken from the host's code.
    DescriptorTypes,
    /// Compiled output copied into the host's.
    CompiledOutput,
    /// Built from source and loaded in isolation.
    BuildAndIsolate,
}

impl IntegrationPath {
    /// Strategies in the order they are tried.
    pub const ORDER: [Self; 4] = [
        Self::DescriptorArtifact,
        Self::DescriptorTypes,
        Self::CompiledOutput,
        Self::BuildAndIsolate,
    ];
}

impl std::fmt::Display for IntegrationPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::DescriptorArtifact => "descriptor-artifact",
            Self::DescriptorTypes => "descriptor-types",
            Self::CompiledOutput => "compiled-output",
            Self::BuildAndIsolate => "build-and-isolate",
        })
    }
}

/// What happened to one feature.
#[derive(Debug, Clone)]
pub enum FeatureOutcome {
    /// The feature is live.
    Integrated {
        /// Strategy that applied.
        path: IntegrationPath,
        /// Host bindings created for it.
        bindings: Vec<ExposureBinding>,
    },
    /// The feature was skipped.
    Failed {
        /// Rendered cause.
        error: String,
    },
}

/// Per-feature record of one integration run.
#[derive(Debug, Clone)]
pub struct FeatureReport {
    /// The feature's source location.
    pub source: String,
    /// Outcome.
    pub outcome: FeatureOutcome,
}

/// Result of [`IntegrationEngine::integrate`], for observability only.
#[derive(Debug, Clone, Default)]
pub struct IntegrationReport {
    /// One entry per processed feature, in order.
    pub features: Vec<FeatureReport>,
}

impl IntegrationReport {
    /// Number of features integrated.
    #[must_use]
    pub fn integrated(&self) -> usize {
        self.features
            .iter()
            .filter(|f| matches!(f.outcome, FeatureOutcome::Integrated { .. }))
            .count()
    }

    /// Number of features skipped.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.features.len().saturating_sub(self.integrated())
    }

    /// Every host binding created in this run.
    pub fn bindings(&self) -> impl Iterator<Item = &ExposureBinding> {
        self.features.iter().flat_map(|f| match &f.outcome {
            FeatureOutcome::Integrated { bindings, .. } => bindings.as_slice(),
            FeatureOutcome::Failed { .. } => &[],
        })
    }
}

enum Attempt {
    Integrated(Vec<ExposureBinding>),
    NotApplicable,
}

/// Lazily computed inputs shared by the strategies of one feature.
struct Resolution<'a> {
    feature: &'a FeatureSpec,
    descriptor: Option<(String, Descriptor)>,
    workspace: Option<PathBuf>,
}

/// Integrates configured features into a host registry.
pub struct IntegrationEngine {
    settings: EngineSettings,
    descriptor_sources: Vec<Arc<dyn DescriptorSource>>,
    fetcher: Arc<dyn Fetcher>,
    builder: Arc<dyn Builder>,
    loader: Arc<dyn IsolationLoader>,
    tracker: TeardownTracker,
}

impl std::fmt::Debug for IntegrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationEngine")
            .field("settings", &self.settings)
            .field("descriptor_sources", &self.descriptor_sources.len())
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl IntegrationEngine {
    /// Create an engine from its collaborators. Descriptor sources are added
    /// with [`with_descriptor_source`](Self::with_descriptor_source).
    #[must_use]
    pub fn new(
        settings: EngineSettings,
        fetcher: Arc<dyn Fetcher>,
        builder: Arc<dyn Builder>,
        loader: Arc<dyn IsolationLoader>,
    ) -> Self {
        Self {
            settings,
            descriptor_sources: Vec::new(),
            fetcher,
            builder,
            loader,
            tracker: TeardownTracker::new(),
        }
    }

    /// An engine wired from configuration: git fetching into the cache dir,
    /// the configured build command, WASM isolation, and the metadata
    /// directory as descriptor source.
    #[must_use]
    pub fn from_config(config: &Config, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        let runtime = &config.runtime;
        let limits = WasmLimits {
            call_timeout: Duration::from_secs(runtime.call_timeout_secs),
            memory_max_pages: runtime.memory_max_pages,
        };
        let metadata = MetadataDirectory::new(working_dir.join(&runtime.metadata_dir));
        Self::new(
            EngineSettings::from_config(config, working_dir),
            Arc::new(GitFetcher::new(runtime.cache_dir())),
            Arc::new(CommandBuilder::new(build_command(config))),
            Arc::new(WasmLoader::new(limits)),
        )
        .with_descriptor_source(Arc::new(metadata))
    }

    /// Probe `source` for descriptors after the sources already added.
    #[must_use]
    pub fn with_descriptor_source(mut self, source: Arc<dyn DescriptorSource>) -> Self {
        self.descriptor_sources.push(source);
        self
    }

    /// The engine's settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Resources awaiting teardown.
    #[must_use]
    pub fn tracker(&self) -> &TeardownTracker {
        &self.tracker
    }

    /// Integrate the configured features, unless the subsystem is disabled.
    pub async fn integrate_configured(&self, host: &Arc<Registry>, config: &Config) -> IntegrationReport {
        let section = &config.featurelink;
        if !section.enabled {
            debug!("Feature integration disabled");
            return IntegrationReport::default();
        }
        let features: Vec<FeatureSpec> = section.features.iter().map(feature_spec).collect();
        self.integrate(host, &features).await
    }

    /// Integrate `features` into `host`, in order. Never fails; each
    /// feature's outcome is in the report.
    pub async fn integrate(&self, host: &Arc<Registry>, features: &[FeatureSpec]) -> IntegrationReport {
        let mut report = IntegrationReport::default();
        for feature in features {
            info!(feature = %feature.source, "Processing feature");
            let outcome = match self.integrate_one(host, feature).await {
                Ok((path, bindings)) => {
                    info!(
                        feature = %feature.source,
                        path = %path,
                        bindings = bindings.len(),
                        "Feature integrated"
                    );
                    FeatureOutcome::Integrated { path, bindings }
                },
                Err(e) => {
                    error!(feature = %feature.source, error = %e, "Failed to integrate feature");
                    FeatureOutcome::Failed {
                        error: e.to_string(),
                    }
                },
            };
            report.features.push(FeatureReport {
                source: feature.source.clone(),
                outcome,
            });
        }
        report
    }

    /// Close every nested registry created so far, then every isolation unit.
    pub fn shutdown(&self) {
        self.tracker.shutdown();
    }

    async fn integrate_one(
        &self,
        host: &Arc<Registry>,
        feature: &FeatureSpec,
    ) -> IntegrationResult<(IntegrationPath, Vec<ExposureBinding>)> {
        let mut resolution = Resolution {
            feature,
            descriptor: find_descriptor(&self.descriptor_sources, feature),
            workspace: None,
        };
        for path in IntegrationPath::ORDER {
            match self.attempt(path, host, &mut resolution).await? {
                Attempt::Integrated(bindings) => return Ok((path, bindings)),
                Attempt::NotApplicable => {},
            }
        }
        // BuildAndIsolate always applies.
        Err(IntegrationError::Resolution(format!(
            "no strategy applied to {}",
            feature.source
        )))
    }

    async fn attempt(
        &self,
        path: IntegrationPath,
        host: &Arc<Registry>,
        resolution: &mut Resolution<'_>,
    ) -> IntegrationResult<Attempt> {
        match path {
            IntegrationPath::DescriptorArtifact => self.from_descriptor_artifact(host, resolution),
            IntegrationPath::DescriptorTypes => self.from_descriptor_types(host, resolution),
            IntegrationPath::CompiledOutput => self.from_compiled_output(host, resolution).await,
            IntegrationPath::BuildAndIsolate => self.build_and_isolate(host, resolution).await,
        }
    }

    fn from_descriptor_artifact(
        &self,
        host: &Arc<Registry>,
        resolution: &Resolution<'_>,
    ) -> IntegrationResult<Attempt> {
        let Some((candidate, descriptor)) = &resolution.descriptor else {
            return Ok(Attempt::NotApplicable);
        };
        let Some(location) = descriptor.artifact() else {
            return Ok(Attempt::NotApplicable);
        };
        let source = &resolution.feature.source;
        info!(feature = %source, descriptor = %candidate, artifact = location, "Found generated descriptor");

        let artifact = self.resolve_artifact(host, location)?;
        let mut scope = FeatureScope::new(source.clone());
        let unit = self.loader.load(&artifact)?;
        scope.adopt_unit(Arc::clone(&unit));

        let code_space = isolated_code_space(&unit, host);
        let nested = Registry::nested(registry_name(source), Arc::clone(host), code_space);
        scope.adopt_registry(Arc::clone(&nested));
        populate(&nested, &descriptor.packages, &descriptor.exposed_types)?;

        let exposed: Vec<&str> = descriptor.exposed_types.iter().map(String::as_str).collect();
        let bindings = expose(host, &nested, &exposed);
        scope.commit(&self.tracker);
        Ok(Attempt::Integrated(bindings))
    }

    fn from_descriptor_types(
        &self,
        host: &Arc<Registry>,
        resolution: &Resolution<'_>,
    ) -> IntegrationResult<Attempt> {
        let Some((candidate, descriptor)) = &resolution.descriptor else {
            return Ok(Attempt::NotApplicable);
        };
        if descriptor.exposed_types.is_empty() {
            return Ok(Attempt::NotApplicable);
        }
        let source = &resolution.feature.source;
        info!(feature = %source, descriptor = %candidate, "Registering descriptor types from host code");

        let mut scope = FeatureScope::new(source.clone());
        let nested = Registry::nested(
            registry_name(source),
            Arc::clone(host),
            Arc::clone(host.code_space()),
        );
        scope.adopt_registry(Arc::clone(&nested));
        populate(&nested, &descriptor.packages, &descriptor.exposed_types)?;

        let exposed: Vec<&str> = descriptor.exposed_types.iter().map(String::as_str).collect();
        let bindings = expose(host, &nested, &exposed);
        scope.commit(&self.tracker);
        Ok(Attempt::Integrated(bindings))
    }

    async fn fetched<'r>(&self, resolution: &'r mut Resolution<'_>) -> IntegrationResult<&'r Path> {
        if resolution.workspace.is_none() {
            let feature = resolution.feature;
            info!(feature = %feature.source, "No descriptor found, fetching feature");
            let workspace = self
                .fetcher
                .fetch(&feature.source, &feature.branch)
                .await
                .map_err(IntegrationError::Fetch)?;
            resolution.workspace = Some(workspace);
        }
        resolution
            .workspace
            .as_deref()
            .ok_or_else(|| IntegrationError::Resolution("feature workspace missing".to_string()))
    }

    async fn from_compiled_output(
        &self,
        host: &Arc<Registry>,
        resolution: &mut Resolution<'_>,
    ) -> IntegrationResult<Attempt> {
        let feature = resolution.feature;
        let workspace = self.fetched(resolution).await?;
        let requested = feature.requested_packages();
        let Some(copied) = copy_compiled_output(
            &workspace.join(&self.settings.feature_output_dir),
            &self.settings.host_output_dir,
            &self.settings.compiled_extension,
            &requested,
        ) else {
            return Ok(Attempt::NotApplicable);
        };

        let packages: Vec<String> = if requested.is_empty() {
            copied.into_iter().collect()
        } else {
            requested
        };
        let mut scope = FeatureScope::new(feature.source.clone());
        let nested = Registry::nested(
            registry_name(&feature.source),
            Arc::clone(host),
            Arc::clone(host.code_space()),
        );
        scope.adopt_registry(Arc::clone(&nested));
        let bound = nested.scan(&packages)?;
        nested.refresh()?;
        info!(
            feature = %feature.source,
            packages = ?packages,
            bound,
            "Compiled output shared with host"
        );
        scope.commit(&self.tracker);
        Ok(Attempt::Integrated(Vec::new()))
    }

    async fn build_and_isolate(
        &self,
        host: &Arc<Registry>,
        resolution: &mut Resolution<'_>,
    ) -> IntegrationResult<Attempt> {
        let feature = resolution.feature;
        let workspace = self.fetched(resolution).await?.to_path_buf();
        let artifact = self
            .builder
            .build(&workspace, self.settings.build_timeout)
            .await
            .map_err(IntegrationError::Build)?;

        let mut scope = FeatureScope::new(feature.source.clone());
        let unit = self.loader.load(&artifact)?;
        scope.adopt_unit(Arc::clone(&unit));

        let requested = feature.requested_packages();
        let packages = if requested.is_empty() {
            unit.packages()
        } else {
            requested
        };
        let code_space = isolated_code_space(&unit, host);
        let nested = Registry::nested(registry_name(&feature.source), Arc::clone(host), code_space);
        scope.adopt_registry(Arc::clone(&nested));
        let bound = nested.scan(&packages)?;
        nested.refresh()?;
        info!(
            feature = %feature.source,
            artifact = %artifact.display(),
            bound,
            "Feature built and loaded in isolation"
        );
        scope.commit(&self.tracker);
        Ok(Attempt::Integrated(Vec::new()))
    }

    /// Absolute path, else relative to the working directory, else a
    /// resource of the host's code space.
    fn resolve_artifact(&self, host: &Registry, location: &str) -> IntegrationResult<PathBuf> {
        let path = Path::new(location);
        if path.is_absolute() && path.exists() {
            return Ok(path.to_path_buf());
        }
        let relative = self.settings.working_dir.join(path);
        if relative.exists() {
            return Ok(relative);
        }
        if let Some(resource) = host.code_space().resource(location) {
            return Ok(resource);
        }
        warn!(artifact = location, "Artifact location does not exist");
        Err(IntegrationError::Resolution(location.to_string()))
    }
}

fn registry_name(source: &str) -> String {
    format!("feature:{source}")
}

/// The unit's own types, with names the unit lacks resolved by the host.
fn isolated_code_space(unit: &Arc<dyn IsolationUnit>, host: &Registry) -> Arc<dyn CodeSpace> {
    Arc::new(IsolatedCodeSpace::new(
        Arc::clone(unit),
        Arc::clone(host.code_space()),
    ))
}

/// Scan `packages` when there are any; otherwise register `types` directly.
/// Every binding is instantiated eagerly.
fn populate(
    nested: &Registry,
    packages: &std::collections::BTreeSet<String>,
    types: &std::collections::BTreeSet<String>,
) -> IntegrationResult<()> {
    if packages.is_empty() {
        for type_name in types {
            nested.register_type(type_name)?;
        }
    } else {
        let packages: Vec<&str> = packages.iter().map(String::as_str).collect();
        nested.scan(&packages)?;
    }
    nested.refresh()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use featurelink_config::FeatureEntry;
    use featurelink_core::TypeCatalog;

    use super::*;

    #[test]
    fn report_counts() {
        let report = IntegrationReport {
            features: vec![
                FeatureReport {
                    source: "a".into(),
                    outcome: FeatureOutcome::Integrated {
                        path: IntegrationPath::DescriptorTypes,
                        bindings: vec![ExposureBinding {
                            binding_name: "service".into(),
                            source_type: "x.Service".into(),
                            kind: featurelink_core::ExposureKind::Interface,
                        }],
                    },
                },
                FeatureReport {
                    source: "b".into(),
                    outcome: FeatureOutcome::Failed {
                        error: "boom".into(),
                    },
                },
            ],
        };
        assert_eq!(report.integrated(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.bindings().count(), 1);
    }

    #[test]
    fn config_entries_become_feature_specs() {
        let mut entry = FeatureEntry::new("https://example/billing.git");
        entry.branch = "develop".into();
        entry.packages = vec!["a.billing".into(), "a.shared".into()];

        let spec = feature_spec(&entry);
        assert_eq!(spec.branch, "develop");
        assert_eq!(spec.requested_packages(), ["a.billing", "a.shared"]);
    }

    #[test]
    fn settings_resolve_host_paths_against_working_dir() {
        let config = Config::default();
        let settings = EngineSettings::from_config(&config, "/srv/host");
        assert_eq!(
            settings.host_output_dir,
            Path::new("/srv/host/target/featurelink/components")
        );
        assert_eq!(settings.build_timeout, Duration::from_secs(300));
        assert_eq!(build_command(&config), BuildCommand::default());
    }

    #[test]
    fn artifact_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let resources = dir.path().join("resources");
        std::fs::create_dir_all(&resources).unwrap();
        std::fs::write(dir.path().join("local.wasm"), b"").unwrap();
        std::fs::write(resources.join("bundled.wasm"), b"").unwrap();

        let host = Registry::root(
            "host",
            Arc::new(TypeCatalog::new("host").with_resource_root(&resources)),
        );
        let engine = IntegrationEngine::from_config(&Config::default(), dir.path());

        let absolute = dir.path().join("local.wasm");
        assert_eq!(
            engine.resolve_artifact(&host, absolute.to_str().unwrap()).unwrap(),
            absolute
        );
        assert_eq!(
            engine.resolve_artifact(&host, "local.wasm").unwrap(),
            dir.path().join("local.wasm")
        );
        assert_eq!(
            engine.resolve_artifact(&host, "bundled.wasm").unwrap(),
            resources.join("bundled.wasm")
        );
        assert!(matches!(
            engine.resolve_artifact(&host, "missing.wasm"),
            Err(IntegrationError::Resolution(_))
        ));
    }
}
