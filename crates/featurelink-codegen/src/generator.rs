//! The descriptor generator.
//!
//! Runs once per build over the configured features, in order. For each
//! feature it clones the source into a throwaway workspace, scans it,
//! derives the feature name, builds it, copies the artifact next to the
//! host and writes the descriptor. A [`GenerationContext`] carries the
//! per-run bookkeeping that makes repeated sources and repeated names
//! no-ops.

use std::collections::{BTreeSet, HashSet};
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use featurelink_config::Config;
use featurelink_core::feature::descriptor_type_name;
use featurelink_core::{Descriptor, FeatureSpec};
use featurelink_toolchain::{BuildCommand, Builder, CommandBuilder, Fetcher, GitFetcher};
use tracing::{error, info, warn};

use crate::error::CodegenResult;
use crate::naming::feature_name;
use crate::scanner::{SourceDialect, SourceScanner};
use crate::sink::{DirectorySink, GeneratedSink};
use crate::writer::{DescriptorWriter, WrittenDescriptor};

/// Paths and limits for one generator.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// The host project; relative output paths resolve against it.
    pub project_root: PathBuf,
    /// Source root inside a fetched feature.
    pub source_root: PathBuf,
    /// Where scanned sources are regenerated.
    pub generated_sources_dir: PathBuf,
    /// Where descriptor metadata is written.
    pub metadata_dir: PathBuf,
    /// Where artifacts are copied, relative to `project_root`. Descriptors
    /// record artifact locations under this path.
    pub artifact_output_dir: PathBuf,
    /// Timeout for each feature build.
    pub build_timeout: Duration,
    /// Extension given to copied artifacts.
    pub artifact_extension: String,
}

impl GeneratorSettings {
    /// Defaults rooted at `project_root`.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self::from_config(&Config::default(), project_root)
    }

    /// Settings from the `[codegen]` and `[build]` sections.
    #[must_use]
    pub fn from_config(config: &Config, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let codegen = &config.codegen;
        Self {
            source_root: codegen.source_root.clone(),
            generated_sources_dir: project_root.join(&codegen.generated_sources_dir),
            metadata_dir: project_root.join(&codegen.metadata_dir),
            artifact_output_dir: codegen.artifact_output_dir.clone(),
            build_timeout: Duration::from_secs(codegen.build_timeout_secs),
            artifact_extension: config.build.artifact_extension.trim_start_matches('.').to_string(),
            project_root,
        }
    }
}

/// Per-run deduplication state.
///
/// Pass the same context to every [`DescriptorGenerator::generate`] call of
/// one build.
#[derive(Debug, Default)]
pub struct GenerationContext {
    processed_sources: HashSet<String>,
    generated_names: HashSet<String>,
}

impl GenerationContext {
    /// A fresh run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `source`; `false` if it was already processed.
    pub fn mark_source(&mut self, source: &str) -> bool {
        self.processed_sources.insert(source.to_string())
    }

    /// Claim descriptor `type_name`; `false` if it was already generated.
    pub fn claim_name(&mut self, type_name: &str) -> bool {
        self.generated_names.insert(type_name.to_string())
    }

    /// Whether `source` was processed in this run.
    #[must_use]
    pub fn is_processed(&self, source: &str) -> bool {
        self.processed_sources.contains(source)
    }
}

/// What happened to one feature.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    /// A descriptor was written.
    Generated {
        /// The descriptor.
        descriptor: Descriptor,
        /// Where it was written.
        written: WrittenDescriptor,
    },
    /// The source was already processed in this run.
    DuplicateSource,
    /// Another feature already produced this descriptor name.
    DuplicateName {
        /// The contested descriptor type name.
        type_name: String,
    },
    /// Generation failed.
    Failed {
        /// Rendered cause.
        error: String,
    },
}

/// Per-feature record of one generation run.
#[derive(Debug, Clone)]
pub struct FeatureGeneration {
    /// The feature's source location.
    pub source: String,
    /// Outcome.
    pub outcome: GenerationOutcome,
}

/// Result of [`DescriptorGenerator::generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    /// One entry per processed feature, in order.
    pub features: Vec<FeatureGeneration>,
}

impl GenerationReport {
    /// Descriptors written in this run.
    pub fn descriptors(&self) -> impl Iterator<Item = (&WrittenDescriptor, &Descriptor)> {
        self.features.iter().filter_map(|f| match &f.outcome {
            GenerationOutcome::Generated {
                descriptor,
                written,
            } => Some((written, descriptor)),
            _ => None,
        })
    }

    /// Number of features that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.features
            .iter()
            .filter(|f| matches!(f.outcome, GenerationOutcome::Failed { .. }))
            .count()
    }
}

/// Generates descriptors for configured features.
pub struct DescriptorGenerator {
    settings: GeneratorSettings,
    scanner: SourceScanner,
    fetcher: Arc<dyn Fetcher>,
    builder: Arc<dyn Builder>,
    sink: Arc<dyn GeneratedSink>,
    writer: DescriptorWriter,
}

impl std::fmt::Debug for DescriptorGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorGenerator")
            .field("settings", &self.settings)
            .field("scanner", &self.scanner)
            .finish_non_exhaustive()
    }
}

impl DescriptorGenerator {
    /// A generator writing sources to the settings' generated-sources
    /// directory.
    #[must_use]
    pub fn new(
        settings: GeneratorSettings,
        scanner: SourceScanner,
        fetcher: Arc<dyn Fetcher>,
        builder: Arc<dyn Builder>,
    ) -> Self {
        let sink = Arc::new(DirectorySink::new(
            &settings.generated_sources_dir,
            scanner.dialect().extension(),
        ));
        let writer = DescriptorWriter::new(&settings.metadata_dir);
        Self {
            settings,
            scanner,
            fetcher,
            builder,
            sink,
            writer,
        }
    }

    /// A generator wired from configuration: git cloning, the configured
    /// build command and scanner dialect.
    ///
    /// # Errors
    ///
    /// Returns an error if a scanner pattern does not compile.
    pub fn from_config(config: &Config, project_root: impl Into<PathBuf>) -> CodegenResult<Self> {
        let scanner = SourceScanner::new(SourceDialect::from_section(&config.scanner)?);
        Ok(Self::new(
            GeneratorSettings::from_config(config, project_root),
            scanner,
            Arc::new(GitFetcher::new(config.runtime.cache_dir())),
            Arc::new(CommandBuilder::new(BuildCommand::from(&config.build))),
        ))
    }

    /// Regenerate sources into `sink` instead.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn GeneratedSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The generator's settings.
    #[must_use]
    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Generate descriptors for `features`, in order. Never fails; each
    /// feature's outcome is in the report.
    pub async fn generate(
        &self,
        ctx: &mut GenerationContext,
        features: &[FeatureSpec],
    ) -> GenerationReport {
        let mut report = GenerationReport::default();
        for feature in features {
            let outcome = match self.generate_one(ctx, feature).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(feature = %feature.source, error = %e, "Failed processing feature");
                    GenerationOutcome::Failed {
                        error: e.to_string(),
                    }
                },
            };
            report.features.push(FeatureGeneration {
                source: feature.source.clone(),
                outcome,
            });
        }
        report
    }

    async fn generate_one(
        &self,
        ctx: &mut GenerationContext,
        feature: &FeatureSpec,
    ) -> CodegenResult<GenerationOutcome> {
        if !ctx.mark_source(&feature.source) {
            info!(feature = %feature.source, "Source already processed in this run, skipping");
            return Ok(GenerationOutcome::DuplicateSource);
        }

        let workspace = tempfile::Builder::new()
            .prefix("featurelink-feature-")
            .tempdir()?;
        let outcome = self.generate_in(ctx, feature, workspace.path()).await;

        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove feature workspace");
        }
        outcome
    }

    async fn generate_in(
        &self,
        ctx: &mut GenerationContext,
        feature: &FeatureSpec,
        workspace: &Path,
    ) -> CodegenResult<GenerationOutcome> {
        Fetcher::clone_into(&*self.fetcher, &feature.source, &feature.branch, workspace)
            .await?;

        let requested = feature.requested_packages();
        let scan = self.scanner.scan(
            &workspace.join(&self.settings.source_root),
            &requested,
            self.sink.as_ref(),
        )?;
        let name = feature_name(feature, &scan.exposed_types);
        let type_name = descriptor_type_name(&name);
        if !ctx.claim_name(&type_name) {
            info!(feature = %feature.source, descriptor = %type_name, "Descriptor already generated in this run, skipping");
            return Ok(GenerationOutcome::DuplicateName { type_name });
        }

        let packages: BTreeSet<String> = if requested.is_empty() {
            scan.packages
        } else {
            requested.into_iter().collect()
        };
        let descriptor = Descriptor {
            artifact_location: self.build_artifact(feature, workspace, &name).await,
            packages,
            exposed_types: scan.exposed_types,
        };
        let written = self.writer.write(&name, &descriptor)?;
        Ok(GenerationOutcome::Generated {
            descriptor,
            written,
        })
    }

    /// Build and copy the artifact; `None` if either step fails.
    async fn build_artifact(
        &self,
        feature: &FeatureSpec,
        workspace: &Path,
        name: &str,
    ) -> Option<String> {
        let artifact = match self.builder.build(workspace, self.settings.build_timeout).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(feature = %feature.source, error = %e, "Build failed, descriptor will not include an artifact");
                return None;
            },
        };
        match self.copy_artifact(&artifact, name) {
            Ok(location) => Some(location),
            Err(e) => {
                warn!(feature = %feature.source, error = %e, "Failed to copy artifact");
                None
            },
        }
    }

    fn copy_artifact(&self, artifact: &Path, name: &str) -> CodegenResult<String> {
        let file = format!(
            "{name}-{}.{}",
            Utc::now().timestamp_millis(),
            self.settings.artifact_extension
        );
        let dir = self.settings.project_root.join(&self.settings.artifact_output_dir);
        std::fs::create_dir_all(&dir)?;
        let dest = dir.join(&file);
        std::fs::copy(artifact, &dest)?;
        info!(from = %artifact.display(), to = %dest.display(), "Copied feature artifact");
        Ok(artifact_location(&self.settings.artifact_output_dir.join(file)))
    }
}

/// `/`-separated rendering of a descriptor artifact path.
fn artifact_location(path: &Path) -> String {
    if path.is_absolute() {
        return path.display().to_string();
    }
    path.components()
        .filter_map(|c| match c {
            PathComponent::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
