//! Configuration types for featurelink.
//!
//! All types here are self-contained, with no dependencies on other
//! featurelink crates. Domain types (feature specs, build commands, scanner
//! dialects, log configs) are mirrored and converted at the boundary. Every
//! struct implements [`Default`] so that a bare `[section]` header in TOML
//! produces a working configuration.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feature flag and the ordered feature list.
    pub featurelink: FeatureLinkSection,
    /// Startup integration settings.
    pub runtime: RuntimeSection,
    /// Build-time descriptor generation settings.
    pub codegen: CodegenSection,
    /// External build command.
    pub build: BuildSection,
    /// Source scanner dialect.
    pub scanner: ScannerSection,
    /// Logging level, format and destination.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// FeatureLinkSection
// ---------------------------------------------------------------------------

/// `[featurelink]`: the subsystem switch and the features to integrate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureLinkSection {
    /// Whether integration runs at all.
    pub enabled: bool,
    /// Features in integration order.
    pub features: Vec<FeatureEntry>,
}

fn default_branch() -> String {
    "main".to_owned()
}

/// One `[[featurelink.features]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    /// Git URL or local path. Also accepted as `repo` or `repository`.
    #[serde(alias = "repo", alias = "repository")]
    pub source: String,
    /// Branch to check out.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Requested packages. Also accepted as a single `package` string.
    #[serde(default, alias = "package", deserialize_with = "one_or_many")]
    pub packages: Vec<String>,
}

impl FeatureEntry {
    /// An entry for `source` on `main` with no package filter.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            branch: default_branch(),
            packages: Vec::new(),
        }
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }
    let raw = match Raw::deserialize(deserializer)? {
        Raw::One(s) => s.split(',').map(str::to_owned).collect(),
        Raw::Many(v) => v,
    };
    let mut packages: Vec<String> = Vec::new();
    for package in raw {
        let package = package.trim();
        if !package.is_empty() && !packages.iter().any(|p| p == package) {
            packages.push(package.to_owned());
        }
    }
    Ok(packages)
}

// ---------------------------------------------------------------------------
// RuntimeSection
// ---------------------------------------------------------------------------

/// `[runtime]`: how features are resolved at host startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Where fetched feature workspaces are kept. Defaults to
    /// `<tmp>/featurelink/features`.
    pub cache_dir: Option<PathBuf>,
    /// Timeout for building a feature at startup.
    pub build_timeout_secs: u64,
    /// Compiled output inside a fetched feature workspace.
    pub feature_output_dir: PathBuf,
    /// The host's own compiled output; the fast path copies into it.
    pub host_output_dir: PathBuf,
    /// Where the generator left descriptor metadata.
    pub metadata_dir: PathBuf,
    /// Extension of compiled units.
    pub compiled_extension: String,
    /// Per-call timeout inside an isolation unit.
    pub call_timeout_secs: u64,
    /// Memory cap per isolation unit, in 64 KiB pages.
    pub memory_max_pages: u32,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            cache_dir: None,
            build_timeout_secs: 300,
            feature_output_dir: PathBuf::from("target/featurelink/components"),
            host_output_dir: PathBuf::from("target/featurelink/components"),
            metadata_dir: PathBuf::from("target/featurelink/metadata"),
            compiled_extension: "wasm".to_owned(),
            call_timeout_secs: 30,
            memory_max_pages: 1024,
        }
    }
}

impl RuntimeSection {
    /// The configured cache dir, or `<tmp>/featurelink/features`.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("featurelink").join("features"))
    }
}

// ---------------------------------------------------------------------------
// CodegenSection
// ---------------------------------------------------------------------------

/// `[codegen]`: the build-time descriptor generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenSection {
    /// Timeout for building a feature during generation.
    pub build_timeout_secs: u64,
    /// Source root inside a fetched feature.
    pub source_root: PathBuf,
    /// Where matching sources are regenerated into the host.
    pub generated_sources_dir: PathBuf,
    /// Where descriptor metadata and sources are written.
    pub metadata_dir: PathBuf,
    /// Where built feature artifacts are copied.
    pub artifact_output_dir: PathBuf,
}

impl Default for CodegenSection {
    fn default() -> Self {
        Self {
            build_timeout_secs: 600,
            source_root: PathBuf::from("src"),
            generated_sources_dir: PathBuf::from("target/featurelink/generated"),
            metadata_dir: PathBuf::from("target/featurelink/metadata"),
            artifact_output_dir: PathBuf::from("target/featurelink/features"),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildSection
// ---------------------------------------------------------------------------

/// `[build]`: the external build command run inside a feature workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Build tool executable.
    pub program: String,
    /// Arguments for a release build.
    pub args: Vec<String>,
    /// Arguments for the availability probe; empty skips the probe.
    pub probe_args: Vec<String>,
    /// Artifact directory, relative to the workspace.
    pub artifact_dir: PathBuf,
    /// Artifact file extension.
    pub artifact_extension: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            program: "cargo".to_owned(),
            args: ["build", "--release", "--target", "wasm32-wasip1"]
                .map(str::to_owned)
                .to_vec(),
            probe_args: vec!["--version".to_owned()],
            artifact_dir: PathBuf::from("target/wasm32-wasip1/release"),
            artifact_extension: "wasm".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScannerSection
// ---------------------------------------------------------------------------

/// `[scanner]`: how package and type identity are read from source files.
///
/// Patterns are regular expressions whose first capture group is the
/// package or the type name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSection {
    /// Source file extension.
    pub extension: String,
    /// Matches the package declaration.
    pub package_pattern: String,
    /// Matches the primary type declaration.
    pub type_pattern: String,
    /// Tokens marking a component when no packages are configured.
    pub markers: Vec<String>,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            extension: "rs".to_owned(),
            package_pattern: r#"pub\s+const\s+PACKAGE\s*:\s*&(?:'static\s+)?str\s*=\s*"([A-Za-z_][A-Za-z0-9_.]*)"\s*;"#
                .to_owned(),
            type_pattern:
                r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|trait|enum)\s+([A-Za-z_][A-Za-z0-9_]*)"
                    .to_owned(),
            markers: [
                "#[component]",
                "#[service]",
                "#[repository]",
                "#[controller]",
                "#[configuration]",
                "#[bean]",
            ]
            .map(str::to_owned)
            .to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// `[logging]`: tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level filter (`"trace"` .. `"error"`).
    pub level: String,
    /// `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// `"stderr"`, `"stdout"` or `"file"`.
    pub target: String,
    /// Log directory when `target = "file"`.
    pub directory: Option<PathBuf>,
    /// Extra per-crate directives (e.g. `"featurelink_runtime=debug"`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directory: None,
            directives: Vec::new(),
        }
    }
}
