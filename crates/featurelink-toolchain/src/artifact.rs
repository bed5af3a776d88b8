//! Selecting the produced artifact from a build output directory.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Suffix marking the unit as it was before any repackaging step.
const ORIGINAL_SUFFIX: &str = "original";

/// File stems of bundles that are never the runnable unit.
const EXCLUDED_STEM_SUFFIXES: &[&str] = &["-sources", "-javadoc", "-docs"];

/// Picks the artifact a build produced.
///
/// `<name>.<ext>.original` wins over `<name>.<ext>`; among plain candidates,
/// source and documentation bundles are skipped. Candidates are considered in
/// file-name order so the choice is stable.
#[derive(Debug, Clone)]
pub struct ArtifactSelector {
    extension: String,
}

impl ArtifactSelector {
    /// Select artifacts with the given extension (without the leading dot).
    #[must_use]
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// The artifact extension.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Choose the artifact in `dir`, or `None` if there is no candidate.
    #[must_use]
    pub fn select(&self, dir: &Path) -> Option<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            debug!(dir = %dir.display(), "Artifact directory not readable");
            return None;
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        let original_suffix = format!(".{}.{ORIGINAL_SUFFIX}", self.extension);
        if let Some(original) = files.iter().find(|p| file_name(p).ends_with(&original_suffix)) {
            return Some(original.clone());
        }

        let plain_suffix = format!(".{}", self.extension);
        files.into_iter().find(|p| {
            let name = file_name(p);
            name.strip_suffix(&plain_suffix).is_some_and(|stem| {
                !stem.is_empty() && !EXCLUDED_STEM_SUFFIXES.iter().any(|s| stem.ends_with(s))
            })
        })
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}
