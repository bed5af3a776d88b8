//! Descriptor metadata on disk.
//!
//! Each descriptor is written twice under `<metadata>/generated/`: as TOML,
//! which the runtime reads, and as a Rust source a host can compile in.

use std::path::{Path, PathBuf};

use featurelink_core::{DESCRIPTOR_PACKAGE, Descriptor};
use tracing::{info, warn};

use crate::error::{CodegenError, CodegenResult};

/// Files written for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenDescriptor {
    /// `generated.<Name>Descriptor`.
    pub type_name: String,
    /// The TOML metadata file.
    pub metadata_path: PathBuf,
    /// The Rust source file.
    pub source_path: PathBuf,
}

/// Writes and lists descriptor metadata under one directory.
#[derive(Debug, Clone)]
pub struct DescriptorWriter {
    root: PathBuf,
}

impl DescriptorWriter {
    /// Write under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The metadata directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self) -> PathBuf {
        self.root.join(DESCRIPTOR_PACKAGE)
    }

    /// Write `descriptor` for `feature_name`, replacing earlier output.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or either file cannot be written.
    pub fn write(&self, feature_name: &str, descriptor: &Descriptor) -> CodegenResult<WrittenDescriptor> {
        let simple = format!("{feature_name}Descriptor");
        let dir = self.dir();
        std::fs::create_dir_all(&dir)?;

        let metadata_path = dir.join(format!("{simple}.toml"));
        let toml = descriptor
            .to_toml()
            .map_err(|e| CodegenError::Render(e.to_string()))?;
        std::fs::write(&metadata_path, toml)?;

        let source_path = dir.join(format!("{simple}.rs"));
        std::fs::write(&source_path, descriptor.to_rust_source(feature_name))?;

        let type_name = format!("{DESCRIPTOR_PACKAGE}.{simple}");
        info!(descriptor = %type_name, path = %metadata_path.display(), "Generated descriptor");
        Ok(WrittenDescriptor {
            type_name,
            metadata_path,
            source_path,
        })
    }

    /// Every readable descriptor, sorted by type name. Unreadable files are
    /// logged and left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn list(&self) -> CodegenResult<Vec<(String, Descriptor)>> {
        let dir = self.dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "toml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| Descriptor::from_toml(&text).map_err(|e| e.to_string()));
            match parsed {
                Ok(descriptor) => found.push((format!("{DESCRIPTOR_PACKAGE}.{stem}"), descriptor)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable descriptor"),
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }
}
