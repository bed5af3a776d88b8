//! Where regenerated feature sources go.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use featurelink_core::TypeName;
use tracing::debug;

use crate::error::SinkError;

/// Receives scanned sources so they compile as part of the host.
pub trait GeneratedSink: Send + Sync {
    /// Write `content` as the source of `type_name`, returning the file.
    ///
    /// # Errors
    ///
    /// [`SinkError::AlreadyGenerated`] if the type was already written in
    /// this run; [`SinkError::Io`] if writing fails.
    fn write_source(&self, type_name: &TypeName, content: &str) -> Result<PathBuf, SinkError>;
}

/// Writes sources under a directory laid out by package path
/// (`a.b.Service` → `<root>/a/b/Service.<ext>`).
///
/// A type may be written once per sink; files left by earlier runs are
/// overwritten.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    extension: String,
    written: Mutex<HashSet<PathBuf>>,
}

impl DirectorySink {
    /// A sink writing `.<extension>` files under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            written: Mutex::new(HashSet::new()),
        }
    }

    /// The output directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl GeneratedSink for DirectorySink {
    fn write_source(&self, type_name: &TypeName, content: &str) -> Result<PathBuf, SinkError> {
        let path = self.root.join(type_name.relative_path(&self.extension));
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if written.contains(&path) {
            return Err(SinkError::AlreadyGenerated(type_name.to_string()));
        }
        let io = |source| SinkError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(&path, content).map_err(io)?;
        debug!(type_name = %type_name, path = %path.display(), "Wrote generated source");
        written.insert(path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_by_package_path_once_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path(), ".rs");
        let name = TypeName::new("a.b.Service").unwrap();

        let path = sink.write_source(&name, "pub struct Service;\n").unwrap();
        assert_eq!(path, dir.path().join("a/b/Service.rs"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "pub struct Service;\n");

        assert!(matches!(
            sink.write_source(&name, "changed"),
            Err(SinkError::AlreadyGenerated(n)) if n == "a.b.Service"
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "pub struct Service;\n");
    }

    #[test]
    fn a_new_run_overwrites_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let name = TypeName::new("a.Service").unwrap();
        DirectorySink::new(dir.path(), "rs")
            .write_source(&name, "old")
            .unwrap();

        let path = DirectorySink::new(dir.path(), "rs")
            .write_source(&name, "new")
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "new");
    }
}
