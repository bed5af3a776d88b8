//! Source scanning: finds the types a feature contributes.
//!
//! Identity is read with two regular expressions, not a parser. The first
//! package declaration and the first type declaration of a file win; files
//! that declare several types contribute only the first.

use std::collections::BTreeSet;
use std::path::Path;

use featurelink_config::ScannerSection;
use featurelink_core::TypeName;
use featurelink_core::names::package_allowed;
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{CodegenError, CodegenResult, SinkError};
use crate::sink::GeneratedSink;

/// How package and type identity appear in one source language.
#[derive(Debug, Clone)]
pub struct SourceDialect {
    extension: String,
    package_pattern: Regex,
    type_pattern: Regex,
    markers: Vec<String>,
}

impl SourceDialect {
    /// Compile a dialect from the `[scanner]` section.
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::Pattern`] if a pattern does not compile.
    pub fn from_section(section: &ScannerSection) -> CodegenResult<Self> {
        Ok(Self {
            extension: section.extension.trim_start_matches('.').to_string(),
            package_pattern: Regex::new(&section.package_pattern)?,
            type_pattern: Regex::new(&section.type_pattern)?,
            markers: section.markers.clone(),
        })
    }

    /// The built-in Rust dialect.
    ///
    /// # Errors
    ///
    /// Never in practice; the built-in patterns are valid.
    pub fn rust() -> CodegenResult<Self> {
        Self::from_section(&ScannerSection::default())
    }

    /// Source file extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The first declared package.
    #[must_use]
    pub fn package_of<'a>(&self, content: &'a str) -> Option<&'a str> {
        first_group(&self.package_pattern, content)
    }

    /// The first declared type's simple name.
    #[must_use]
    pub fn type_of<'a>(&self, content: &'a str) -> Option<&'a str> {
        first_group(&self.type_pattern, content)
    }

    /// Whether the content carries a component marker.
    #[must_use]
    pub fn is_marked(&self, content: &str) -> bool {
        self.markers.iter().any(|m| content.contains(m.as_str()))
    }

    fn is_source(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext == self.extension.as_str())
    }
}

fn first_group<'a>(pattern: &Regex, content: &'a str) -> Option<&'a str> {
    let caps = pattern.captures(content)?;
    caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str())
}

/// What a scan found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Packages of the included files.
    pub packages: BTreeSet<String>,
    /// Fully-qualified names of the included files' primary types.
    pub exposed_types: BTreeSet<String>,
}

/// Walks a feature's source tree and regenerates the files it includes.
#[derive(Debug, Clone)]
pub struct SourceScanner {
    dialect: SourceDialect,
}

impl SourceScanner {
    /// Scan with `dialect`.
    #[must_use]
    pub fn new(dialect: SourceDialect) -> Self {
        Self { dialect }
    }

    /// The dialect in use.
    #[must_use]
    pub fn dialect(&self) -> &SourceDialect {
        &self.dialect
    }

    /// Scan every source file under `root`.
    ///
    /// With `configured` packages, a file is included when its package is one
    /// of them or a sub-package; files without a package are excluded. With no
    /// packages, a file is included when it carries a marker. Included files
    /// are written to `sink` unchanged. A missing `root` yields an empty
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::Scan`] if the tree cannot be walked.
    pub fn scan<S: AsRef<str>>(
        &self,
        root: &Path,
        configured: &[S],
        sink: &dyn GeneratedSink,
    ) -> CodegenResult<ScanResult> {
        let mut result = ScanResult::default();
        if !root.is_dir() {
            info!(root = %root.display(), "No source root in feature, scanning skipped");
            return Ok(result);
        }

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| CodegenError::Scan {
                path: e.path().unwrap_or(root).to_path_buf(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() || !self.dialect.is_source(entry.path()) {
                continue;
            }
            let content = match std::fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable source");
                    continue;
                },
            };
            self.include(entry.path(), &content, configured, sink, &mut result);
        }
        Ok(result)
    }

    fn include<S: AsRef<str>>(
        &self,
        path: &Path,
        content: &str,
        configured: &[S],
        sink: &dyn GeneratedSink,
        result: &mut ScanResult,
    ) {
        let package = self.dialect.package_of(content);
        let included = if configured.is_empty() {
            self.dialect.is_marked(content)
        } else {
            package_allowed(package, configured)
        };
        if !included {
            return;
        }
        let Some(simple) = self.dialect.type_of(content) else {
            debug!(path = %path.display(), "No type declaration, skipping");
            return;
        };
        let name = match TypeName::qualified(package, simple) {
            Ok(name) => name,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unusable type identity, skipping");
                return;
            },
        };

        match sink.write_source(&name, content) {
            Ok(_) => info!(type_name = %name, "Created generated source"),
            Err(SinkError::AlreadyGenerated(_)) => {
                info!(type_name = %name, "Source already generated");
            },
            Err(e) => warn!(type_name = %name, error = %e, "Failed to generate source"),
        }
        result.exposed_types.insert(name.to_string());
        if let Some(package) = package {
            result.packages.insert(package.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl GeneratedSink for Recorder {
        fn write_source(
            &self,
            type_name: &TypeName,
            content: &str,
        ) -> Result<std::path::PathBuf, SinkError> {
            let mut written = self.0.lock().unwrap();
            if written.iter().any(|(n, _)| n == type_name.as_str()) {
                return Err(SinkError::AlreadyGenerated(type_name.to_string()));
            }
            written.push((type_name.to_string(), content.to_string()));
            Ok(type_name.relative_path("rs"))
        }
    }

    fn source(package: Option<&str>, marker: &str, decl: &str) -> String {
        let mut out = String::new();
        if let Some(package) = package {
            out.push_str(&format!("pub const PACKAGE: &str = \"{package}\";\n\n"));
        }
        out.push_str(&format!("{marker}\n{decl}\n"));
        out
    }

    fn tree(files: &[(&str, String)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, body) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        dir
    }

    #[test]
    fn rust_dialect_reads_identity() {
        let dialect = SourceDialect::rust().unwrap();
        let content = "use x::y;\npub const PACKAGE: &'static str = \"a.b\";\n\n#[service]\npub(crate) struct Billing {\n}\nenum Later {}\n";

        assert_eq!(dialect.package_of(content), Some("a.b"));
        assert_eq!(dialect.type_of(content), Some("Billing"));
        assert!(dialect.is_marked(content));
        assert!(!dialect.is_marked("struct Plain;"));
    }

    #[test]
    fn package_filter_includes_subpackages_only() {
        let dir = tree(&[
            ("one.rs", source(Some("a.b"), "", "pub struct One;")),
            ("two.rs", source(Some("a.b.c"), "", "pub trait Two {}")),
            ("bx.rs", source(Some("a.bx"), "#[component]", "pub struct Bx;")),
            ("none.rs", source(None, "#[component]", "pub struct Loose;")),
            ("notes.txt", source(Some("a.b"), "", "pub struct Text;")),
        ]);
        let sink = Recorder::default();
        let scanner = SourceScanner::new(SourceDialect::rust().unwrap());

        let result = scanner.scan(dir.path(), &["a.b"], &sink).unwrap();

        assert_eq!(
            result.exposed_types.iter().collect::<Vec<_>>(),
            ["a.b.One", "a.b.c.Two"]
        );
        assert_eq!(result.packages.iter().collect::<Vec<_>>(), ["a.b", "a.b.c"]);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn without_packages_markers_decide() {
        let dir = tree(&[
            ("svc.rs", source(Some("x"), "#[service]", "pub struct Svc;")),
            ("plain.rs", source(Some("x"), "", "pub struct Plain;")),
            ("root.rs", source(None, "#[bean]", "pub struct Root;")),
        ]);
        let sink = Recorder::default();
        let scanner = SourceScanner::new(SourceDialect::rust().unwrap());

        let result = scanner.scan::<&str>(dir.path(), &[], &sink).unwrap();

        assert_eq!(
            result.exposed_types.iter().collect::<Vec<_>>(),
            ["Root", "x.Svc"]
        );
        assert_eq!(result.packages.iter().collect::<Vec<_>>(), ["x"]);
    }

    #[test]
    fn duplicate_types_are_recorded_once() {
        let body = source(Some("x"), "#[service]", "pub struct Svc;");
        let dir = tree(&[("a/svc.rs", body.clone()), ("b/svc.rs", body)]);
        let sink = Recorder::default();
        let scanner = SourceScanner::new(SourceDialect::rust().unwrap());

        let result = scanner.scan::<&str>(dir.path(), &[], &sink).unwrap();
        assert_eq!(result.exposed_types.len(), 1);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_root_is_empty() {
        let scanner = SourceScanner::new(SourceDialect::rust().unwrap());
        let result = scanner
            .scan::<&str>(Path::new("/nonexistent/featurelink/src"), &[], &Recorder::default())
            .unwrap();
        assert_eq!(result, ScanResult::default());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let section = ScannerSection {
            type_pattern: "(unclosed".to_string(),
            ..ScannerSection::default()
        };
        assert!(matches!(
            SourceDialect::from_section(&section),
            Err(CodegenError::Pattern(_))
        ));
    }
}
