//! A compiled-output directory as a code space.
//!
//! Each type lives in its own module at `<root>/<package path>/<Simple>.<ext>`,
//! e.g. `a.b.Service` in `a/b/Service.wasm`. Modules are loaded on first use
//! and cached until [`ModuleDirectory::close`]. The directory is re-read on
//! every lookup, so modules copied in after startup become visible. A module
//! whose file modification time changed is loaded again; the replaced unit
//! stays open until the directory closes, since components created from it
//! may still be bound.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use featurelink_core::{CodeSpace, TypeDef, TypeName};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::isolation::{IsolationLoader, IsolationUnit};

/// Code space over a directory of per-type modules.
pub struct ModuleDirectory {
    root: PathBuf,
    extension: String,
    loader: Arc<dyn IsolationLoader>,
    units: Mutex<Units>,
}

#[derive(Default)]
struct Units {
    loaded: HashMap<PathBuf, Loaded>,
    retired: Vec<(PathBuf, Arc<dyn IsolationUnit>)>,
}

struct Loaded {
    modified: Option<SystemTime>,
    unit: Arc<dyn IsolationUnit>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl std::fmt::Debug for ModuleDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDirectory")
            .field("root", &self.root)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

impl ModuleDirectory {
    /// Serve modules with `extension` found under `root`.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        extension: impl Into<String>,
        loader: Arc<dyn IsolationLoader>,
    ) -> Self {
        Self {
            root: root.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            loader,
            units: Mutex::new(Units::default()),
        }
    }

    /// The directory served.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unit(&self, path: &Path) -> Option<Arc<dyn IsolationUnit>> {
        let mut units = self.units.lock().ok()?;
        let modified = modified(path);
        if let Some(loaded) = units.loaded.get(path).filter(|l| l.modified == modified) {
            return Some(Arc::clone(&loaded.unit));
        }
        if let Some(stale) = units.loaded.remove(path) {
            debug!(module = %path.display(), "Module changed on disk, reloading");
            units.retired.push((path.to_path_buf(), stale.unit));
        }
        match self.loader.load(path) {
            Ok(unit) => {
                units.loaded.insert(
                    path.to_path_buf(),
                    Loaded {
                        modified,
                        unit: Arc::clone(&unit),
                    },
                );
                Some(unit)
            },
            Err(e) => {
                warn!(module = %path.display(), error = %e, "Skipping unloadable module");
                None
            },
        }
    }

    fn modules_under(&self, dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| p.extension().is_some_and(|ext| ext == self.extension.as_str()))
            .collect()
    }

    fn collect(&self, dir: &Path, pick: impl Fn(&dyn IsolationUnit) -> Vec<TypeDef>) -> Vec<TypeDef> {
        let mut found: BTreeMap<TypeName, TypeDef> = BTreeMap::new();
        for module in self.modules_under(dir) {
            if let Some(unit) = self.unit(&module) {
                for def in pick(unit.as_ref()) {
                    found.entry(def.name.clone()).or_insert(def);
                }
            }
        }
        found.into_values().collect()
    }

    /// Close every loaded module, including those replaced by a reload.
    pub fn close(&self) {
        let units = match self.units.lock() {
            Ok(mut units) => std::mem::take(&mut *units),
            Err(_) => return,
        };
        let current = units.loaded.into_iter().map(|(path, l)| (path, l.unit));
        for (path, unit) in units.retired.into_iter().chain(current) {
            if let Err(e) = unit.close() {
                warn!(module = %path.display(), error = %e, "Failed to close module");
            }
        }
    }
}

impl CodeSpace for ModuleDirectory {
    fn label(&self) -> String {
        self.root.display().to_string()
    }

    fn resolve(&self, name: &TypeName) -> Option<TypeDef> {
        let path = self.root.join(name.relative_path(&self.extension));
        if !path.is_file() {
            return None;
        }
        self.unit(&path)?.resolve(name)
    }

    fn types_in_package(&self, package: &str) -> Vec<TypeDef> {
        let dir = package
            .split('.')
            .fold(self.root.clone(), |dir, segment| dir.join(segment));
        self.collect(&dir, |unit| unit.types_in_package(package))
    }

    fn implementors(&self, contract: &TypeName) -> Vec<TypeDef> {
        self.collect(&self.root, |unit| unit.implementors(contract))
    }

    fn resource(&self, location: &str) -> Option<PathBuf> {
        let candidate = self.root.join(location);
        candidate.is_file().then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use featurelink_core::{Component, CoreResult, TypeCatalog};

    use super::*;
    use crate::error::{IntegrationError, IntegrationResult};

    #[derive(Debug)]
    struct Marker(TypeName);

    impl Component for Marker {
        fn type_name(&self) -> &TypeName {
            &self.0
        }

        fn implements(&self) -> &[TypeName] {
            &[]
        }

        fn methods(&self) -> &[featurelink_core::MethodSignature] {
            &[]
        }

        fn invoke(
            &self,
            method: &featurelink_core::MethodSignature,
            _args: Vec<serde_json::Value>,
        ) -> CoreResult<serde_json::Value> {
            Err(featurelink_core::CoreError::MethodNotFound {
                type_name: self.0.to_string(),
                method: method.clone(),
            })
        }
    }

    /// One type per module, named after the module's path under the root.
    struct OneTypeUnit {
        artifact: PathBuf,
        catalog: TypeCatalog,
        closes: Arc<AtomicUsize>,
    }

    impl CodeSpace for OneTypeUnit {
        fn label(&self) -> String {
            self.catalog.label()
        }

        fn resolve(&self, name: &TypeName) -> Option<TypeDef> {
            self.catalog.resolve(name)
        }

        fn types_in_package(&self, package: &str) -> Vec<TypeDef> {
            self.catalog.types_in_package(package)
        }

        fn implementors(&self, contract: &TypeName) -> Vec<TypeDef> {
            self.catalog.implementors(contract)
        }
    }

    impl IsolationUnit for OneTypeUnit {
        fn artifact(&self) -> &Path {
            &self.artifact
        }

        fn packages(&self) -> Vec<String> {
            Vec::new()
        }

        fn close(&self) -> IntegrationResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PathLoader {
        root: PathBuf,
        loads: AtomicUsize,
        closes: Arc<AtomicUsize>,
    }

    impl IsolationLoader for PathLoader {
        fn load(&self, artifact: &Path) -> IntegrationResult<Arc<dyn IsolationUnit>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let isolation = |message: &str| IntegrationError::Isolation {
                artifact: artifact.to_path_buf(),
                message: message.to_string(),
            };
            if std::fs::read(artifact)?.starts_with(b"bad") {
                return Err(isolation("corrupt module"));
            }
            let relative = artifact
                .strip_prefix(&self.root)
                .map_err(|e| isolation(&e.to_string()))?
                .with_extension("");
            let dotted: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let name = TypeName::new(dotted.join("."))?;
            let catalog = TypeCatalog::new(artifact.display().to_string());
            let marker_name = name.clone();
            catalog.register(TypeDef::component(
                name,
                move || -> CoreResult<Arc<dyn Component>> { Ok(Arc::new(Marker(marker_name.clone()))) },
            ))?;
            Ok(Arc::new(OneTypeUnit {
                artifact: artifact.to_path_buf(),
                catalog,
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    fn setup(files: &[(&str, &[u8])]) -> (tempfile::TempDir, Arc<PathLoader>, ModuleDirectory) {
        let dir = tempfile::tempdir().unwrap();
        for (path, body) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        let loader = Arc::new(PathLoader {
            root: dir.path().to_path_buf(),
            loads: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        });
        let modules = ModuleDirectory::new(dir.path(), ".wasm", Arc::clone(&loader) as _);
        (dir, loader, modules)
    }

    fn names(defs: &[TypeDef]) -> Vec<&str> {
        defs.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn resolves_types_by_module_path() {
        let (_dir, loader, modules) = setup(&[("a/b/Service.wasm", b"")]);

        let name = TypeName::new("a.b.Service").unwrap();
        assert!(modules.resolve(&name).is_some());
        assert!(modules.resolve(&name).is_some());
        assert!(modules.resolve(&TypeName::new("a.b.Missing").unwrap()).is_none());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn package_listing_covers_subpackages_and_skips_bad_modules() {
        let (_dir, _loader, modules) = setup(&[
            ("a/b/One.wasm", b""),
            ("a/b/c/Two.wasm", b""),
            ("a/b/Broken.wasm", b"bad"),
            ("a/b/notes.txt", b""),
            ("a/x/Other.wasm", b""),
        ]);

        assert_eq!(
            names(&modules.types_in_package("a.b")),
            ["a.b.One", "a.b.c.Two"]
        );
        assert_eq!(names(&modules.types_in_package("a.b.c")), ["a.b.c.Two"]);
        assert!(modules.types_in_package("nowhere").is_empty());
    }

    #[test]
    fn modules_copied_later_become_visible() {
        let (dir, _loader, modules) = setup(&[]);
        assert!(modules.types_in_package("a.b").is_empty());

        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/Late.wasm"), b"").unwrap();
        assert_eq!(names(&modules.types_in_package("a.b")), ["a.b.Late"]);
    }

    #[test]
    fn close_releases_loaded_modules_once() {
        let (_dir, loader, modules) = setup(&[("a/One.wasm", b""), ("a/Two.wasm", b"")]);
        assert_eq!(modules.types_in_package("a").len(), 2);

        modules.close();
        modules.close();
        assert_eq!(loader.closes.load(Ordering::SeqCst), 2);
        assert!(modules.resource("a/One.wasm").is_some());
        assert!(modules.resource("a/Gone.wasm").is_none());
    }

    #[test]
    fn changed_module_is_reloaded() {
        let (dir, loader, modules) = setup(&[("a/b/Service.wasm", b"v1")]);
        let name = TypeName::new("a.b.Service").unwrap();
        assert!(modules.resolve(&name).is_some());

        let path = dir.path().join("a/b/Service.wasm");
        std::fs::write(&path, b"v2").unwrap();
        let later = modified(&path)
            .unwrap()
            .checked_add(std::time::Duration::from_secs(5))
            .unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(modules.resolve(&name).is_some());
        assert!(modules.resolve(&name).is_some());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(loader.closes.load(Ordering::SeqCst), 0);

        modules.close();
        assert_eq!(loader.closes.load(Ordering::SeqCst), 2);
    }
}
