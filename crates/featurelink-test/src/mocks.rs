//! Mock implementations for testing.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use featurelink_core::{
    CodeSpace, Component, CoreError, CoreResult, MethodSignature, TypeCatalog, TypeDef, TypeName,
};
use featurelink_runtime::{IntegrationError, IntegrationResult, IsolationLoader, IsolationUnit};
use featurelink_toolchain::{Builder, Fetcher, ToolchainError, ToolchainResult};
use serde_json::Value;

type Handler = Arc<dyn Fn(&[Value]) -> CoreResult<Value> + Send + Sync>;

/// A component whose methods are closures.
///
/// Counts how often the owning registry closed it.
#[derive(Clone)]
pub struct ScriptedComponent {
    type_name: TypeName,
    implements: Vec<TypeName>,
    methods: Vec<MethodSignature>,
    handlers: HashMap<MethodSignature, Handler>,
    closes: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ScriptedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedComponent")
            .field("type_name", &self.type_name)
            .field("implements", &self.implements)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

impl ScriptedComponent {
    /// A component of runtime type `type_name` with no methods.
    ///
    /// # Panics
    ///
    /// Panics if `type_name` is not a valid type name.
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: crate::fixtures::type_name(type_name),
            implements: Vec::new(),
            methods: Vec::new(),
            handlers: HashMap::new(),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Declare that the component implements `contract`.
    #[must_use]
    pub fn implementing(mut self, contract: &str) -> Self {
        self.implements.push(crate::fixtures::type_name(contract));
        self
    }

    /// Declare `signature`, answered by `handler`.
    #[must_use]
    pub fn with_method<F>(mut self, signature: MethodSignature, handler: F) -> Self
    where
        F: Fn(&[Value]) -> CoreResult<Value> + Send + Sync + 'static,
    {
        self.methods.push(signature.clone());
        self.handlers.insert(signature, Arc::new(handler));
        self
    }

    /// Number of times `on_close` ran.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Component for ScriptedComponent {
    fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    fn implements(&self) -> &[TypeName] {
        &self.implements
    }

    fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    fn invoke(&self, method: &MethodSignature, args: Vec<Value>) -> CoreResult<Value> {
        match self.handlers.get(method) {
            Some(handler) => handler(&args),
            None => Err(CoreError::MethodNotFound {
                type_name: self.type_name.to_string(),
                method: method.clone(),
            }),
        }
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A [`Fetcher`] that hands out prepared directories.
///
/// Sources without a prepared directory fail with
/// [`ToolchainError::Fetch`]. Every call is recorded.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    workspaces: HashMap<String, PathBuf>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeFetcher {
    /// A fetcher that knows no sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `workspace` for `source`.
    #[must_use]
    pub fn with_workspace(mut self, source: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        self.workspaces.insert(source.into(), workspace.into());
        self
    }

    /// `(source, branch)` of each call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, source: &str, branch: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((source.to_string(), branch.to_string()));
        }
    }

    fn workspace(&self, source: &str) -> ToolchainResult<&PathBuf> {
        self.workspaces.get(source).ok_or_else(|| ToolchainError::Fetch {
            source_location: source.to_string(),
            message: "unknown source".to_string(),
        })
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, source: &str, branch: &str) -> ToolchainResult<PathBuf> {
        self.record(source, branch);
        self.workspace(source).cloned()
    }

    async fn clone_into(&self, source: &str, branch: &str, dest: &Path) -> ToolchainResult<()> {
        self.record(source, branch);
        copy_tree(self.workspace(source)?, dest)?;
        Ok(())
    }
}

/// A [`Builder`] that replays queued results, then repeats a fallback.
#[derive(Debug)]
pub struct ScriptedBuilder {
    queued: Mutex<VecDeque<ToolchainResult<PathBuf>>>,
    fallback: Option<PathBuf>,
    calls: Mutex<Vec<(PathBuf, Duration)>>,
}

impl ScriptedBuilder {
    /// A builder that always produces `artifact`.
    #[must_use]
    pub fn succeeding(artifact: impl Into<PathBuf>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Some(artifact.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A builder whose builds exit non-zero.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next build with `result`.
    #[must_use]
    pub fn then(self, result: ToolchainResult<PathBuf>) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(result);
        }
        self
    }

    /// `(workspace, timeout)` of each build so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(PathBuf, Duration)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Builder for ScriptedBuilder {
    async fn build(&self, workspace: &Path, timeout: Duration) -> ToolchainResult<PathBuf> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((workspace.to_path_buf(), timeout));
        }
        if let Some(result) = self.queued.lock().ok().and_then(|mut q| q.pop_front()) {
            return result;
        }
        self.fallback
            .clone()
            .ok_or(ToolchainError::BuildFailed { code: Some(1) })
    }
}

/// An isolation unit backed by an in-memory catalog.
///
/// Records how often it was closed; can be told to fail on close.
#[derive(Debug)]
pub struct FakeUnit {
    artifact: PathBuf,
    catalog: TypeCatalog,
    packages: BTreeSet<String>,
    fail_close: bool,
    closes: AtomicUsize,
}

impl FakeUnit {
    /// An empty unit "loaded" from `artifact`.
    #[must_use]
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        let artifact = artifact.into();
        Self {
            catalog: TypeCatalog::new(artifact.display().to_string()),
            artifact,
            packages: BTreeSet::new(),
            fail_close: false,
            closes: AtomicUsize::new(0),
        }
    }

    /// Add a type to the unit.
    ///
    /// # Panics
    ///
    /// Panics if the catalog lock is poisoned.
    #[must_use]
    pub fn with_type(mut self, def: TypeDef) -> Self {
        if let Some(package) = def.name.package() {
            self.packages.insert(package.to_string());
        }
        self.catalog
            .register(def)
            .unwrap_or_else(|e| panic!("register type: {e}"));
        self
    }

    /// Make [`IsolationUnit::close`] report an error.
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Number of times the unit was closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl CodeSpace for FakeUnit {
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

impl IsolationUnit for FakeUnit {
    fn artifact(&self) -> &Path {
        &self.artifact
    }

    fn packages(&self) -> Vec<String> {
        self.packages.iter().cloned().collect()
    }

    fn close(&self) -> IntegrationResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(IntegrationError::Isolation {
                artifact: self.artifact.clone(),
                message: "close failed".to_string(),
            });
        }
        Ok(())
    }
}

/// An [`IsolationLoader`] that hands out prepared units by artifact file name.
///
/// Artifacts without a prepared unit fail with
/// [`IntegrationError::Isolation`].
#[derive(Debug, Default)]
pub struct FakeLoader {
    units: HashMap<String, Arc<FakeUnit>>,
    loads: Mutex<Vec<PathBuf>>,
}

impl FakeLoader {
    /// A loader with no units.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `unit` for any artifact named `file_name`.
    #[must_use]
    pub fn with_unit(mut self, file_name: impl Into<String>, unit: Arc<FakeUnit>) -> Self {
        self.units.insert(file_name.into(), unit);
        self
    }

    /// Artifacts loaded so far.
    #[must_use]
    pub fn loads(&self) -> Vec<PathBuf> {
        self.loads.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl IsolationLoader for FakeLoader {
    fn load(&self, artifact: &Path) -> IntegrationResult<Arc<dyn IsolationUnit>> {
        if let Ok(mut loads) = self.loads.lock() {
            loads.push(artifact.to_path_buf());
        }
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.units.get(&name) {
            Some(unit) => Ok(Arc::clone(unit) as Arc<dyn IsolationUnit>),
            None => Err(IntegrationError::Isolation {
                artifact: artifact.to_path_buf(),
                message: "no such unit".to_string(),
            }),
        }
    }
}
