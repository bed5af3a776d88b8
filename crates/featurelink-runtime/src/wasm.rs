//! WASM isolation units backed by Extism.
//!
//! A feature artifact is a WASM module exporting two functions:
//!
//! - `featurelink_describe` takes no input and returns a JSON array of
//!   component descriptions:
//!   `[{"type": "a.b.Greeter", "kind": "concrete", "component": true,
//!   "implements": ["a.api.Greeting"], "methods": [{"name": "greet", "params": ["String"]}]}]`
//! - `featurelink_invoke` takes `{"type", "method", "params", "args"}` and
//!   returns `{"value": ...}` or `{"error": "..."}`.
//!
//! Each unit owns one plugin instance; closing the unit drops it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use extism::{Manifest, PluginBuilder, Wasm};
use featurelink_core::{
    CodeSpace, Component, Contract, CoreError, CoreResult, MethodSignature, TypeDef, TypeName,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, info};

use crate::error::{IntegrationError, IntegrationResult};
use crate::isolation::{IsolationLoader, IsolationUnit};

const DESCRIBE_EXPORT: &str = "featurelink_describe";
const INVOKE_EXPORT: &str = "featurelink_invoke";

/// Resource limits applied to every loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WasmLimits {
    /// Maximum wall time of one guest call.
    pub call_timeout: Duration,
    /// Maximum linear memory, in 64 KiB pages.
    pub memory_max_pages: u32,
}

impl Default for WasmLimits {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            memory_max_pages: 1024,
        }
    }
}

/// [`IsolationLoader`] producing [`WasmUnit`]s.
#[derive(Debug, Clone, Default)]
pub struct WasmLoader {
    limits: WasmLimits,
}

impl WasmLoader {
    /// A loader applying `limits` to each module.
    #[must_use]
    pub fn new(limits: WasmLimits) -> Self {
        Self { limits }
    }
}

impl IsolationLoader for WasmLoader {
    fn load(&self, artifact: &Path) -> IntegrationResult<Arc<dyn IsolationUnit>> {
        Ok(Arc::new(WasmUnit::load(artifact, self.limits)?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DescribedKind {
    #[default]
    Concrete,
    Interface,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ComponentDescription {
    #[serde(rename = "type")]
    type_name: TypeName,
    #[serde(default)]
    kind: DescribedKind,
    #[serde(default = "default_true")]
    component: bool,
    #[serde(default)]
    implements: Vec<TypeName>,
    #[serde(default)]
    methods: Vec<MethodSignature>,
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    #[serde(rename = "type")]
    type_name: &'a str,
    method: &'a str,
    params: &'a [String],
    args: Vec<Value>,
}

#[derive(Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

type SharedPlugin = Arc<Mutex<Option<extism::Plugin>>>;

/// Run blocking guest work without stalling a multi-threaded runtime.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        },
        _ => f(),
    }
}

/// One loaded feature module.
pub struct WasmUnit {
    artifact: PathBuf,
    plugin: SharedPlugin,
    types: BTreeMap<TypeName, TypeDef>,
}

impl WasmUnit {
    /// Load the module at `artifact` and read its component descriptions.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError::Isolation`] if the file cannot be read,
    /// the module cannot be instantiated, or its description is malformed.
    pub fn load(artifact: &Path, limits: WasmLimits) -> IntegrationResult<Self> {
        let isolation = |message: String| IntegrationError::Isolation {
            artifact: artifact.to_path_buf(),
            message,
        };
        info!(artifact = %artifact.display(), "Loading feature module");

        let (plugin, descriptions) = blocking(|| -> IntegrationResult<_> {
            let bytes = std::fs::read(artifact).map_err(|e| isolation(format!("read failed: {e}")))?;
            let manifest = Manifest::new([Wasm::data(bytes)])
                .with_timeout(limits.call_timeout)
                .with_memory_max(limits.memory_max_pages);
            let mut plugin = PluginBuilder::new(manifest)
                .with_wasi(true)
                .build()
                .map_err(|e| isolation(format!("failed to build plugin: {e}")))?;
            if !plugin.function_exists(DESCRIBE_EXPORT) {
                return Err(isolation(format!("module does not export {DESCRIBE_EXPORT}")));
            }
            let raw = plugin
                .call::<&str, String>(DESCRIBE_EXPORT, "")
                .map_err(|e| isolation(format!("{DESCRIBE_EXPORT} failed: {e:?}")))?;
            let descriptions: Vec<ComponentDescription> = serde_json::from_str(&raw)
                .map_err(|e| isolation(format!("invalid component description: {e}")))?;
            Ok((plugin, descriptions))
        })?;

        let plugin: SharedPlugin = Arc::new(Mutex::new(Some(plugin)));
        let types = descriptions
            .into_iter()
            .map(|d| {
                let def = type_def(d, &plugin);
                (def.name.clone(), def)
            })
            .collect::<BTreeMap<_, _>>();
        debug!(artifact = %artifact.display(), types = types.len(), "Feature module described");

        Ok(Self {
            artifact: artifact.to_path_buf(),
            plugin,
            types,
        })
    }

    /// Whether [`IsolationUnit::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.plugin.lock().map(|p| p.is_none()).unwrap_or(true)
    }
}

fn type_def(description: ComponentDescription, plugin: &SharedPlugin) -> TypeDef {
    if description.kind == DescribedKind::Interface {
        let contract = description
            .methods
            .into_iter()
            .fold(Contract::new(description.type_name), Contract::method);
        return TypeDef::interface(contract);
    }

    let template = Arc::new(WasmComponent {
        type_name: description.type_name.clone(),
        implements: description.implements.clone(),
        methods: description.methods,
        plugin: Arc::clone(plugin),
    });
    let factory = move || -> CoreResult<Arc<dyn Component>> {
        Ok(Arc::new(WasmComponent::clone(&template)))
    };
    let mut def = if description.component {
        TypeDef::component(description.type_name, factory)
    } else {
        TypeDef::plain(description.type_name, factory)
    };
    def.implements = description.implements;
    def
}

impl std::fmt::Debug for WasmUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmUnit")
            .field("artifact", &self.artifact)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CodeSpace for WasmUnit {
    fn label(&self) -> String {
        self.artifact.display().to_string()
    }

    fn resolve(&self, name: &TypeName) -> Option<TypeDef> {
        self.types.get(name).cloned()
    }

    fn types_in_package(&self, package: &str) -> Vec<TypeDef> {
        self.types
            .values()
            .filter(|d| d.name.is_in_package(package))
            .cloned()
            .collect()
    }

    fn implementors(&self, contract: &TypeName) -> Vec<TypeDef> {
        self.types
            .values()
            .filter(|d| !d.is_interface() && d.implements.contains(contract))
            .cloned()
            .collect()
    }
}

impl IsolationUnit for WasmUnit {
    fn artifact(&self) -> &Path {
        &self.artifact
    }

    fn packages(&self) -> Vec<String> {
        self.types
            .keys()
            .filter_map(|t| t.package().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn close(&self) -> IntegrationResult<()> {
        let mut plugin = self.plugin.lock().map_err(|e| IntegrationError::Isolation {
            artifact: self.artifact.clone(),
            message: format!("plugin lock poisoned: {e}"),
        })?;
        if plugin.take().is_some() {
            info!(artifact = %self.artifact.display(), "Unloaded feature module");
        }
        Ok(())
    }
}

/// A component whose methods run inside a [`WasmUnit`].
#[derive(Clone)]
pub struct WasmComponent {
    type_name: TypeName,
    implements: Vec<TypeName>,
    methods: Vec<MethodSignature>,
    plugin: SharedPlugin,
}

impl std::fmt::Debug for WasmComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmComponent")
            .field("type_name", &self.type_name)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

impl Component for WasmComponent {
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
        if !self.declares(method) {
            return Err(CoreError::MethodNotFound {
                type_name: self.type_name.to_string(),
                method: method.clone(),
            });
        }
        let request = serde_json::to_vec(&InvokeRequest {
            type_name: self.type_name.as_str(),
            method: &method.name,
            params: &method.params,
            args,
        })
        .map_err(|e| CoreError::Invocation(format!("failed to serialize call: {e}")))?;

        let raw = blocking(|| {
            let mut guard = self
                .plugin
                .lock()
                .map_err(|_| CoreError::LockPoisoned("plugin"))?;
            let plugin = guard
                .as_mut()
                .ok_or_else(|| CoreError::Closed(self.type_name.to_string()))?;
            plugin
                .call::<&[u8], Vec<u8>>(INVOKE_EXPORT, &request)
                .map_err(|e| CoreError::Invocation(format!("{INVOKE_EXPORT} failed: {e:?}")))
        })?;

        let response: InvokeResponse = serde_json::from_slice(&raw)
            .map_err(|e| CoreError::Invocation(format!("invalid invoke response: {e}")))?;
        match response.error {
            Some(error) => Err(CoreError::Invocation(error)),
            None => Ok(response.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_defaults() {
        let parsed: Vec<ComponentDescription> = serde_json::from_str(
            r#"[
                {"type": "a.b.Greeter", "implements": ["a.api.Greeting"],
                 "methods": [{"name": "greet", "params": ["String"]}]},
                {"type": "a.api.Greeting", "kind": "interface",
                 "methods": [{"name": "greet", "params": ["String"]}]}
            ]"#,
        )
        .unwrap();

        assert_eq!(parsed[0].kind, DescribedKind::Concrete);
        assert!(parsed[0].component);
        assert_eq!(parsed[1].kind, DescribedKind::Interface);
    }

    #[test]
    fn interface_description_becomes_contract() {
        let plugin: SharedPlugin = Arc::new(Mutex::new(None));
        let description: ComponentDescription = serde_json::from_str(
            r#"{"type": "a.api.Greeting", "kind": "interface",
                "methods": [{"name": "greet", "params": ["String"]}]}"#,
        )
        .unwrap();

        let def = type_def(description, &plugin);
        let contract = def.contract().unwrap();
        assert_eq!(contract.methods().len(), 1);
        assert_eq!(contract.methods()[0].signature.name, "greet");
    }

    #[test]
    fn closed_plugin_rejects_calls() {
        let plugin: SharedPlugin = Arc::new(Mutex::new(None));
        let description: ComponentDescription = serde_json::from_str(
            r#"{"type": "a.b.Greeter", "methods": [{"name": "greet", "params": []}]}"#,
        )
        .unwrap();
        let def = type_def(description, &plugin);
        let featurelink_core::TypeKind::Concrete(factory) = &def.kind else {
            panic!("expected a concrete type");
        };
        let component = factory.create().unwrap();

        let err = component
            .invoke(&MethodSignature::new("greet", Vec::<String>::new()), vec![])
            .unwrap_err();
        assert!(matches!(err, CoreError::Closed(_)));

        let err = component
            .invoke(&MethodSignature::new("missing", Vec::<String>::new()), vec![])
            .unwrap_err();
        assert!(matches!(err, CoreError::MethodNotFound { .. }));
    }

    #[test]
    fn missing_artifact_is_isolation_error() {
        let err = WasmUnit::load(Path::new("/nonexistent/feature.wasm"), WasmLimits::default())
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Isolation { .. }));
    }

    #[test]
    fn module_without_describe_export_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("empty.wasm");
        // Smallest valid module: magic number and version, no exports.
        std::fs::write(&artifact, b"\0asm\x01\0\0\0").unwrap();

        let err = WasmUnit::load(&artifact, WasmLimits::default()).unwrap_err();

        let IntegrationError::Isolation { message, .. } = err else {
            panic!("expected an isolation error");
        };
        assert_eq!(message, "module does not export featurelink_describe");
    }
}
