//! Code spaces: the set of types a registry can name and instantiate.
//!
//! The host process owns one code space (usually a [`TypeCatalog`], layered
//! over compiled output with a [`LayeredCodeSpace`]). Each integrated feature
//! contributes another through its isolation unit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::component::Component;
use crate::contract::Contract;
use crate::error::{CoreError, CoreResult};
use crate::names::TypeName;

/// Creates instances of a concrete type.
pub trait Factory: Send + Sync {
    /// Create a new instance.
    ///
    /// # Errors
    ///
    /// Returns an error if construction fails.
    fn create(&self) -> CoreResult<Arc<dyn Component>>;
}

impl<F> Factory for F
where
    F: Fn() -> CoreResult<Arc<dyn Component>> + Send + Sync,
{
    fn create(&self) -> CoreResult<Arc<dyn Component>> {
        self()
    }
}

/// Whether a type is a contract or something that can be instantiated.
#[derive(Clone)]
pub enum TypeKind {
    /// A contract; never instantiated directly.
    Interface(Arc<Contract>),
    /// A concrete type with its factory.
    Concrete(Arc<dyn Factory>),
}

impl std::fmt::Debug for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interface(c) => f.debug_tuple("Interface").field(c.name()).finish(),
            Self::Concrete(_) => f.write_str("Concrete"),
        }
    }
}

/// A resolvable type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Fully-qualified name.
    pub name: TypeName,
    /// Contract or concrete.
    pub kind: TypeKind,
    /// Contracts a concrete type implements.
    pub implements: Vec<TypeName>,
    /// Marked for discovery by package scanning.
    pub stereotyped: bool,
}

impl TypeDef {
    /// A contract type.
    #[must_use]
    pub fn interface(contract: Contract) -> Self {
        Self {
            name: contract.name().clone(),
            kind: TypeKind::Interface(Arc::new(contract)),
            implements: Vec::new(),
            stereotyped: false,
        }
    }

    /// A concrete, scan-discoverable component type.
    #[must_use]
    pub fn component(name: TypeName, factory: impl Factory + 'static) -> Self {
        Self {
            name,
            kind: TypeKind::Concrete(Arc::new(factory)),
            implements: Vec::new(),
            stereotyped: true,
        }
    }

    /// A concrete type that package scanning ignores.
    #[must_use]
    pub fn plain(name: TypeName, factory: impl Factory + 'static) -> Self {
        Self {
            stereotyped: false,
            ..Self::component(name, factory)
        }
    }

    /// Declare an implemented contract.
    #[must_use]
    pub fn implementing(mut self, contract: TypeName) -> Self {
        if !self.implements.contains(&contract) {
            self.implements.push(contract);
        }
        self
    }

    /// The contract, for interface types.
    #[must_use]
    pub fn contract(&self) -> Option<&Arc<Contract>> {
        match &self.kind {
            TypeKind::Interface(c) => Some(c),
            TypeKind::Concrete(_) => None,
        }
    }

    /// Whether this is a contract type.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface(_))
    }

    /// Whether a value of this type can be used where `other` is expected.
    #[must_use]
    pub fn is_assignable_to(&self, other: &TypeName) -> bool {
        &self.name == other || self.implements.contains(other)
    }
}

/// The types and resources visible to a registry.
pub trait CodeSpace: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> String;

    /// Resolve a type by fully-qualified name.
    fn resolve(&self, name: &TypeName) -> Option<TypeDef>;

    /// All types in `package` or its sub-packages.
    fn types_in_package(&self, package: &str) -> Vec<TypeDef>;

    /// Concrete types that implement `contract`.
    fn implementors(&self, _contract: &TypeName) -> Vec<TypeDef> {
        Vec::new()
    }

    /// Locate a bundled resource by relative location.
    fn resource(&self, _location: &str) -> Option<PathBuf> {
        None
    }
}

/// Programmatically registered types plus optional resource roots.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    label: String,
    types: RwLock<BTreeMap<TypeName, TypeDef>>,
    resource_roots: Vec<PathBuf>,
}

impl TypeCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Add a directory searched by [`CodeSpace::resource`].
    #[must_use]
    pub fn with_resource_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resource_roots.push(root.into());
        self
    }

    /// Register or replace a type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockPoisoned`] if the catalog lock is poisoned.
    pub fn register(&self, def: TypeDef) -> CoreResult<()> {
        let mut types = self
            .types
            .write()
            .map_err(|_| CoreError::LockPoisoned("type catalog"))?;
        types.insert(def.name.clone(), def);
        Ok(())
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Whether no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CodeSpace for TypeCatalog {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn resolve(&self, name: &TypeName) -> Option<TypeDef> {
        self.types.read().ok()?.get(name).cloned()
    }

    fn types_in_package(&self, package: &str) -> Vec<TypeDef> {
        let Ok(types) = self.types.read() else {
            return Vec::new();
        };
        types
            .values()
            .filter(|def| def.name.is_in_package(package))
            .cloned()
            .collect()
    }

    fn implementors(&self, contract: &TypeName) -> Vec<TypeDef> {
        let Ok(types) = self.types.read() else {
            return Vec::new();
        };
        types
            .values()
            .filter(|def| !def.is_interface() && def.implements.contains(contract))
            .cloned()
            .collect()
    }

    fn resource(&self, location: &str) -> Option<PathBuf> {
        let relative = Path::new(location);
        if relative.is_absolute() {
            return None;
        }
        self.resource_roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.is_file())
    }
}

/// Ordered composition of code spaces; the first layer that knows a type wins.
#[derive(Clone, Default)]
pub struct LayeredCodeSpace {
    layers: Vec<Arc<dyn CodeSpace>>,
}

impl LayeredCodeSpace {
    /// Compose layers in lookup order.
    #[must_use]
    pub fn new(layers: Vec<Arc<dyn CodeSpace>>) -> Self {
        Self { layers }
    }
}

impl std::fmt::Debug for LayeredCodeSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredCodeSpace")
            .field("layers", &self.label())
            .finish()
    }
}

impl CodeSpace for LayeredCodeSpace {
    fn label(&self) -> String {
        self.layers
            .iter()
            .map(|l| l.label())
            .collect::<Vec<_>>()
            .join(" > ")
    }

    fn resolve(&self, name: &TypeName) -> Option<TypeDef> {
        self.layers.iter().find_map(|layer| layer.resolve(name))
    }

    fn types_in_package(&self, package: &str) -> Vec<TypeDef> {
        let mut seen: BTreeMap<TypeName, TypeDef> = BTreeMap::new();
        for layer in &self.layers {
            for def in layer.types_in_package(package) {
                seen.entry(def.name.clone()).or_insert(def);
            }
        }
        seen.into_values().collect()
    }

    fn implementors(&self, contract: &TypeName) -> Vec<TypeDef> {
        let mut seen: BTreeMap<TypeName, TypeDef> = BTreeMap::new();
        for layer in &self.layers {
            for def in layer.implementors(contract) {
                seen.entry(def.name.clone()).or_insert(def);
            }
        }
        seen.into_values().collect()
    }

    fn resource(&self, location: &str) -> Option<PathBuf> {
        self.layers.iter().find_map(|layer| layer.resource(location))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::component::MethodSignature;

    struct Unit(TypeName);

    impl Component for Unit {
        fn type_name(&self) -> &TypeName {
            &self.0
        }
        fn methods(&self) -> &[MethodSignature] {
            &[]
        }
        fn invoke(&self, _: &MethodSignature, _: Vec<Value>) -> CoreResult<Value> {
            Ok(Value::Null)
        }
    }

    fn tn(s: &str) -> TypeName {
        TypeName::new(s).unwrap()
    }

    fn concrete(name: &str) -> TypeDef {
        let type_name = tn(name);
        let captured = type_name.clone();
        TypeDef::component(type_name, move || -> CoreResult<Arc<dyn Component>> {
            Ok(Arc::new(Unit(captured.clone())))
        })
    }

    #[test]
    fn catalog_lists_sub_packages() {
        let catalog = TypeCatalog::new("host");
        catalog.register(concrete("a.b.One")).unwrap();
        catalog.register(concrete("a.b.c.Two")).unwrap();
        catalog.register(concrete("a.bx.Three")).unwrap();

        let names: Vec<_> = catalog
            .types_in_package("a.b")
            .into_iter()
            .map(|d| d.name.to_string())
            .collect();
        assert_eq!(names, vec!["a.b.One", "a.b.c.Two"]);
    }

    #[test]
    fn first_layer_wins() {
        let unit = Arc::new(TypeCatalog::new("unit"));
        unit.register(concrete("a.Shared").implementing(tn("a.Api")))
            .unwrap();
        let host = Arc::new(TypeCatalog::new("host"));
        host.register(concrete("a.Shared")).unwrap();
        host.register(TypeDef::interface(Contract::new(tn("a.Api"))))
            .unwrap();

        let layered = LayeredCodeSpace::new(vec![unit as Arc<dyn CodeSpace>, host]);
        let shared = layered.resolve(&tn("a.Shared")).unwrap();
        assert!(shared.is_assignable_to(&tn("a.Api")));
        assert!(layered.resolve(&tn("a.Api")).unwrap().is_interface());
        assert_eq!(layered.types_in_package("a").len(), 2);
        assert_eq!(layered.implementors(&tn("a.Api")).len(), 1);
        assert_eq!(layered.label(), "unit > host");
    }

    #[test]
    fn resources_resolve_under_roots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("feature.wasm"), b"\0asm").unwrap();
        let catalog = TypeCatalog::new("host").with_resource_root(dir.path());

        assert_eq!(
            catalog.resource("feature.wasm"),
            Some(dir.path().join("feature.wasm"))
        );
        assert_eq!(catalog.resource("missing.wasm"), None);
    }
}
