//! Scoped service container.
//!
//! A [`Registry`] holds named singleton bindings. Lookups fall back to the
//! parent registry, so a feature's nested registry sees the host's
//! components while the host never sees the feature's unless they are
//! explicitly exposed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use crate::code_space::{CodeSpace, TypeDef, TypeKind};
use crate::component::Component;
use crate::error::{CoreError, CoreResult};
use crate::names::TypeName;

/// Produces the singleton instance for a lazy binding.
pub type Supplier = Arc<dyn Fn() -> CoreResult<Arc<dyn Component>> + Send + Sync>;

struct Binding {
    name: String,
    type_name: TypeName,
    implements: Vec<TypeName>,
    supplier: Supplier,
    instance: Mutex<Option<Arc<dyn Component>>>,
}

impl Binding {
    fn matches(&self, type_name: &TypeName) -> bool {
        &self.type_name == type_name || self.implements.contains(type_name)
    }

    fn instance(&self) -> CoreResult<Arc<dyn Component>> {
        let mut slot = self
            .instance
            .lock()
            .map_err(|_| CoreError::LockPoisoned("binding"))?;
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let created = (self.supplier)()?;
        *slot = Some(Arc::clone(&created));
        Ok(created)
    }

    fn created(&self) -> Option<Arc<dyn Component>> {
        self.instance.lock().ok().and_then(|slot| slot.clone())
    }
}

/// A named, optionally parented service container.
pub struct Registry {
    name: String,
    parent: Option<Arc<Registry>>,
    code_space: Arc<dyn CodeSpace>,
    bindings: RwLock<Vec<Arc<Binding>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("code_space", &self.code_space.label())
            .field("bindings", &self.binding_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Registry {
    /// Create a registry with no parent.
    #[must_use]
    pub fn root(name: impl Into<String>, code_space: Arc<dyn CodeSpace>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: None,
            code_space,
            bindings: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Create a registry whose lookups fall back to `parent`.
    #[must_use]
    pub fn nested(
        name: impl Into<String>,
        parent: Arc<Registry>,
        code_space: Arc<dyn CodeSpace>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: Some(parent),
            code_space,
            bindings: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent registry, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Registry>> {
        self.parent.as_ref()
    }

    /// Code space this registry resolves types in.
    #[must_use]
    pub fn code_space(&self) -> &Arc<dyn CodeSpace> {
        &self.code_space
    }

    /// Whether [`Registry::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn snapshot(&self) -> CoreResult<Vec<Arc<Binding>>> {
        self.bindings
            .read()
            .map(|b| b.clone())
            .map_err(|_| CoreError::LockPoisoned("registry"))
    }

    fn insert(&self, binding: Binding) -> CoreResult<()> {
        self.ensure_open()?;
        let mut bindings = self
            .bindings
            .write()
            .map_err(|_| CoreError::LockPoisoned("registry"))?;
        if bindings.iter().any(|b| b.name == binding.name) {
            return Err(CoreError::DuplicateBinding(binding.name));
        }
        debug!(
            registry = %self.name,
            binding = %binding.name,
            type_name = %binding.type_name,
            "Registered binding"
        );
        bindings.push(Arc::new(binding));
        Ok(())
    }

    fn bind_def(&self, name: String, def: &TypeDef) -> CoreResult<()> {
        let TypeKind::Concrete(factory) = &def.kind else {
            return Err(CoreError::NotInstantiable(def.name.to_string()));
        };
        let factory = Arc::clone(factory);
        self.insert(Binding {
            name,
            type_name: def.name.clone(),
            implements: def.implements.clone(),
            supplier: Arc::new(move || factory.create()),
            instance: Mutex::new(None),
        })
    }

    /// Bind every stereotyped concrete type found in `packages` (and their
    /// sub-packages) under its decapitalized simple name.
    ///
    /// A type reached through two overlapping packages is bound once.
    /// Returns the number of new bindings.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateBinding`] when two different types share
    /// a simple name.
    pub fn scan<S: AsRef<str>>(&self, packages: &[S]) -> CoreResult<usize> {
        self.ensure_open()?;
        let mut added = 0usize;
        for package in packages {
            let package = package.as_ref();
            for def in self.code_space.types_in_package(package) {
                if !def.stereotyped || def.is_interface() {
                    continue;
                }
                let already_bound = self
                    .snapshot()?
                    .iter()
                    .any(|b| b.type_name == def.name);
                if already_bound {
                    continue;
                }
                self.bind_def(def.name.binding_name(), &def)?;
                added = added.saturating_add(1);
            }
            debug!(registry = %self.name, package, "Scanned package");
        }
        Ok(added)
    }

    /// Bind a single type under its fully-qualified name.
    ///
    /// A contract type is satisfied by binding each of its implementors in
    /// the code space under their own fully-qualified names. Returns `false`
    /// (and logs a warning) when the type cannot be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInstantiable`] for a contract with no
    /// implementor and [`CoreError::DuplicateBinding`] if a name is taken.
    pub fn register_type(&self, type_name: &str) -> CoreResult<bool> {
        self.ensure_open()?;
        let name = TypeName::new(type_name)?;
        let Some(def) = self.code_space.resolve(&name) else {
            warn!(registry = %self.name, type_name, "Type not found, skipping");
            return Ok(false);
        };
        if !def.is_interface() {
            self.bind_def(name.to_string(), &def)?;
            return Ok(true);
        }
        let implementors = self.code_space.implementors(&name);
        if implementors.is_empty() {
            return Err(CoreError::NotInstantiable(name.to_string()));
        }
        for implementor in implementors {
            if self.contains_binding(implementor.name.as_str()) {
                continue;
            }
            self.bind_def(implementor.name.to_string(), &implementor)?;
        }
        Ok(true)
    }

    /// Register a lazily created singleton under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateBinding`] if `name` is already bound in
    /// this registry.
    pub fn register_lazy_singleton(
        &self,
        name: impl Into<String>,
        type_name: TypeName,
        supplier: Supplier,
    ) -> CoreResult<()> {
        self.insert(Binding {
            name: name.into(),
            type_name,
            implements: Vec::new(),
            supplier,
            instance: Mutex::new(None),
        })
    }

    /// Register an existing instance under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateBinding`] if `name` is already bound.
    pub fn register_instance(
        &self,
        name: impl Into<String>,
        instance: Arc<dyn Component>,
    ) -> CoreResult<()> {
        let type_name = instance.type_name().clone();
        let implements = instance.implements().to_vec();
        let supplied = Arc::clone(&instance);
        self.insert(Binding {
            name: name.into(),
            type_name,
            implements,
            supplier: Arc::new(move || -> CoreResult<Arc<dyn Component>> {
                Ok(Arc::clone(&supplied))
            }),
            instance: Mutex::new(Some(instance)),
        })
    }

    /// Eagerly create every binding's instance.
    ///
    /// # Errors
    ///
    /// Returns the first construction error.
    pub fn refresh(&self) -> CoreResult<()> {
        self.ensure_open()?;
        for binding in self.snapshot()? {
            binding.instance()?;
        }
        debug!(registry = %self.name, "Registry refreshed");
        Ok(())
    }

    /// The single instance assignable to `type_name`, searching this registry
    /// first and then its ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AmbiguousType`] when one scope holds several
    /// matches, or the construction error of the matching binding.
    pub fn get_by_type(&self, type_name: &TypeName) -> CoreResult<Option<Arc<dyn Component>>> {
        self.ensure_open()?;
        let matches: Vec<_> = self
            .snapshot()?
            .into_iter()
            .filter(|b| b.matches(type_name))
            .collect();
        match matches.as_slice() {
            [] => match &self.parent {
                Some(parent) => parent.get_by_type(type_name),
                None => Ok(None),
            },
            [single] => single.instance().map(Some),
            many => Err(CoreError::AmbiguousType {
                type_name: type_name.to_string(),
                count: many.len(),
            }),
        }
    }

    /// The instance bound under `name` here or in an ancestor.
    ///
    /// # Errors
    ///
    /// Returns the construction error of the matching binding.
    pub fn get_by_name(&self, name: &str) -> CoreResult<Option<Arc<dyn Component>>> {
        self.ensure_open()?;
        let local = self.snapshot()?.into_iter().find(|b| b.name == name);
        match (local, &self.parent) {
            (Some(binding), _) => binding.instance().map(Some),
            (None, Some(parent)) => parent.get_by_name(name),
            (None, None) => Ok(None),
        }
    }

    /// Whether `name` is bound in this registry (ancestors are not consulted).
    #[must_use]
    pub fn contains_binding(&self, name: &str) -> bool {
        self.bindings
            .read()
            .map(|b| b.iter().any(|b| b.name == name))
            .unwrap_or(false)
    }

    /// Binding names in registration order.
    #[must_use]
    pub fn binding_names(&self) -> Vec<String> {
        self.bindings
            .read()
            .map(|b| b.iter().map(|b| b.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Close the registry, running each created instance's close hook in
    /// reverse registration order. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let bindings = match self.bindings.write() {
            Ok(mut b) => std::mem::take(&mut *b),
            Err(_) => {
                warn!(registry = %self.name, "Registry lock poisoned during close");
                return;
            },
        };
        for binding in bindings.iter().rev() {
            if let Some(instance) = binding.created() {
                instance.on_close();
            }
        }
        debug!(registry = %self.name, "Registry closed");
    }
}
