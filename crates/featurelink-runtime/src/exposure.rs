//! Publishing a feature's types into the host registry.

use std::sync::Arc;

use featurelink_core::{
    Component, Contract, CoreError, CoreResult, ExposureBinding, ExposureKind, MethodSignature,
    Registry, Supplier, TypeName,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{IntegrationError, IntegrationResult};

/// A host-side stand-in for a contract, forwarding to an instance created
/// on the other side of an isolation boundary.
///
/// Each call is dispatched by signature: to the target's own method when its
/// runtime type declares one, otherwise to the contract's default body.
pub struct ForwardingProxy {
    contract: Arc<Contract>,
    signatures: Vec<MethodSignature>,
    target: Arc<dyn Component>,
}

impl ForwardingProxy {
    /// Wrap `target` behind `contract`.
    #[must_use]
    pub fn new(contract: Arc<Contract>, target: Arc<dyn Component>) -> Self {
        let signatures = contract
            .methods()
            .iter()
            .map(|m| m.signature.clone())
            .collect();
        Self {
            contract,
            signatures,
            target,
        }
    }

    /// The forwarded-to instance.
    #[must_use]
    pub fn target(&self) -> &Arc<dyn Component> {
        &self.target
    }
}

impl std::fmt::Debug for ForwardingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingProxy")
            .field("contract", self.contract.name())
            .field("target", self.target.type_name())
            .finish()
    }
}

impl Component for ForwardingProxy {
    fn type_name(&self) -> &TypeName {
        self.contract.name()
    }

    fn methods(&self) -> &[MethodSignature] {
        &self.signatures
    }

    fn invoke(&self, method: &MethodSignature, args: Vec<Value>) -> CoreResult<Value> {
        let Some(declared) = self.contract.find(method) else {
            return Err(CoreError::MethodNotFound {
                type_name: self.contract.name().to_string(),
                method: method.clone(),
            });
        };
        if self.target.declares(method) {
            return self.target.invoke(method, args);
        }
        match &declared.default {
            Some(default) => default(self.target.as_ref(), args),
            None => Err(CoreError::MethodNotFound {
                type_name: self.target.type_name().to_string(),
                method: method.clone(),
            }),
        }
    }
}

/// Expose each of `type_names` from `nested` into `host`.
///
/// Types the host cannot resolve, or that `nested` has no instance for, are
/// skipped. Per-type failures are logged and do not stop the remaining types.
pub fn expose<S: AsRef<str>>(
    host: &Registry,
    nested: &Registry,
    type_names: &[S],
) -> Vec<ExposureBinding> {
    let mut bindings = Vec::new();
    for type_name in type_names {
        let type_name = type_name.as_ref();
        match expose_one(host, nested, type_name) {
            Ok(Some(binding)) => bindings.push(binding),
            Ok(None) => {},
            Err(e) => warn!(type_name, error = %e, "Failed to expose type"),
        }
    }
    bindings
}

fn exposure_error(type_name: &str, message: impl ToString) -> IntegrationError {
    IntegrationError::Exposure {
        type_name: type_name.to_string(),
        message: message.to_string(),
    }
}

fn nested_instance(nested: &Registry, type_name: &TypeName) -> Option<Arc<dyn Component>> {
    match nested.get_by_type(type_name) {
        Ok(Some(instance)) => return Some(instance),
        Ok(None) => {},
        Err(e) => debug!(type_name = %type_name, error = %e, "Lookup by type failed, trying by name"),
    }
    nested.get_by_name(type_name.as_str()).ok().flatten()
}

fn expose_one(
    host: &Registry,
    nested: &Registry,
    type_name: &str,
) -> IntegrationResult<Option<ExposureBinding>> {
    let name = TypeName::new(type_name).map_err(|e| exposure_error(type_name, e))?;
    let Some(def) = host.code_space().resolve(&name) else {
        debug!(type_name, "Type not visible to the host, skipping exposure");
        return Ok(None);
    };
    let Some(instance) = nested_instance(nested, &name) else {
        debug!(type_name, "No instance in the feature registry, skipping exposure");
        return Ok(None);
    };

    let mut binding_name = name.binding_name();
    if host.contains_binding(&binding_name) {
        binding_name = format!("{binding_name}-{}", uuid::Uuid::new_v4());
    }

    let (kind, supplier): (ExposureKind, Supplier) = match def.contract() {
        Some(contract) => {
            let proxy: Arc<dyn Component> =
                Arc::new(ForwardingProxy::new(Arc::clone(contract), instance));
            (
                ExposureKind::Interface,
                Arc::new(move || -> CoreResult<Arc<dyn Component>> { Ok(Arc::clone(&proxy)) }),
            )
        },
        None => (
            ExposureKind::Concrete,
            Arc::new(move || -> CoreResult<Arc<dyn Component>> { Ok(Arc::clone(&instance)) }),
        ),
    };

    host.register_lazy_singleton(binding_name.clone(), name.clone(), supplier)
        .map_err(|e| exposure_error(type_name, e))?;
    info!(
        type_name,
        binding = %binding_name,
        kind = ?kind,
        "Exposed feature type to host"
    );
    Ok(Some(ExposureBinding {
        binding_name,
        source_type: name.to_string(),
        kind,
    }))
}

#[cfg(test)]
mod tests {
    use featurelink_core::{CodeSpace, TypeCatalog, TypeDef};
    use serde_json::json;

    use super::*;

    struct Greeter {
        type_name: TypeName,
        methods: Vec<MethodSignature>,
    }

    impl Component for Greeter {
        fn type_name(&self) -> &TypeName {
            &self.type_name
        }
        fn methods(&self) -> &[MethodSignature] {
            &self.methods
        }
        fn invoke(&self, method: &MethodSignature, args: Vec<Value>) -> CoreResult<Value> {
            let who = args.first().and_then(Value::as_str).unwrap_or("world");
            Ok(json!(format!("{}: hello {who}", method.name)))
        }
    }

    fn tn(s: &str) -> TypeName {
        TypeName::new(s).unwrap()
    }

    fn greet() -> MethodSignature {
        MethodSignature::new("greet", ["String"])
    }

    fn farewell() -> MethodSignature {
        MethodSignature::new("farewell", Vec::<String>::new())
    }

    fn contract() -> Contract {
        Contract::new(tn("x.Service"))
            .method(greet())
            .default_method(farewell(), |target, _| {
                Ok(json!(format!("bye from {}", target.type_name())))
            })
    }

    fn greeter(name: &str) -> Arc<dyn Component> {
        Arc::new(Greeter {
            type_name: tn(name),
            methods: vec![greet()],
        })
    }

    #[test]
    fn proxy_forwards_declared_methods_and_falls_back_to_defaults() {
        let proxy = ForwardingProxy::new(Arc::new(contract()), greeter("feature.ServiceImpl"));

        assert_eq!(proxy.type_name().as_str(), "x.Service");
        assert_eq!(
            proxy.invoke(&greet(), vec![json!("ada")]).unwrap(),
            json!("greet: hello ada")
        );
        assert_eq!(
            proxy.invoke(&farewell(), vec![]).unwrap(),
            json!("bye from feature.ServiceImpl")
        );
        assert!(matches!(
            proxy.invoke(&MethodSignature::new("greet", ["i32"]), vec![]),
            Err(CoreError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn proxy_without_body_reports_missing_method() {
        let contract = Contract::new(tn("x.Service")).method(farewell());
        let proxy = ForwardingProxy::new(Arc::new(contract), greeter("feature.ServiceImpl"));

        assert!(matches!(
            proxy.invoke(&farewell(), vec![]),
            Err(CoreError::MethodNotFound { type_name, .. }) if type_name == "feature.ServiceImpl"
        ));
    }

    fn host_with_contract() -> Arc<Registry> {
        let catalog = TypeCatalog::new("host");
        catalog.register(TypeDef::interface(contract())).unwrap();
        Registry::root("host", Arc::new(catalog))
    }

    fn nested_with(host: &Arc<Registry>, impl_name: &str) -> Arc<Registry> {
        let nested = Registry::nested("feature", Arc::clone(host), Arc::new(TypeCatalog::new("unit")));
        nested
            .register_instance(impl_name, greeter(impl_name))
            .unwrap();
        nested
    }

    #[test]
    fn unresolvable_types_are_skipped() {
        let host = host_with_contract();
        let nested = nested_with(&host, "feature.Hidden");

        assert!(expose(&host, &nested, &["feature.Hidden", "not..valid"]).is_empty());
        assert!(host.binding_names().is_empty());
        assert!(host.code_space().resolve(&tn("feature.Hidden")).is_none());
    }

    #[test]
    fn interface_is_exposed_once_as_proxy() {
        let host = host_with_contract();
        let nested = Registry::nested("feature", Arc::clone(&host), Arc::new(TypeCatalog::new("unit")));
        nested
            .register_instance("impl", Arc::new(ImplementsService(greeter("feature.ServiceImpl"))))
            .unwrap();

        let bindings = expose(&host, &nested, &["x.Service"]);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].binding_name, "service");
        assert_eq!(bindings[0].kind, ExposureKind::Interface);

        let exposed = host.get_by_name("service").unwrap().unwrap();
        assert_eq!(exposed.type_name().as_str(), "x.Service");
        assert_eq!(
            exposed.invoke(&greet(), vec![json!("bob")]).unwrap(),
            json!("greet: hello bob")
        );
    }

    #[test]
    fn colliding_binding_names_get_a_suffix() {
        let host = host_with_contract();
        for _ in 0..2 {
            let nested =
                Registry::nested("feature", Arc::clone(&host), Arc::new(TypeCatalog::new("unit")));
            nested
                .register_instance("impl", Arc::new(ImplementsService(greeter("feature.ServiceImpl"))))
                .unwrap();
            assert_eq!(expose(&host, &nested, &["x.Service"]).len(), 1);
        }

        let names = host.binding_names();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], "service");
        assert!(names[1].starts_with("service-"));
        assert!(host.get_by_name(&names[1]).unwrap().is_some());
    }

    struct ImplementsService(Arc<dyn Component>);

    impl Component for ImplementsService {
        fn type_name(&self) -> &TypeName {
            self.0.type_name()
        }
        fn implements(&self) -> &[TypeName] {
            static CONTRACTS: std::sync::OnceLock<Vec<TypeName>> = std::sync::OnceLock::new();
            CONTRACTS.get_or_init(|| vec![tn("x.Service")])
        }
        fn methods(&self) -> &[MethodSignature] {
            self.0.methods()
        }
        fn invoke(&self, method: &MethodSignature, args: Vec<Value>) -> CoreResult<Value> {
            self.0.invoke(method, args)
        }
    }
}
