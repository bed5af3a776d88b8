//! Test fixtures for common types.

use std::sync::{Arc, Once};

use featurelink_core::{
    Component, Contract, CoreResult, FeatureSpec, MethodSignature, Registry, TypeCatalog, TypeDef,
    TypeName,
};
use serde_json::{Value, json};

use crate::mocks::ScriptedComponent;

/// Parse a type name.
///
/// # Panics
///
/// Panics if `name` is not a valid type name.
#[must_use]
pub fn type_name(name: &str) -> TypeName {
    TypeName::new(name).unwrap_or_else(|e| panic!("invalid type name {name:?}: {e}"))
}

/// `greet(String)`.
#[must_use]
pub fn greet_signature() -> MethodSignature {
    MethodSignature::new("greet", ["String"])
}

/// `farewell()`.
#[must_use]
pub fn farewell_signature() -> MethodSignature {
    MethodSignature::new("farewell", Vec::<String>::new())
}

/// A contract named `name` declaring `greet(String)` and a default
/// `farewell()` that answers `"bye from <runtime type>"`.
#[must_use]
pub fn greeter_contract(name: &str) -> Contract {
    Contract::new(type_name(name))
        .method(greet_signature())
        .default_method(farewell_signature(), |target, _| {
            Ok(json!(format!("bye from {}", target.type_name())))
        })
}

/// A component implementing `contract` whose `greet` answers
/// `"<greeting>, <arg>"`.
#[must_use]
pub fn greeter(impl_name: &str, contract: &str, greeting: &str) -> ScriptedComponent {
    let greeting = greeting.to_string();
    ScriptedComponent::new(impl_name)
        .implementing(contract)
        .with_method(greet_signature(), move |args| {
            let who = args.first().and_then(Value::as_str).unwrap_or("world");
            Ok(json!(format!("{greeting}, {who}")))
        })
}

/// A stereotyped type definition creating fresh [`greeter`] instances.
#[must_use]
pub fn greeter_def(impl_name: &str, contract: &str, greeting: &str) -> TypeDef {
    let template = greeter(impl_name, contract, greeting);
    TypeDef::component(
        type_name(impl_name),
        move || -> CoreResult<Arc<dyn Component>> { Ok(Arc::new(template.clone())) },
    )
    .implementing(type_name(contract))
}

/// A root registry over a catalog holding `types`.
///
/// # Panics
///
/// Panics if a type cannot be registered.
#[must_use]
pub fn host_registry(types: impl IntoIterator<Item = TypeDef>) -> Arc<Registry> {
    let catalog = TypeCatalog::new("host");
    for def in types {
        catalog
            .register(def)
            .unwrap_or_else(|e| panic!("register host type: {e}"));
    }
    Registry::root("host", Arc::new(catalog))
}

/// A feature on `main` with the given packages.
#[must_use]
pub fn test_feature(source: &str, packages: &[&str]) -> FeatureSpec {
    packages
        .iter()
        .fold(FeatureSpec::new(source), |spec, p| spec.with_package(*p))
}

/// Install a test subscriber once per process; honours `RUST_LOG`.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
