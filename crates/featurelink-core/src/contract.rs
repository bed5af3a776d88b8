//! Capability contracts: named method tables with optional default methods.

use std::sync::Arc;

use serde_json::Value;

use crate::component::{Component, MethodSignature};
use crate::error::CoreResult;
use crate::names::TypeName;

/// A default method body, run against the instance the call targets.
pub type DefaultMethod =
    Arc<dyn Fn(&dyn Component, Vec<Value>) -> CoreResult<Value> + Send + Sync>;

/// One method of a contract.
#[derive(Clone)]
pub struct ContractMethod {
    /// The method signature.
    pub signature: MethodSignature,
    /// Body used when the runtime type does not declare the method.
    pub default: Option<DefaultMethod>,
}

impl std::fmt::Debug for ContractMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractMethod")
            .field("signature", &self.signature)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// The host's view of an interface type.
#[derive(Debug, Clone)]
pub struct Contract {
    name: TypeName,
    methods: Vec<ContractMethod>,
}

impl Contract {
    /// Create an empty contract.
    #[must_use]
    pub fn new(name: TypeName) -> Self {
        Self {
            name,
            methods: Vec::new(),
        }
    }

    /// Add an abstract method.
    #[must_use]
    pub fn method(mut self, signature: MethodSignature) -> Self {
        self.methods.push(ContractMethod {
            signature,
            default: None,
        });
        self
    }

    /// Add a method with a default body.
    #[must_use]
    pub fn default_method<F>(mut self, signature: MethodSignature, body: F) -> Self
    where
        F: Fn(&dyn Component, Vec<Value>) -> CoreResult<Value> + Send + Sync + 'static,
    {
        self.methods.push(ContractMethod {
            signature,
            default: Some(Arc::new(body)),
        });
        self
    }

    /// The contract's type name.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// All methods.
    #[must_use]
    pub fn methods(&self) -> &[ContractMethod] {
        &self.methods
    }

    /// Look up a method by signature.
    #[must_use]
    pub fn find(&self, signature: &MethodSignature) -> Option<&ContractMethod> {
        self.methods.iter().find(|m| &m.signature == signature)
    }
}
