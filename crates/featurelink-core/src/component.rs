//! Component instances and method signatures.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreResult;
use crate::names::TypeName;

/// A method identified by name and parameter type names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Method name.
    pub name: String,
    /// Parameter type names, in order.
    #[serde(default)]
    pub params: Vec<String>,
}

impl MethodSignature {
    /// Create a signature.
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

impl std::fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("type_name", self.type_name())
            .field("implements", &self.implements())
            .finish_non_exhaustive()
    }
}

/// A live instance held by a registry.
///
/// The instance may come from the host's own code or from an isolation unit;
/// callers only ever see it through this trait.
pub trait Component: Send + Sync {
    /// The runtime type of this instance.
    fn type_name(&self) -> &TypeName;

    /// Contracts this instance implements.
    fn implements(&self) -> &[TypeName] {
        &[]
    }

    /// Methods declared by the runtime type itself.
    fn methods(&self) -> &[MethodSignature];

    /// Invoke a method declared by the runtime type.
    ///
    /// # Errors
    ///
    /// Returns an error if the method is unknown or the call fails.
    fn invoke(&self, method: &MethodSignature, args: Vec<Value>) -> CoreResult<Value>;

    /// Release resources when the owning registry closes.
    fn on_close(&self) {}

    /// Whether the runtime type declares `method`.
    fn declares(&self, method: &MethodSignature) -> bool {
        self.methods().contains(method)
    }

    /// Whether the instance is of `type_name` or implements it.
    fn is_a(&self, type_name: &TypeName) -> bool {
        self.type_name() == type_name || self.implements().contains(type_name)
    }
}
