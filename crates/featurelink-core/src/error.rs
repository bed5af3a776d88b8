//! Core error types.

use crate::component::MethodSignature;

/// Errors from type resolution, registry and component operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A type name is empty or has an empty segment.
    #[error("invalid type name: {0:?}")]
    InvalidTypeName(String),

    /// The type cannot be resolved in the code space in use.
    #[error("type not found: {0}")]
    TypeNotFound(String),

    /// The type is a contract or otherwise has no factory.
    #[error("type is not instantiable: {0}")]
    NotInstantiable(String),

    /// A binding with this name already exists in the registry scope.
    #[error("binding already registered: {0}")]
    DuplicateBinding(String),

    /// More than one binding satisfies a lookup by type.
    #[error("expected a single binding of type {type_name}, found {count}")]
    AmbiguousType {
        /// The requested type.
        type_name: String,
        /// Number of matching bindings.
        count: usize,
    },

    /// The registry has been closed.
    #[error("registry closed: {0}")]
    Closed(String),

    /// Neither the runtime type nor the contract provides the method.
    #[error("method {method} not found on {type_name}")]
    MethodNotFound {
        /// The runtime type the call was made against.
        type_name: String,
        /// The requested signature.
        method: MethodSignature,
    },

    /// An internal lock was poisoned by a panicking holder.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    /// A component failed while constructing or executing a call.
    #[error("invocation failed: {0}")]
    Invocation(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
