use thiserror::Error;

/// Errors produced while building or decoding foundation types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid resource name: {0:?}")]
    InvalidName(String),

    #[error("duplicate property {property} in resource {resource}")]
    DuplicateProperty { resource: String, property: String },

    #[error("unknown field type: {0}")]
    UnknownFieldType(String),

    #[error("unknown index kind: {0}")]
    UnknownIndexKind(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;
