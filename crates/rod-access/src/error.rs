use rod_types::NameHash;
use thiserror::Error;

/// Errors from reading and writing object properties.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Null object, null required value, or an object without a record.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{resource} has no property named {property}")]
    UnknownProperty { resource: String, property: String },

    #[error("property {property} expects a {expected} value")]
    TypeMismatch {
        property: String,
        expected: &'static str,
    },

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("no resource registered for name hash {0}")]
    UnknownNameHash(NameHash),

    #[error("{0} has not been stored yet")]
    NotPersisted(String),

    #[error("no join index for {resource}.{association}")]
    MissingJoinIndex {
        resource: String,
        association: String,
    },

    #[error("record not found: {resource} #{rod_id}")]
    RecordNotFound { resource: String, rod_id: u64 },

    /// Failure reported by a [`crate::Directory`] implementation.
    #[error("lookup failed: {0}")]
    Directory(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("storage error: {0}")]
    Store(#[from] rod_store::StoreError),

    #[error("index error: {0}")]
    Index(#[from] rod_index::IndexError),

    #[error("encoding error: {0}")]
    Type(#[from] rod_types::TypeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in string field: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type AccessResult<T> = Result<T, AccessError>;
