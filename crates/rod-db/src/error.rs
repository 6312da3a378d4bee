use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors from database and registry operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database is not open: {0}")]
    NotOpen(PathBuf),

    #[error("database is read-only: {0}")]
    ReadOnly(PathBuf),

    #[error("database already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("no database at {0}")]
    NotFound(PathBuf),

    #[error("resource not handled by this database: {0}")]
    UnknownResource(String),

    #[error("field {resource}.{field} is not indexed")]
    NotIndexed { resource: String, field: String },

    #[error("no record {resource} #{rod_id}")]
    RecordNotFound { resource: String, rod_id: u64 },

    #[error("no database registered for resource {0}")]
    NoDatabaseFor(String),

    #[error("unknown database: {0}")]
    UnknownDatabase(Uuid),

    #[error("database already registered: {0}")]
    DuplicateDatabase(Uuid),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("metadata error: {0}")]
    Meta(#[from] rod_meta::MetaError),

    #[error("access error: {0}")]
    Access(#[from] rod_access::AccessError),

    #[error("index error: {0}")]
    Index(#[from] rod_index::IndexError),

    #[error("storage error: {0}")]
    Store(#[from] rod_store::StoreError),

    #[error("arrangement error: {0}")]
    Arrange(#[from] rod_arrange::ArrangeError),

    #[error("invalid resource descriptor: {0}")]
    Type(#[from] rod_types::TypeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;
