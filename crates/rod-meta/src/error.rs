use thiserror::Error;

use crate::version::Version;

/// Errors from metadata handling and compatibility checks.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("invalid version tag: {0:?}")]
    InvalidVersion(String),

    /// The database was written by a library this one cannot read.
    #[error("database version {stored} is incompatible with library version {running}")]
    IncompatibleVersion { stored: Version, running: Version },

    /// A compiled resource does not match its stored descriptor.
    #[error("incompatible class {resource}: {reason}")]
    IncompatibleClass { resource: String, reason: String },

    #[error("resource not found in metadata: {0}")]
    MissingResource(String),

    #[error("invalid resource descriptor: {0}")]
    Type(#[from] rod_types::TypeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MetaResult<T> = Result<T, MetaError>;
