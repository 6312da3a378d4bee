//! Error types for the index crate.

use std::path::PathBuf;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No value is stored under the key.
    #[error("key missing: {0}")]
    KeyMissing(String),

    /// The configured index kind is missing or not recognized.
    #[error("invalid index configuration: {0}")]
    Config(String),

    /// `open` was called on an index that is already open.
    #[error("index {0} is already open")]
    AlreadyOpen(String),

    /// An operation was attempted on a closed index.
    #[error("index {0} is not open")]
    NotOpen(String),

    /// The index was destroyed and may only be recreated.
    #[error("index {0} was destroyed")]
    Destroyed(String),

    /// The index file does not exist and `create` was not requested.
    #[error("index file not found: {0}")]
    FileNotFound(PathBuf),

    /// A stored key or value could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Serialization or deserialization of the index file failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error while reading or writing the index file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
