use std::path::PathBuf;

/// Errors from storage primitive operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record offset beyond the allocated elements.
    #[error("offset {offset} out of bounds (element count {count})")]
    OffsetOutOfBounds { offset: u64, count: u64 },

    /// A slot access that does not fit inside one record.
    #[error("slot {field_offset}+{len} exceeds element size {element_size}")]
    SlotOutOfBounds {
        field_offset: usize,
        len: usize,
        element_size: usize,
    },

    /// A byte range beyond the end of the byte container.
    #[error("byte range {offset}+{len} exceeds container length {size}")]
    ByteRangeOutOfBounds { offset: u64, len: u64, size: u64 },

    /// The container file was written with a different record size.
    #[error("element size mismatch in {path}: file has {stored}, expected {expected}")]
    ElementSizeMismatch {
        path: PathBuf,
        stored: usize,
        expected: usize,
    },

    /// The container file is truncated or has a bad header.
    #[error("corrupt container {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Body checksum did not match the header.
    #[error("checksum mismatch in {0}")]
    ChecksumMismatch(PathBuf),

    /// Illegal transaction state transition.
    #[error("invalid transaction state: {0}")]
    InvalidTransaction(&'static str),

    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
