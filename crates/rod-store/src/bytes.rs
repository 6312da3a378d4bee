use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Append-only container for variable-length payloads.
///
/// Values are addressed by `(offset, length)` pairs handed out by
/// [`ByteStore::append`]. Space is never reused: when a value is overwritten
/// the new bytes are appended and the old range is simply no longer
/// referenced.
#[derive(Clone, Default)]
pub struct ByteStore {
    path: Option<PathBuf>,
    bytes: Vec<u8>,
}

impl ByteStore {
    /// Create an empty store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store from `path`, starting empty if the file is absent.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let bytes = if path.exists() {
            fs::read(path)?
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), len = bytes.len(), "byte store opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            bytes,
        })
    }

    /// Write the store to its file. In-memory stores are left alone.
    pub fn flush(&self) -> StoreResult<()> {
        if let Some(path) = &self.path {
            fs::write(path, &self.bytes)?;
        }
        Ok(())
    }

    /// Append `data` at the current end and return its `(offset, length)`.
    pub fn append(&mut self, data: &[u8]) -> (u64, u64) {
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(data);
        (offset, data.len() as u64)
    }

    /// Borrow the byte range `[offset, offset + len)`.
    pub fn read_bytes(&self, offset: u64, len: u64) -> StoreResult<&[u8]> {
        let size = self.len();
        let end = offset.checked_add(len).filter(|&end| end <= size).ok_or(
            StoreError::ByteRangeOutOfBounds { offset, len, size },
        )?;
        Ok(&self.bytes[offset as usize..end as usize])
    }

    /// Total bytes ever appended, including stale ranges.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for ByteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStore")
            .field("path", &self.path)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_are_monotonic() {
        let mut store = ByteStore::in_memory();
        let first = store.append(b"hello");
        let second = store.append(b"world!");
        assert_eq!(first, (0, 5));
        assert_eq!(second, (5, 6));
        assert_eq!(store.read_bytes(5, 6).unwrap(), b"world!");
        assert_eq!(store.len(), 11);
    }

    #[test]
    fn overwriting_never_reclaims_space() {
        let mut store = ByteStore::in_memory();
        store.append(b"old value");
        let (offset, _) = store.append(b"new");
        assert_eq!(offset, 9);
        assert_eq!(store.read_bytes(0, 9).unwrap(), b"old value");
    }

    #[test]
    fn out_of_range_read_fails() {
        let mut store = ByteStore::in_memory();
        store.append(b"abc");
        assert!(matches!(
            store.read_bytes(2, 5),
            Err(StoreError::ByteRangeOutOfBounds { .. })
        ));
        assert!(store.read_bytes(3, 0).unwrap().is_empty());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("User.bytes");
        let mut store = ByteStore::open(&path).unwrap();
        store.append(b"persisted");
        store.flush().unwrap();

        let reopened = ByteStore::open(&path).unwrap();
        assert_eq!(reopened.read_bytes(0, 9).unwrap(), b"persisted");
    }
}
