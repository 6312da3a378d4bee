use std::fs;
use std::path::{Path, PathBuf};

use rod_types::NameHash;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::Container;

const MAGIC: &[u8; 4] = b"ROD1";

/// Header: magic + element size (u32) + element count (u64) + body CRC32 (u32).
const HEADER_SIZE: usize = 4 + 4 + 8 + 4;

/// Fixed-size record container with a per-slot owner table.
///
/// Several resources may share one container (a resource family); the owner
/// table records which resource's name hash occupies each slot, with `0`
/// meaning the slot has been allocated but not yet claimed.
///
/// On-disk format:
/// ```text
/// [4 bytes: "ROD1"]
/// [4 bytes: element size (LE u32)]
/// [8 bytes: element count (LE u64)]
/// [4 bytes: CRC32 of body (LE u32)]
/// [count * 8 bytes: owner tags (LE u64)]
/// [count * element size bytes: records]
/// ```
#[derive(Clone)]
pub struct RecordContainer {
    name: String,
    path: Option<PathBuf>,
    element_size: usize,
    owners: Vec<u64>,
    data: Vec<u8>,
}

impl RecordContainer {
    /// Create an empty container that is never written to disk.
    pub fn in_memory(name: impl Into<String>, element_size: usize) -> Self {
        Self {
            name: name.into(),
            path: None,
            element_size,
            owners: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Open the container file at `path`, or start an empty one if the file
    /// does not exist yet.
    pub fn open(path: &Path, name: impl Into<String>, element_size: usize) -> StoreResult<Self> {
        let name = name.into();
        if !path.exists() {
            debug!(container = %name, path = %path.display(), "new container");
            return Ok(Self {
                name,
                path: Some(path.to_path_buf()),
                element_size,
                owners: Vec::new(),
                data: Vec::new(),
            });
        }

        let raw = fs::read(path)?;
        if raw.len() < HEADER_SIZE || &raw[0..4] != MAGIC {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: "missing header".into(),
            });
        }
        let stored_size = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
        if stored_size != element_size {
            return Err(StoreError::ElementSizeMismatch {
                path: path.to_path_buf(),
                stored: stored_size,
                expected: element_size,
            });
        }
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&raw[8..16]);
        let stored_count = u64::from_le_bytes(count_bytes);
        let expected_crc = u32::from_le_bytes([raw[16], raw[17], raw[18], raw[19]]);

        let body = &raw[HEADER_SIZE..];
        let count = usize::try_from(stored_count).ok();
        let body_len = count.and_then(|count| count.checked_mul(8 + element_size));
        let Some((count, body_len)) = count.zip(body_len) else {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("record count {stored_count} is out of range"),
            });
        };
        if body.len() != body_len {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("body length {} does not match {count} records", body.len()),
            });
        }
        if crc32fast::hash(body) != expected_crc {
            return Err(StoreError::ChecksumMismatch(path.to_path_buf()));
        }

        let (owner_bytes, data) = body.split_at(count * 8);
        let owners = owner_bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_le_bytes(word)
            })
            .collect();

        debug!(container = %name, count, "container loaded");
        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            element_size,
            owners,
            data: data.to_vec(),
        })
    }

    /// Write the container to its file. In-memory containers are left alone.
    pub fn flush(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut body = Vec::with_capacity(self.owners.len() * 8 + self.data.len());
        for owner in &self.owners {
            body.extend_from_slice(&owner.to_le_bytes());
        }
        body.extend_from_slice(&self.data);

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.element_size as u32).to_le_bytes());
        out.extend_from_slice(&(self.owners.len() as u64).to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        out.extend_from_slice(&body);
        fs::write(path, out)?;

        debug!(container = %self.name, count = self.owners.len(), "container flushed");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Allocate one record owned by `owner` and return its offset.
    pub fn allocate(&mut self, owner: NameHash) -> StoreResult<u64> {
        let offset = self.allocate_elements(1)?;
        self.owners[offset as usize] = owner.get();
        Ok(offset)
    }

    /// Owner of the record at `offset`; `None` if unclaimed.
    pub fn owner(&self, offset: u64) -> StoreResult<Option<NameHash>> {
        self.check_offset(offset)?;
        Ok(NameHash::from_raw(self.owners[offset as usize]))
    }

    /// Tag the record at `offset` with an owner.
    pub fn set_owner(&mut self, offset: u64, owner: Option<NameHash>) -> StoreResult<()> {
        self.check_offset(offset)?;
        self.owners[offset as usize] = owner.map(|o| o.get()).unwrap_or(0);
        Ok(())
    }

    /// Owner of every slot, in offset order.
    pub fn owner_table(&self) -> Vec<Option<NameHash>> {
        self.owners.iter().map(|&o| NameHash::from_raw(o)).collect()
    }

    /// Offsets of every record owned by `owner`, ascending.
    pub fn offsets_of(&self, owner: NameHash) -> Vec<u64> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, o)| **o == owner.get())
            .map(|(i, _)| i as u64)
            .collect()
    }

    /// Exchange two records together with their owner tags.
    pub fn swap(&mut self, a: u64, b: u64) -> StoreResult<()> {
        self.check_offset(a)?;
        self.check_offset(b)?;
        if a == b {
            return Ok(());
        }
        let record_a = self.read_record(a)?;
        let record_b = self.read_record(b)?;
        self.write_record(a, &record_b)?;
        self.write_record(b, &record_a)?;
        self.owners.swap(a as usize, b as usize);
        Ok(())
    }

    fn check_offset(&self, offset: u64) -> StoreResult<()> {
        let count = self.element_count();
        if offset >= count {
            return Err(StoreError::OffsetOutOfBounds { offset, count });
        }
        Ok(())
    }

    fn check_slot(&self, field_offset: usize, len: usize) -> StoreResult<()> {
        if field_offset + len > self.element_size {
            return Err(StoreError::SlotOutOfBounds {
                field_offset,
                len,
                element_size: self.element_size,
            });
        }
        Ok(())
    }
}

impl Container for RecordContainer {
    fn element_size(&self) -> usize {
        self.element_size
    }

    fn element_count(&self) -> u64 {
        self.owners.len() as u64
    }

    fn allocate_elements(&mut self, n: u64) -> StoreResult<u64> {
        let first = self.element_count();
        self.owners.resize(self.owners.len() + n as usize, 0);
        self.data
            .resize(self.data.len() + n as usize * self.element_size, 0);
        Ok(first)
    }

    fn read_slot(&self, offset: u64, field_offset: usize, len: usize) -> StoreResult<&[u8]> {
        self.check_offset(offset)?;
        self.check_slot(field_offset, len)?;
        let start = offset as usize * self.element_size + field_offset;
        Ok(&self.data[start..start + len])
    }

    fn write_slot(&mut self, offset: u64, field_offset: usize, data: &[u8]) -> StoreResult<()> {
        self.check_offset(offset)?;
        self.check_slot(field_offset, data.len())?;
        let start = offset as usize * self.element_size + field_offset;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl std::fmt::Debug for RecordContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordContainer")
            .field("name", &self.name)
            .field("element_size", &self.element_size)
            .field("element_count", &self.owners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_round_trip_at_field_offsets() {
        let mut container = RecordContainer::in_memory("User", 24);
        let offset = container.allocate(NameHash::derive("User")).unwrap();
        container.write_i64(offset, 0, -42).unwrap();
        container.write_u64(offset, 8, u64::MAX).unwrap();
        container.write_f64(offset, 16, 3.5).unwrap();

        assert_eq!(container.read_i64(offset, 0).unwrap(), -42);
        assert_eq!(container.read_u64(offset, 8).unwrap(), u64::MAX);
        assert_eq!(container.read_f64(offset, 16).unwrap(), 3.5);
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let mut container = RecordContainer::in_memory("User", 8);
        assert!(matches!(
            container.read_u64(0, 0),
            Err(StoreError::OffsetOutOfBounds { .. })
        ));
        container.allocate_elements(1).unwrap();
        assert!(matches!(
            container.read_u64(0, 4),
            Err(StoreError::SlotOutOfBounds { .. })
        ));
    }

    #[test]
    fn owner_tags_follow_swaps() {
        let a = NameHash::derive("A");
        let b = NameHash::derive("B");
        let mut container = RecordContainer::in_memory("family", 8);
        let first = container.allocate(a).unwrap();
        let second = container.allocate(b).unwrap();
        container.write_u64(first, 0, 1).unwrap();
        container.write_u64(second, 0, 2).unwrap();

        container.swap(first, second).unwrap();

        assert_eq!(container.owner(first).unwrap(), Some(b));
        assert_eq!(container.read_u64(first, 0).unwrap(), 2);
        assert_eq!(container.offsets_of(a), vec![1]);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("User.dat");
        let owner = NameHash::derive("User");

        let mut container = RecordContainer::open(&path, "User", 16).unwrap();
        let offset = container.allocate(owner).unwrap();
        container.write_u64(offset, 8, 77).unwrap();
        container.flush().unwrap();

        let reopened = RecordContainer::open(&path, "User", 16).unwrap();
        assert_eq!(reopened.element_count(), 1);
        assert_eq!(reopened.owner(0).unwrap(), Some(owner));
        assert_eq!(reopened.read_u64(0, 8).unwrap(), 77);
    }

    #[test]
    fn element_size_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("User.dat");
        let mut container = RecordContainer::open(&path, "User", 16).unwrap();
        container.allocate_elements(2).unwrap();
        container.flush().unwrap();

        let err = RecordContainer::open(&path, "User", 24).unwrap_err();
        assert!(matches!(err, StoreError::ElementSizeMismatch { .. }));
    }

    #[test]
    fn corrupted_body_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("User.dat");
        let mut container = RecordContainer::open(&path, "User", 8).unwrap();
        container.allocate(NameHash::derive("User")).unwrap();
        container.flush().unwrap();

        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        fs::write(&path, raw).unwrap();

        let err = RecordContainer::open(&path, "User", 8).unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch(_)));
    }

    #[test]
    fn huge_record_count_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("User.dat");
        let container = RecordContainer::open(&path, "User", 8).unwrap();
        container.flush().unwrap();

        let mut raw = fs::read(&path).unwrap();
        raw[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
        fs::write(&path, raw).unwrap();

        let err = RecordContainer::open(&path, "User", 8).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
