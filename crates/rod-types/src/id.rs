use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier of a stored record.
///
/// Identifiers are 1-based: the record with id `n` lives at physical offset
/// `n - 1` of its container. The value `0` is reserved as the null
/// reference and never addresses a record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RodId(u64);

impl RodId {
    /// The null reference.
    pub const NULL: RodId = RodId(0);

    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The identifier of the record stored at a physical offset.
    pub const fn from_offset(offset: u64) -> Self {
        Self(offset + 1)
    }

    /// The raw identifier value.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns `true` for the null reference.
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Physical offset of the record, or `None` for the null reference.
    pub const fn offset(&self) -> Option<u64> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0 - 1)
        }
    }
}

impl fmt::Debug for RodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RodId({})", self.0)
    }
}

impl fmt::Display for RodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RodId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stable tag identifying a resource.
///
/// Derived from the resource's qualified name with a domain-separated BLAKE3
/// hash, so the same name produces the same tag in every process. Zero is
/// never produced and marks an empty polymorphic slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameHash(u64);

impl NameHash {
    /// Derive the tag for a qualified resource name.
    pub fn derive(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"rod-resource-v1:");
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        match u64::from_le_bytes(prefix) {
            0 => Self(1),
            raw => Self(raw),
        }
    }

    /// Rebuild a tag read back from storage. Returns `None` for the empty slot.
    pub const fn from_raw(raw: u64) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The raw tag value.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({:016x})", self.0)
    }
}

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an in-memory object.
///
/// Handles exist so that a reference to an object can be recorded before
/// the object has been stored and received its [`RodId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Handle(u64);

impl Handle {
    /// Allocate a fresh handle.
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw handle value.
    pub const fn get(&self) -> u64 {
        self.0
    }
}
