use std::fmt;
use std::sync::Arc;

use rod_types::{Handle, Portable, Resource, RodId};

use crate::collection::Collection;

/// In-memory value of one property.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Json(serde_json::Value),
    Portable(Portable),
    Ref(Reference),
    Refs(Collection),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Refs(c) => Some(c),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Portable> for Value {
    fn from(v: Portable) -> Self {
        Self::Portable(v)
    }
}

impl From<Reference> for Value {
    fn from(v: Reference) -> Self {
        Self::Ref(v)
    }
}

impl From<Collection> for Value {
    fn from(v: Collection) -> Self {
        Self::Refs(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Pointer to a stored or soon-to-be-stored object.
///
/// A reference to an object that has no [`RodId`] yet carries the object's
/// [`Handle`] so the eventual identifier can be written back once the
/// object is stored.
#[derive(Clone)]
pub struct Reference {
    resource: Arc<Resource>,
    rod_id: RodId,
    handle: Option<Handle>,
}

/// Identity used for equality and set algebra.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Stored(String, u64),
    Pending(u64),
}

impl Reference {
    /// Reference to a record already on disk.
    pub fn stored(resource: Arc<Resource>, rod_id: RodId) -> Self {
        Self {
            resource,
            rod_id,
            handle: None,
        }
    }

    pub(crate) fn pending(resource: Arc<Resource>, handle: Handle) -> Self {
        Self {
            resource,
            rod_id: RodId::NULL,
            handle: Some(handle),
        }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn rod_id(&self) -> RodId {
        self.rod_id
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub fn is_persisted(&self) -> bool {
        !self.rod_id.is_null()
    }

    pub fn identity(&self) -> Identity {
        match self.handle {
            Some(handle) if self.rod_id.is_null() => Identity::Pending(handle.get()),
            _ => Identity::Stored(self.resource.name().to_string(), self.rod_id.get()),
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("resource", &self.resource.name())
            .field("rod_id", &self.rod_id)
            .field("handle", &self.handle)
            .finish()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.resource.name(), self.rod_id)
    }
}
