use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// Self-describing value tree stored in generic-object fields.
///
/// A `Portable` is serialized with bincode, which keeps the encoding
/// compact and independent of the host platform. Maps are ordered so the
/// encoding of equal values is byte-identical.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Portable {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Portable>),
    Map(BTreeMap<String, Portable>),
}

impl Portable {
    /// Encode the value with bincode.
    pub fn encode(&self) -> TypeResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Decode a value previously produced by [`Portable::encode`].
    pub fn decode(bytes: &[u8]) -> TypeResult<Self> {
        bincode::deserialize(bytes).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Build a map value from `(key, value)` pairs.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Portable)>,
        K: Into<String>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns `true` for [`Portable::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for Portable {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for Portable {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Portable {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
