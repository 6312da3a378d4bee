//! The lifecycle-managed [`Index`].
//!
//! An index is created closed. `open` loads its file (if any) into the
//! configured backend, mutations happen in memory, and `save`/`close` write
//! a bincode snapshot back. `destroy` deletes the file; a destroyed index
//! can only be opened again with `create`.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use rod_types::IndexKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BtreeBackend, HashBackend, IndexBackend};
use crate::codec::{Decode, Encode};
use crate::error::{IndexError, IndexResult};

/// Lazy sequence of raw `(key, value)` pairs.
pub type Pairs<'a> = Box<dyn Iterator<Item = (&'a [u8], &'a [u8])> + 'a>;

/// Lazy sequence of the decoded values of one key.
pub struct EachFor<'a, V> {
    values: std::slice::Iter<'a, Vec<u8>>,
    _decode: PhantomData<fn() -> V>,
}

impl<V: Decode> Iterator for EachFor<'_, V> {
    type Item = IndexResult<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.values.next().map(|v| V::decode(v))
    }
}

/// Lazy sequence of decoded `(key, value)` pairs.
pub struct EachDecoded<'a, K, V> {
    pairs: Pairs<'a>,
    _decode: PhantomData<fn() -> (K, V)>,
}

impl<K: Decode, V: Decode> Iterator for EachDecoded<'_, K, V> {
    type Item = IndexResult<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (k, v) = self.pairs.next()?;
        Some(K::decode(k).and_then(|k| Ok((k, V::decode(v)?))))
    }
}

/// Lifecycle state of an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexState {
    Closed,
    Open,
    Destroyed,
}

/// On-disk snapshot of an index.
#[derive(Serialize, Deserialize)]
struct IndexFile {
    kind: IndexKind,
    entries: Vec<(Vec<u8>, Vec<Vec<u8>>)>,
}

/// Validate an index kind taken from configuration.
///
/// Only the strings `"hash"` and `"btree"` are accepted; null, numeric and
/// any other values fail with [`IndexError::Config`].
pub fn kind_from_config(value: &serde_json::Value) -> IndexResult<IndexKind> {
    match value {
        serde_json::Value::Null => Err(IndexError::Config("index kind is null".into())),
        serde_json::Value::Number(n) => {
            Err(IndexError::Config(format!("numeric index kind: {n}")))
        }
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| IndexError::Config(format!("unknown index kind: {s}"))),
        other => Err(IndexError::Config(format!("invalid index kind: {other}"))),
    }
}

fn new_backend(kind: IndexKind) -> Box<dyn IndexBackend> {
    match kind {
        IndexKind::Hash => Box::new(HashBackend::default()),
        IndexKind::Btree => Box::new(BtreeBackend::default()),
    }
}

/// Key-value index with multiple values per key.
pub struct Index {
    name: String,
    kind: IndexKind,
    path: Option<PathBuf>,
    state: IndexState,
    backend: Box<dyn IndexBackend>,
}

impl Index {
    /// Create a closed index backed by a file at `path`.
    pub fn new(name: impl Into<String>, kind: IndexKind, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            path: Some(path.into()),
            state: IndexState::Closed,
            backend: new_backend(kind),
        }
    }

    /// Create a closed index that never touches the filesystem.
    pub fn in_memory(name: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            name: name.into(),
            kind,
            path: None,
            state: IndexState::Closed,
            backend: new_backend(kind),
        }
    }

    /// Create a closed index whose kind comes from a configuration value.
    pub fn from_config(
        name: impl Into<String>,
        kind: &serde_json::Value,
        path: Option<&Path>,
    ) -> IndexResult<Self> {
        let kind = kind_from_config(kind)?;
        Ok(match path {
            Some(path) => Self::new(name, kind, path),
            None => Self::in_memory(name, kind),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == IndexState::Open
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Open the index.
    ///
    /// - `create`: allow starting from an empty index when no file exists
    ///   (and reopening a destroyed index).
    /// - `truncate`: discard every stored pair.
    /// - `cache_size`: number of keys to pre-size the backend for.
    pub fn open(&mut self, create: bool, truncate: bool, cache_size: usize) -> IndexResult<()> {
        match self.state {
            IndexState::Open => return Err(IndexError::AlreadyOpen(self.name.clone())),
            IndexState::Destroyed if !create => {
                return Err(IndexError::Destroyed(self.name.clone()))
            }
            _ => {}
        }

        match self.path.clone() {
            Some(path) => {
                if !path.exists() && !create {
                    return Err(IndexError::FileNotFound(path));
                }
                self.backend = new_backend(self.kind);
                self.backend.reserve(cache_size);
                if path.exists() && !truncate {
                    self.load(path)?;
                }
            }
            // in-memory pairs survive close/open
            None => {
                if truncate {
                    self.backend.clear();
                }
                self.backend.reserve(cache_size);
            }
        }

        self.state = IndexState::Open;
        debug!(index = %self.name, kind = %self.kind, keys = self.backend.len(), "index opened");
        Ok(())
    }

    /// Write the index and close it. Closing a closed index is a no-op.
    pub fn close(&mut self) -> IndexResult<()> {
        if self.state != IndexState::Open {
            return Ok(());
        }
        self.flush()?;
        self.state = IndexState::Closed;
        debug!(index = %self.name, "index closed");
        Ok(())
    }

    /// Flush the index and transition to closed. Fails if not open.
    pub fn save(&mut self) -> IndexResult<()> {
        self.ensure_open()?;
        self.close()
    }

    /// Remove the index file and every pair. The index can only be opened
    /// again with `create`.
    pub fn destroy(&mut self) -> IndexResult<()> {
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        self.backend.clear();
        self.state = IndexState::Destroyed;
        debug!(index = %self.name, "index destroyed");
        Ok(())
    }

    /// Write a snapshot without closing.
    pub fn flush(&self) -> IndexResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = IndexFile {
            kind: self.kind,
            entries: self
                .backend
                .iter()
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .collect(),
        };
        let bytes =
            bincode::serialize(&file).map_err(|e| IndexError::Serialization(e.to_string()))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn load(&mut self, path: PathBuf) -> IndexResult<()> {
        let bytes = fs::read(&path)?;
        let file: IndexFile =
            bincode::deserialize(&bytes).map_err(|e| IndexError::Serialization(e.to_string()))?;
        if file.kind != self.kind {
            return Err(IndexError::Config(format!(
                "{} was written as a {} index, opened as {}",
                path.display(),
                file.kind,
                self.kind
            )));
        }
        for (key, values) in file.entries {
            for value in values {
                self.backend.put(key.clone(), value);
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> IndexResult<()> {
        match self.state {
            IndexState::Open => Ok(()),
            IndexState::Closed => Err(IndexError::NotOpen(self.name.clone())),
            IndexState::Destroyed => Err(IndexError::Destroyed(self.name.clone())),
        }
    }

    // ---------------------------------------------------------------
    // Pairs
    // ---------------------------------------------------------------

    /// Append `value` under `key`, after any values already stored.
    pub fn put<K, V>(&mut self, key: &K, value: &V) -> IndexResult<()>
    where
        K: Encode + ?Sized,
        V: Encode + ?Sized,
    {
        self.ensure_open()?;
        self.backend.put(key.encode(), value.encode());
        Ok(())
    }

    /// Replace every value of `key` with `value`.
    pub fn set<K, V>(&mut self, key: &K, value: &V) -> IndexResult<()>
    where
        K: Encode + ?Sized,
        V: Encode + ?Sized,
    {
        self.ensure_open()?;
        let key = key.encode();
        self.backend.remove(&key);
        self.backend.put(key, value.encode());
        Ok(())
    }

    /// First value stored under `key`.
    pub fn get_first<K, V>(&self, key: &K) -> IndexResult<V>
    where
        K: Encode + ?Sized,
        V: Decode,
    {
        self.ensure_open()?;
        let encoded = key.encode();
        match self.backend.values(&encoded).and_then(|v| v.first()) {
            Some(value) => V::decode(value),
            None => Err(IndexError::KeyMissing(
                String::from_utf8_lossy(&encoded).into_owned(),
            )),
        }
    }

    /// Returns `true` if at least one value is stored under `key`.
    pub fn contains<K: Encode + ?Sized>(&self, key: &K) -> IndexResult<bool> {
        self.ensure_open()?;
        Ok(self
            .backend
            .values(&key.encode())
            .is_some_and(|v| !v.is_empty()))
    }

    /// Every value of `key` in storage order.
    ///
    /// The iterator is lazy; calling `each_for` again starts over.
    pub fn each_for<K, V>(&self, key: &K) -> IndexResult<EachFor<'_, V>>
    where
        K: Encode + ?Sized,
        V: Decode,
    {
        self.ensure_open()?;
        let values = self.backend.values(&key.encode()).unwrap_or(&[]);
        Ok(EachFor {
            values: values.iter(),
            _decode: PhantomData,
        })
    }

    /// Every `(key, value)` pair. The ordered variant yields keys in byte
    /// order; values of one key come out in storage order.
    pub fn each(&self) -> IndexResult<Pairs<'_>> {
        self.ensure_open()?;
        Ok(Box::new(self.backend.iter().flat_map(|(k, values)| {
            values.iter().map(move |v| (k, v.as_slice()))
        })))
    }

    /// Decoded form of [`Index::each`].
    pub fn each_decoded<K, V>(&self) -> IndexResult<EachDecoded<'_, K, V>>
    where
        K: Decode,
        V: Decode,
    {
        Ok(EachDecoded {
            pairs: self.each()?,
            _decode: PhantomData,
        })
    }

    /// Remove every value of `key`. Returns `true` if the key existed.
    pub fn delete<K: Encode + ?Sized>(&mut self, key: &K) -> IndexResult<bool> {
        self.ensure_open()?;
        Ok(self.backend.remove(&key.encode()).is_some())
    }

    /// Remove the first value of `key` equal to `value`; later values shift
    /// forward. Returns `true` if a value was removed.
    pub fn delete_value<K, V>(&mut self, key: &K, value: &V) -> IndexResult<bool>
    where
        K: Encode + ?Sized,
        V: Encode + ?Sized,
    {
        self.ensure_open()?;
        let key = key.encode();
        let value = value.encode();
        let Some(values) = self.backend.values_mut(&key) else {
            return Ok(false);
        };
        let Some(position) = values.iter().position(|v| *v == value) else {
            return Ok(false);
        };
        values.remove(position);
        if values.is_empty() {
            self.backend.remove(&key);
        }
        Ok(true)
    }

    /// Rewrite every stored value in place.
    ///
    /// `f` returns the replacement bytes, or `None` to keep the value.
    pub fn rewrite_values<F>(&mut self, mut f: F) -> IndexResult<()>
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>>,
    {
        self.ensure_open()?;
        self.backend.for_each_value_mut(&mut |value| {
            if let Some(replacement) = f(value) {
                *value = replacement;
            }
        });
        Ok(())
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    /// Total number of stored values across all keys.
    pub fn value_count(&self) -> usize {
        self.backend.iter().map(|(_, v)| v.len()).sum()
    }
}

impl Clone for Index {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            path: self.path.clone(),
            state: self.state,
            backend: self.backend.clone_box(),
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("keys", &self.backend.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_index(kind: IndexKind) -> Index {
        let mut index = Index::in_memory("test", kind);
        index.open(true, false, 16).unwrap();
        index
    }

    fn values_for(index: &Index, key: &str) -> Vec<u64> {
        index
            .each_for::<_, u64>(key)
            .unwrap()
            .collect::<IndexResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn get_first_on_missing_key_fails() {
        for kind in [IndexKind::Hash, IndexKind::Btree] {
            let index = open_index(kind);
            let err = index.get_first::<_, u64>("absent").unwrap_err();
            assert!(matches!(err, IndexError::KeyMissing(ref k) if k == "absent"));
        }
    }

    #[test]
    fn values_keep_insertion_order() {
        for kind in [IndexKind::Hash, IndexKind::Btree] {
            let mut index = open_index(kind);
            index.put("k", &10u64).unwrap();
            index.put("k", &20u64).unwrap();
            assert_eq!(values_for(&index, "k"), vec![10, 20]);
            assert_eq!(index.get_first::<_, u64>("k").unwrap(), 10);
        }
    }

    #[test]
    fn each_for_is_restartable() {
        let mut index = open_index(IndexKind::Hash);
        index.put("k", &1u64).unwrap();
        index.put("k", &2u64).unwrap();
        let mut first = index.each_for::<_, u64>("k").unwrap();
        assert_eq!(first.next().unwrap().unwrap(), 1);
        assert_eq!(values_for(&index, "k"), vec![1, 2]);
        assert!(values_for(&index, "nothing").is_empty());
    }

    #[test]
    fn ordered_each_visits_keys_in_byte_order() {
        let mut index = open_index(IndexKind::Btree);
        for key in ["bcd", "abc", "efg"] {
            index.put(key, &1u64).unwrap();
        }
        let keys: Vec<String> = index
            .each_decoded::<String, u64>()
            .unwrap()
            .map(|pair| pair.unwrap().0)
            .collect();
        assert_eq!(keys, vec!["abc", "bcd", "efg"]);
    }

    #[test]
    fn delete_single_value_shifts_the_rest() {
        for kind in [IndexKind::Hash, IndexKind::Btree] {
            let mut index = open_index(kind);
            for v in [1u64, 2, 3] {
                index.put("abc", &v).unwrap();
            }
            assert!(index.delete_value("abc", &2u64).unwrap());
            assert_eq!(values_for(&index, "abc"), vec![1, 3]);
            assert!(!index.delete_value("abc", &7u64).unwrap());

            assert!(index.delete("abc").unwrap());
            assert!(matches!(
                index.get_first::<_, u64>("abc"),
                Err(IndexError::KeyMissing(_))
            ));
        }
    }

    #[test]
    fn delete_value_removes_only_first_match() {
        let mut index = open_index(IndexKind::Hash);
        for v in [5u64, 6, 5] {
            index.put("dup", &v).unwrap();
        }
        index.delete_value("dup", &5u64).unwrap();
        assert_eq!(values_for(&index, "dup"), vec![6, 5]);
    }

    #[test]
    fn set_replaces_all_values() {
        let mut index = open_index(IndexKind::Hash);
        index.put("k", &1u64).unwrap();
        index.put("k", &2u64).unwrap();
        index.set("k", &9u64).unwrap();
        assert_eq!(values_for(&index, "k"), vec![9]);
    }

    #[test]
    fn rewrite_values_touches_every_value() {
        let mut index = open_index(IndexKind::Btree);
        index.put("a", &1u64).unwrap();
        index.put("b", &2u64).unwrap();
        index
            .rewrite_values(|v| {
                let n = u64::decode(v).ok()?;
                (n == 2).then(|| 20u64.encode())
            })
            .unwrap();
        assert_eq!(values_for(&index, "a"), vec![1]);
        assert_eq!(values_for(&index, "b"), vec![20]);
        assert_eq!(index.value_count(), 2);
    }

    #[test]
    fn factory_rejects_bad_kinds() {
        for value in [json!(null), json!(3), json!("segmented"), json!(["hash"])] {
            let err = Index::from_config("bad", &value, None).unwrap_err();
            assert!(matches!(err, IndexError::Config(_)), "accepted {value}");
        }
        let index = Index::from_config("ok", &json!("btree"), None).unwrap();
        assert_eq!(index.kind(), IndexKind::Btree);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut index = Index::in_memory("life", IndexKind::Hash);
        assert!(matches!(index.put("k", &1u64), Err(IndexError::NotOpen(_))));

        index.open(true, false, 0).unwrap();
        assert!(matches!(
            index.open(true, false, 0),
            Err(IndexError::AlreadyOpen(_))
        ));

        index.close().unwrap();
        index.close().unwrap();
        assert_eq!(index.state(), IndexState::Closed);

        index.destroy().unwrap();
        assert!(matches!(
            index.open(false, false, 0),
            Err(IndexError::Destroyed(_))
        ));
        index.open(true, false, 0).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn save_requires_open_index() {
        let mut index = Index::in_memory("save", IndexKind::Btree);
        assert!(matches!(index.save(), Err(IndexError::NotOpen(_))));
        index.open(true, false, 0).unwrap();
        index.save().unwrap();
        assert_eq!(index.state(), IndexState::Closed);
    }

    #[test]
    fn file_persistence_and_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.name.idx");

        let mut index = Index::new("users.name", IndexKind::Btree, &path);
        assert!(matches!(
            index.open(false, false, 0),
            Err(IndexError::FileNotFound(_))
        ));
        index.open(true, false, 0).unwrap();
        index.put("alice", &1u64).unwrap();
        index.put("alice", &4u64).unwrap();
        index.save().unwrap();

        let mut reopened = Index::new("users.name", IndexKind::Btree, &path);
        reopened.open(false, false, 0).unwrap();
        assert_eq!(values_for(&reopened, "alice"), vec![1, 4]);
        reopened.close().unwrap();

        reopened.open(false, true, 0).unwrap();
        assert!(reopened.is_empty());
        reopened.put("bob", &2u64).unwrap();
        assert_eq!(reopened.get_first::<_, u64>("bob").unwrap(), 2);
    }

    #[test]
    fn destroyed_file_index_needs_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.idx");
        let mut index = Index::new("gone", IndexKind::Hash, &path);
        index.open(true, false, 0).unwrap();
        index.put("k", &1u64).unwrap();
        index.close().unwrap();
        assert!(path.exists());

        index.destroy().unwrap();
        assert!(!path.exists());
        assert!(index.open(false, false, 0).is_err());
    }

    #[test]
    fn kind_mismatch_on_reopen_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kind.idx");
        let mut index = Index::new("kind", IndexKind::Hash, &path);
        index.open(true, false, 0).unwrap();
        index.close().unwrap();

        let mut other = Index::new("kind", IndexKind::Btree, &path);
        assert!(matches!(
            other.open(false, false, 0),
            Err(IndexError::Config(_))
        ));
    }
}
