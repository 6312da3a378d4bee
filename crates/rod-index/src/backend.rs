use std::collections::{BTreeMap, HashMap};

/// Storage strategy behind an [`Index`](crate::Index).
///
/// Backends store every value of a key in a `Vec`, in insertion order. They
/// differ only in key iteration order.
pub trait IndexBackend: Send + Sync {
    /// Append `value` under `key`.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// All values stored under `key`.
    fn values(&self, key: &[u8]) -> Option<&[Vec<u8>]>;

    /// Mutable access to the values stored under `key`.
    fn values_mut(&mut self, key: &[u8]) -> Option<&mut Vec<Vec<u8>>>;

    /// Remove the key and return its values.
    fn remove(&mut self, key: &[u8]) -> Option<Vec<Vec<u8>>>;

    /// Iterate over keys with their values.
    fn iter(&self) -> Box<dyn Iterator<Item = (&[u8], &[Vec<u8>])> + '_>;

    /// Visit every value mutably.
    fn for_each_value_mut(&mut self, f: &mut dyn FnMut(&mut Vec<u8>));

    fn clear(&mut self);

    /// Number of distinct keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reserve(&mut self, additional: usize);

    fn clone_box(&self) -> Box<dyn IndexBackend>;
}

/// Hash-table backend. Key iteration order is unspecified.
#[derive(Clone, Debug, Default)]
pub struct HashBackend {
    map: HashMap<Vec<u8>, Vec<Vec<u8>>>,
}

impl IndexBackend for HashBackend {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.map.entry(key).or_default().push(value);
    }

    fn values(&self, key: &[u8]) -> Option<&[Vec<u8>]> {
        self.map.get(key).map(Vec::as_slice)
    }

    fn values_mut(&mut self, key: &[u8]) -> Option<&mut Vec<Vec<u8>>> {
        self.map.get_mut(key)
    }

    fn remove(&mut self, key: &[u8]) -> Option<Vec<Vec<u8>>> {
        self.map.remove(key)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&[u8], &[Vec<u8>])> + '_> {
        Box::new(self.map.iter().map(|(k, v)| (k.as_slice(), v.as_slice())))
    }

    fn for_each_value_mut(&mut self, f: &mut dyn FnMut(&mut Vec<u8>)) {
        self.map.values_mut().flatten().for_each(|v| f(v));
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn reserve(&mut self, additional: usize) {
        self.map.reserve(additional);
    }

    fn clone_box(&self) -> Box<dyn IndexBackend> {
        Box::new(self.clone())
    }
}

/// Ordered backend. Keys iterate in lexicographic order of their bytes.
#[derive(Clone, Debug, Default)]
pub struct BtreeBackend {
    map: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
}

impl IndexBackend for BtreeBackend {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.map.entry(key).or_default().push(value);
    }

    fn values(&self, key: &[u8]) -> Option<&[Vec<u8>]> {
        self.map.get(key).map(Vec::as_slice)
    }

    fn values_mut(&mut self, key: &[u8]) -> Option<&mut Vec<Vec<u8>>> {
        self.map.get_mut(key)
    }

    fn remove(&mut self, key: &[u8]) -> Option<Vec<Vec<u8>>> {
        self.map.remove(key)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&[u8], &[Vec<u8>])> + '_> {
        Box::new(self.map.iter().map(|(k, v)| (k.as_slice(), v.as_slice())))
    }

    fn for_each_value_mut(&mut self, f: &mut dyn FnMut(&mut Vec<u8>)) {
        self.map.values_mut().flatten().for_each(|v| f(v));
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    // ordered maps have no capacity to reserve
    fn reserve(&mut self, _additional: usize) {}

    fn clone_box(&self) -> Box<dyn IndexBackend> {
        Box::new(self.clone())
    }
}
