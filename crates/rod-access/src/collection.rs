//! Lazy proxy over a plural association.
//!
//! A stored collection is the range `[join_offset, join_offset + size)` of
//! its owner's join index. Entries are resolved only when an element is
//! requested. Elements appended in memory follow the stored range and are
//! written out by the next save.
//!
//! Join entries are keyed by `(join_offset + local index)` encoded as a
//! big-endian `u64`; values hold the element's identifier, followed by its
//! name hash when the association is polymorphic.

use std::collections::BTreeSet;

use rod_index::{Decode, Encode, Index};
use rod_types::{NameHash, RodId};

use crate::directory::{Directory, Resolver};
use crate::error::{AccessError, AccessResult};
use crate::object::Object;
use crate::value::{Identity, Reference};

/// Which join index a stored collection lives in.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JoinSource {
    pub resource: String,
    pub association: String,
}

impl JoinSource {
    pub fn new(resource: impl Into<String>, association: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            association: association.into(),
        }
    }
}

/// Key of one join entry.
pub fn join_key(join_offset: u64, local: u64) -> Vec<u8> {
    (join_offset + local).encode()
}

/// Position encoded in a join key, or `None` for a malformed key.
pub fn join_position(key: &[u8]) -> Option<u64> {
    u64::decode(key).ok()
}

/// Value of one join entry.
pub fn join_value(rod_id: RodId, hash: Option<NameHash>) -> Vec<u8> {
    let mut value = rod_id.encode();
    if let Some(hash) = hash {
        value.extend_from_slice(&hash.get().encode());
    }
    value
}

/// Split a join value into its identifier and optional name hash.
pub fn decode_join_value(bytes: &[u8]) -> AccessResult<(RodId, Option<NameHash>)> {
    match bytes.len() {
        8 => Ok((RodId::decode(bytes)?, None)),
        16 => Ok((
            RodId::decode(&bytes[..8])?,
            NameHash::from_raw(u64::decode(&bytes[8..])?),
        )),
        n => Err(AccessError::InvalidArgument(format!(
            "join value of {n} bytes"
        ))),
    }
}

/// Read one join entry and resolve the element's resource.
///
/// `target` is the association's fixed target; `None` resolves the element
/// through the stored name hash.
pub fn read_join_entry(
    index: &Index,
    target: Option<&str>,
    join_offset: u64,
    local: u64,
    resolver: &dyn Resolver,
) -> AccessResult<Option<Reference>> {
    let key = join_key(join_offset, local);
    if !index.contains(&key)? {
        return Ok(None);
    }
    let value: Vec<u8> = index.get_first(&key)?;
    let (rod_id, hash) = decode_join_value(&value)?;
    let resource = match (target, hash) {
        (Some(name), _) => resolver
            .resource(name)
            .ok_or_else(|| AccessError::UnknownResource(name.to_string()))?,
        (None, Some(hash)) => resolver
            .resource_by_hash(hash)
            .ok_or(AccessError::UnknownNameHash(hash))?,
        (None, None) => {
            return Err(AccessError::NotPersisted(format!(
                "{} element {local}",
                index.name()
            )))
        }
    };
    if rod_id.is_null() {
        return Err(AccessError::NotPersisted(format!(
            "{} element {local}",
            resource.name()
        )));
    }
    Ok(Some(Reference::stored(resource, rod_id)))
}

/// Lazy view over the elements of a plural association.
///
/// `==` compares the proxies themselves (join range, source and appended
/// references), not the elements behind them. Use [`Collection::equals`]
/// to compare resolved elements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Collection {
    target: Option<String>,
    stored: u64,
    join_offset: u64,
    source: Option<JoinSource>,
    appended: Vec<Reference>,
}

impl Collection {
    /// Empty collection of `target` elements; `None` accepts any resource.
    pub fn new(target: Option<String>) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Collection backed by `size` entries of a join index.
    pub fn from_join(target: Option<String>, source: JoinSource, size: u64, join_offset: u64) -> Self {
        Self {
            target,
            stored: size,
            join_offset,
            source: Some(source),
            appended: Vec::new(),
        }
    }

    /// Unsaved collection holding `references` in order.
    pub fn from_references(target: Option<String>, references: Vec<Reference>) -> Self {
        Self {
            target,
            appended: references,
            ..Self::default()
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.target.is_none()
    }

    /// Number of elements, stored and appended.
    pub fn size(&self) -> u64 {
        self.stored + self.appended.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn join_offset(&self) -> u64 {
        self.join_offset
    }

    pub fn source(&self) -> Option<&JoinSource> {
        self.source.as_ref()
    }

    /// Number of elements backed by the join index.
    pub fn stored_len(&self) -> u64 {
        self.stored
    }

    /// Elements appended since the collection was loaded.
    pub fn appended(&self) -> &[Reference] {
        &self.appended
    }

    /// Whether saving must write new join entries.
    pub fn is_dirty(&self) -> bool {
        !self.appended.is_empty()
    }

    pub fn append(&mut self, object: &Object) {
        self.appended.push(object.reference());
    }

    pub fn append_reference(&mut self, reference: Reference) {
        self.appended.push(reference);
    }

    /// Replace appended references to objects that have been stored since
    /// they were appended. `stored_as` yields the identifier an object got.
    pub fn refresh_appended<F>(&mut self, mut stored_as: F) -> usize
    where
        F: FnMut(&Reference) -> Option<RodId>,
    {
        let mut refreshed = 0;
        for reference in &mut self.appended {
            if reference.is_persisted() {
                continue;
            }
            if let Some(rod_id) = stored_as(reference) {
                *reference = Reference::stored(reference.resource().clone(), rod_id);
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Rebind to the join range written by a save.
    pub fn mark_saved(&mut self, source: JoinSource, join_offset: u64) {
        self.stored = self.size();
        self.join_offset = join_offset;
        self.source = Some(source);
        self.appended.clear();
    }

    /// Reference at local index `i`, or `None` past the end.
    pub fn reference(&self, i: u64, directory: &dyn Directory) -> AccessResult<Option<Reference>> {
        if i < self.stored {
            let Some(source) = &self.source else {
                return Ok(None);
            };
            return directory.join_entry(source, self.join_offset, i);
        }
        Ok(self.appended.get((i - self.stored) as usize).cloned())
    }

    /// Load the element at local index `i`.
    pub fn get(&self, i: u64, directory: &dyn Directory) -> AccessResult<Option<Object>> {
        match self.reference(i, directory)? {
            Some(reference) if reference.is_persisted() => {
                Ok(Some(directory.find_by_rod_id(&reference)?))
            }
            Some(reference) => Err(AccessError::NotPersisted(reference.resource().name().to_string())),
            None => Ok(None),
        }
    }

    /// Lazily resolve every element reference in order.
    pub fn iter<'a>(&'a self, directory: &'a dyn Directory) -> Iter<'a> {
        Iter {
            collection: self,
            directory,
            next: 0,
        }
    }

    pub fn references(&self, directory: &dyn Directory) -> AccessResult<Vec<Reference>> {
        self.iter(directory).collect()
    }

    /// Identifiers of every stored element, in order.
    pub fn ids(&self, directory: &dyn Directory) -> AccessResult<Vec<RodId>> {
        self.iter(directory)
            .map(|r| r.map(|r| r.rod_id()))
            .collect()
    }

    pub fn contains(&self, reference: &Reference, directory: &dyn Directory) -> AccessResult<bool> {
        for element in self.iter(directory) {
            if element? == *reference {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Number of distinct elements present in both collections.
    pub fn intersection(&self, other: &Collection, directory: &dyn Directory) -> AccessResult<usize> {
        let mine = self.identities(directory)?;
        let theirs = other.identities(directory)?;
        Ok(mine.intersection(&theirs).count())
    }

    /// Number of distinct elements present in either collection.
    pub fn union(&self, other: &Collection, directory: &dyn Directory) -> AccessResult<usize> {
        let mut mine = self.identities(directory)?;
        mine.extend(other.identities(directory)?);
        Ok(mine.len())
    }

    /// Ordered comparison of the resolved elements.
    pub fn equals(&self, other: &Collection, directory: &dyn Directory) -> AccessResult<bool> {
        if self.size() != other.size() {
            return Ok(false);
        }
        for (a, b) in self.iter(directory).zip(other.iter(directory)) {
            if a? != b? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Resolve every stored element into memory and detach from the join
    /// index, so the collection can be saved under another owner.
    pub fn materialize(&mut self, directory: &dyn Directory) -> AccessResult<()> {
        let references = self.references(directory)?;
        self.stored = 0;
        self.join_offset = 0;
        self.source = None;
        self.appended = references;
        Ok(())
    }

    fn identities(&self, directory: &dyn Directory) -> AccessResult<BTreeSet<Identity>> {
        self.iter(directory)
            .map(|r| r.map(|r| r.identity()))
            .collect()
    }
}

/// Iterator returned by [`Collection::iter`].
pub struct Iter<'a> {
    collection: &'a Collection,
    directory: &'a dyn Directory,
    next: u64,
}

impl Iterator for Iter<'_> {
    type Item = AccessResult<Reference>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.collection.size() {
            let i = self.next;
            self.next += 1;
            match self.collection.reference(i, self.directory) {
                Ok(Some(reference)) => return Some(Ok(reference)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.collection.size().saturating_sub(self.next) as usize;
        (0, Some(remaining))
    }
}
