//! Deferred writes against objects that have not been stored yet.
//!
//! Saving an association that points at an unsaved object writes a null
//! identifier and registers an [`Updater`] keyed by the target's resource
//! name and [`Handle`]. When that object is stored, the database takes the
//! updaters out of the queue and writes the new identifier. Taking removes
//! them, so each updater runs at most once.

use std::collections::HashMap;

use rod_types::Handle;
use tracing::debug;

/// Location that receives an identifier once it is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateTarget {
    /// A singular association slot inside a record.
    Slot {
        resource: String,
        offset: u64,
        field_offset: usize,
    },
    /// One entry of a plural association's join index. Only the leading
    /// identifier is rewritten; a trailing name hash is kept.
    Join {
        resource: String,
        association: String,
        key: Vec<u8>,
    },
}

/// A deferred identifier write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Updater {
    pub target: UpdateTarget,
}

impl Updater {
    pub fn slot(resource: impl Into<String>, offset: u64, field_offset: usize) -> Self {
        Self {
            target: UpdateTarget::Slot {
                resource: resource.into(),
                offset,
                field_offset,
            },
        }
    }

    pub fn join(resource: impl Into<String>, association: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            target: UpdateTarget::Join {
                resource: resource.into(),
                association: association.into(),
                key,
            },
        }
    }
}

/// Queue of updaters waiting for their target objects to be stored.
#[derive(Clone, Debug, Default)]
pub struct PendingUpdates {
    queue: HashMap<(String, Handle), Vec<Updater>>,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defer `updater` until the object `(resource, handle)` is stored.
    pub fn register(&mut self, resource: &str, handle: Handle, updater: Updater) {
        debug!(resource, handle = handle.get(), target = ?updater.target, "deferred update");
        self.queue
            .entry((resource.to_string(), handle))
            .or_default()
            .push(updater);
    }

    /// Remove and return every updater waiting on `(resource, handle)`.
    pub fn take(&mut self, resource: &str, handle: Handle) -> Vec<Updater> {
        self.queue
            .remove(&(resource.to_string(), handle))
            .unwrap_or_default()
    }

    /// Number of updaters waiting on `(resource, handle)`.
    pub fn waiting_on(&self, resource: &str, handle: Handle) -> usize {
        self.queue
            .get(&(resource.to_string(), handle))
            .map_or(0, Vec::len)
    }

    /// Drop every updater for which `doomed` returns true.
    pub fn discard<F>(&mut self, mut doomed: F)
    where
        F: FnMut(&Updater) -> bool,
    {
        for updaters in self.queue.values_mut() {
            updaters.retain(|u| !doomed(u));
        }
        self.queue.retain(|_, updaters| !updaters.is_empty());
    }

    /// Drop updaters that write into records of `resource`.
    pub fn discard_targets(&mut self, resource: &str) {
        self.discard(|u| match &u.target {
            UpdateTarget::Slot { resource: r, .. } | UpdateTarget::Join { resource: r, .. } => {
                r == resource
            }
        });
    }

    /// Make every updater of the join entry `from` also write `to`.
    ///
    /// A collection that grows is copied to a fresh join range; entries still
    /// waiting for their element must be filled in the new range too.
    pub fn follow_join(&mut self, resource: &str, association: &str, from: &[u8], to: &[u8]) -> usize {
        let mut followed = 0;
        for updaters in self.queue.values_mut() {
            let copies: Vec<Updater> = updaters
                .iter()
                .filter(|u| {
                    matches!(
                        &u.target,
                        UpdateTarget::Join { resource: r, association: a, key }
                            if r == resource && a == association && key.as_slice() == from
                    )
                })
                .map(|_| Updater::join(resource, association, to.to_vec()))
                .collect();
            followed += copies.len();
            updaters.extend(copies);
        }
        followed
    }

    /// Every waiting updater, for rewriting targets that moved.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Updater> {
        self.queue.values_mut().flatten()
    }

    /// Total number of waiting updaters.
    pub fn len(&self) -> usize {
        self.queue.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updaters_are_taken_exactly_once() {
        let mut pending = PendingUpdates::new();
        let handle = Handle::next();
        pending.register("Account", handle, Updater::slot("User", 0, 16));
        pending.register("Account", handle, Updater::slot("User", 4, 16));
        assert_eq!(pending.waiting_on("Account", handle), 2);

        let due = pending.take("Account", handle);
        assert_eq!(due.len(), 2);
        assert!(pending.take("Account", handle).is_empty());
        assert!(pending.is_empty());
    }

    #[test]
    fn keys_separate_resources_and_handles() {
        let mut pending = PendingUpdates::new();
        let a = Handle::next();
        let b = Handle::next();
        pending.register("Account", a, Updater::slot("User", 0, 8));
        pending.register("File", a, Updater::join("User", "files", vec![0; 16]));
        pending.register("Account", b, Updater::slot("User", 1, 8));

        assert_eq!(pending.take("Account", a).len(), 1);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.waiting_on("Account", b), 1);
    }

    #[test]
    fn discarding_targets_of_a_resource() {
        let mut pending = PendingUpdates::new();
        let a = Handle::next();
        pending.register("Account", a, Updater::slot("User", 0, 8));
        pending.register("Account", a, Updater::slot("Admin", 0, 8));
        pending.discard_targets("User");
        assert_eq!(
            pending.take("Account", a),
            vec![Updater::slot("Admin", 0, 8)]
        );
    }

    #[test]
    fn followed_join_entries_are_written_twice() {
        let mut pending = PendingUpdates::new();
        let book = Handle::next();
        let old = vec![0, 0, 0, 0, 0, 0, 0, 0];
        let new = vec![0, 0, 0, 0, 0, 0, 0, 3];
        pending.register("Book", book, Updater::join("Shelf", "books", old.clone()));
        pending.register("Book", book, Updater::slot("Shelf", 0, 8));

        assert_eq!(pending.follow_join("Shelf", "books", &old, &new), 1);
        assert_eq!(pending.follow_join("Shelf", "tags", &old, &new), 0);

        let due = pending.take("Book", book);
        assert_eq!(due.len(), 3);
        assert!(due.contains(&Updater::join("Shelf", "books", old)));
        assert!(due.contains(&Updater::join("Shelf", "books", new)));
    }

    #[test]
    fn discarding_by_predicate() {
        let mut pending = PendingUpdates::new();
        let a = Handle::next();
        pending.register("Account", a, Updater::slot("User", 0, 8));
        pending.register("Account", a, Updater::slot("User", 1, 8));
        pending.discard(|u| u.target == Updater::slot("User", 1, 8).target);
        assert_eq!(pending.len(), 1);
        pending.discard(|_| true);
        assert!(pending.is_empty());
    }
}
