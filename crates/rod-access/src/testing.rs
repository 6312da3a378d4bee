//! In-memory directory used by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use rod_index::Index;
use rod_types::{IndexKind, NameHash, Resource, ResourceBuilder, RodId};

use crate::collection::{read_join_entry, JoinSource};
use crate::directory::{Directory, Resolver};
use crate::error::{AccessError, AccessResult};
use crate::object::Object;
use crate::value::Reference;

#[derive(Default)]
pub(crate) struct MemoryDirectory {
    resources: HashMap<String, Arc<Resource>>,
    joins: HashMap<JoinSource, Index>,
    targets: HashMap<JoinSource, Option<String>>,
}

impl MemoryDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Directory with a `Book` resource and a `Shelf.books` join index.
    pub(crate) fn with_book() -> Self {
        let mut dir = Self::new();
        dir.add_named("Book");
        dir.targets
            .insert(JoinSource::new("Shelf", "books"), Some("Book".to_string()));
        dir
    }

    pub(crate) fn add(&mut self, resource: Arc<Resource>) {
        self.resources.insert(resource.name().to_string(), resource);
    }

    pub(crate) fn add_named(&mut self, name: &str) {
        let resource = ResourceBuilder::new(name).build().expect("valid name");
        self.add(Arc::new(resource));
    }

    pub(crate) fn join_index_mut(&mut self, source: &JoinSource) -> &mut Index {
        self.joins.entry(source.clone()).or_insert_with(|| {
            let mut index = Index::in_memory(
                format!("{}.{}", source.resource, source.association),
                IndexKind::Btree,
            );
            index.open(true, false, 0).expect("fresh index opens");
            index
        })
    }

    pub(crate) fn book(&self, rod_id: u64) -> Object {
        let mut book = Object::new(self.resources["Book"].clone());
        book.assign_id(RodId::new(rod_id));
        book
    }
}

impl Resolver for MemoryDirectory {
    fn resource(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources.get(name).cloned()
    }

    fn resource_by_hash(&self, hash: NameHash) -> Option<Arc<Resource>> {
        self.resources
            .values()
            .find(|r| r.name_hash() == hash)
            .cloned()
    }
}

impl Directory for MemoryDirectory {
    fn join_entry(
        &self,
        source: &JoinSource,
        join_offset: u64,
        local: u64,
    ) -> AccessResult<Option<Reference>> {
        let Some(index) = self.joins.get(source) else {
            return Ok(None);
        };
        let target = self.targets.get(source).cloned().flatten();
        read_join_entry(index, target.as_deref(), join_offset, local, self)
    }

    fn find_by_rod_id(&self, reference: &Reference) -> AccessResult<Object> {
        if !reference.is_persisted() {
            return Err(AccessError::NotPersisted(
                reference.resource().name().to_string(),
            ));
        }
        Ok(Object::with_id(
            reference.resource().clone(),
            reference.rod_id(),
        ))
    }
}
