//! Directory service over every open database of a process.
//!
//! The registry owns open [`Database`]s by id and binds each resource to the
//! database that stores it. Objects stored through the registry can hold
//! references into other databases: deferred updates waiting on an object
//! are applied in whichever database registered them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rod_access::{AccessResult, Directory, JoinSource, Object, Reference, Resolver, Updater};
use rod_types::{NameHash, Resource, RodId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{detach_collections, Database};
use crate::error::{DbError, DbResult};

/// Resources, open databases and the bindings between them.
#[derive(Default)]
pub struct Registry {
    resources: BTreeMap<String, Arc<Resource>>,
    hashes: HashMap<NameHash, String>,
    databases: HashMap<Uuid, Database>,
    bindings: HashMap<String, Uuid>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `resource` resolvable by name and by name hash.
    pub fn register_resource(&mut self, resource: Arc<Resource>) {
        let name = resource.name().to_string();
        self.hashes.insert(resource.name_hash(), name.clone());
        self.resources.insert(name, resource);
    }

    /// Take ownership of `db` and bind every resource it handles that is not
    /// bound to another database yet.
    pub fn register_database(&mut self, db: Database) -> DbResult<Uuid> {
        let id = db.id();
        if self.databases.contains_key(&id) {
            return Err(DbError::DuplicateDatabase(id));
        }
        let resources: Vec<Arc<Resource>> = db.resources().cloned().collect();
        for resource in resources {
            let name = resource.name().to_string();
            self.register_resource(resource);
            self.bindings.entry(name).or_insert(id);
        }
        info!(id = %id, path = %db.path().display(), "registered database");
        self.databases.insert(id, db);
        Ok(id)
    }

    /// Remove a database and every binding pointing at it. Resources it was
    /// bound for move to another registered database that handles them.
    pub fn remove_database(&mut self, id: Uuid) -> Option<Database> {
        let db = self.databases.remove(&id)?;
        let orphaned: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, bound)| **bound == id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in orphaned {
            self.bindings.remove(&name);
            let successor = self
                .databases
                .iter()
                .filter(|(_, other)| other.handles(&name))
                .map(|(other, _)| *other)
                .min();
            if let Some(successor) = successor {
                debug!(resource = %name, database = %successor, "rebound resource");
                self.bindings.insert(name, successor);
            }
        }
        info!(id = %id, "removed database");
        Some(db)
    }

    pub fn database(&self, id: Uuid) -> Option<&Database> {
        self.databases.get(&id)
    }

    pub fn database_mut(&mut self, id: Uuid) -> Option<&mut Database> {
        self.databases.get_mut(&id)
    }

    pub fn databases(&self) -> impl Iterator<Item = &Database> {
        self.databases.values()
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    /// Id of the database bound to `resource`.
    pub fn binding(&self, resource: &str) -> Option<Uuid> {
        self.bindings.get(resource).copied()
    }

    /// Database storing `resource`. A `hint` naming a registered database
    /// that handles the resource wins over the binding.
    pub fn database_for(&self, resource: &str, hint: Option<Uuid>) -> DbResult<&Database> {
        let id = self.resolve_id(resource, hint)?;
        self.databases
            .get(&id)
            .ok_or(DbError::UnknownDatabase(id))
    }

    fn resolve_id(&self, resource: &str, hint: Option<Uuid>) -> DbResult<Uuid> {
        if let Some(id) = hint {
            match self.databases.get(&id) {
                Some(db) if db.handles(resource) => return Ok(id),
                Some(_) => {}
                None => return Err(DbError::UnknownDatabase(id)),
            }
        }
        self.binding(resource)
            .ok_or_else(|| DbError::NoDatabaseFor(resource.to_string()))
    }

    /// Load a record from the database bound to `resource`, resolving
    /// associations across every registered database.
    pub fn load(&self, resource: &str, rod_id: RodId) -> DbResult<Object> {
        self.database_for(resource, None)?
            .load_in(resource, rod_id, self)
    }

    /// Dereference a stored reference.
    pub fn find_by_rod_id(&self, reference: &Reference) -> DbResult<Object> {
        if !reference.is_persisted() {
            return Err(rod_access::AccessError::NotPersisted(reference.to_string()).into());
        }
        self.load(reference.resource().name(), reference.rod_id())
    }

    /// Store `object` in the database bound to its resource, then apply the
    /// deferred updates every other database holds for it.
    pub fn store(&mut self, object: &mut Object) -> DbResult<Vec<Updater>> {
        let resource = object.resource().name().to_string();
        let id = self.resolve_id(&resource, None)?;
        detach_collections(object, &*self)?;

        let db = self
            .databases
            .get_mut(&id)
            .ok_or(DbError::UnknownDatabase(id))?;
        let mut due = db.store(object)?;

        let handle = object.handle();
        let rod_id = object.rod_id();
        for (other_id, other) in self.databases.iter_mut() {
            if *other_id == id || !other.is_open() {
                continue;
            }
            due.extend(other.resolve_pending(&resource, handle, rod_id)?);
        }
        Ok(due)
    }

    /// Close every database. All are attempted; the first error is returned.
    pub fn close_all(&mut self) -> DbResult<()> {
        let mut first = None;
        for (id, db) in self.databases.iter_mut() {
            if let Err(e) = db.close() {
                warn!(id = %id, error = %e, "failed to close database");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Resolver for Registry {
    fn resource(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources.get(name).cloned()
    }

    fn resource_by_hash(&self, hash: NameHash) -> Option<Arc<Resource>> {
        if let Some(name) = self.hashes.get(&hash) {
            return self.resources.get(name).cloned();
        }
        // tags recorded under an earlier name are only known to the database
        self.databases
            .values()
            .find_map(|db| db.resource_by_hash(hash))
    }
}

impl Directory for Registry {
    fn join_entry(
        &self,
        source: &JoinSource,
        join_offset: u64,
        local: u64,
    ) -> AccessResult<Option<Reference>> {
        let db = self.database_for(&source.resource, None)?;
        db.join_entry_in(source, join_offset, local, self)
    }

    fn find_by_rod_id(&self, reference: &Reference) -> AccessResult<Object> {
        Ok(Registry::find_by_rod_id(self, reference)?)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("databases", &self.databases.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use rod_types::{FieldType, ResourceBuilder};
    use tempfile::TempDir;

    fn note() -> Arc<Resource> {
        Arc::new(
            ResourceBuilder::new("Note")
                .field("text", FieldType::String)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn bindings_follow_registration_order() {
        let tmp = TempDir::new().unwrap();
        let resources = [note()];
        let a = Database::create(tmp.path().join("a"), DatabaseConfig::default(), &resources)
            .unwrap();
        let b = Database::create(tmp.path().join("b"), DatabaseConfig::default(), &resources)
            .unwrap();

        let mut registry = Registry::new();
        let a = registry.register_database(a).unwrap();
        let b = registry.register_database(b).unwrap();
        assert_eq!(registry.binding("Note"), Some(a));
        assert_eq!(registry.database_for("Note", None).unwrap().id(), a);
        assert_eq!(registry.database_for("Note", Some(b)).unwrap().id(), b);
    }

    #[test]
    fn removal_drops_bindings() {
        let tmp = TempDir::new().unwrap();
        let db = Database::create(tmp.path(), DatabaseConfig::default(), &[note()]).unwrap();
        let mut registry = Registry::new();
        let id = registry.register_database(db).unwrap();

        let mut removed = registry.remove_database(id).unwrap();
        removed.close().unwrap();
        assert_eq!(registry.binding("Note"), None);
        assert!(matches!(
            registry.database_for("Note", None),
            Err(DbError::NoDatabaseFor(_))
        ));
        assert!(registry.remove_database(id).is_none());
        // descriptors stay resolvable
        assert!(Resolver::resource(&registry, "Note").is_some());
    }

    #[test]
    fn removal_rebinds_to_remaining_database() {
        let tmp = TempDir::new().unwrap();
        let resources = [note()];
        let a = Database::create(tmp.path().join("a"), DatabaseConfig::default(), &resources)
            .unwrap();
        let b = Database::create(tmp.path().join("b"), DatabaseConfig::default(), &resources)
            .unwrap();
        let mut registry = Registry::new();
        let a = registry.register_database(a).unwrap();
        let b = registry.register_database(b).unwrap();

        registry.remove_database(a);
        assert_eq!(registry.binding("Note"), Some(b));
    }

    #[test]
    fn unknown_hint_is_rejected() {
        let registry = Registry::new();
        let missing = Uuid::now_v7();
        assert!(matches!(
            registry.database_for("Note", Some(missing)),
            Err(DbError::UnknownDatabase(id)) if id == missing
        ));
    }

    #[test]
    fn store_and_load_through_registry() {
        let tmp = TempDir::new().unwrap();
        let resource = note();
        let db = Database::create(tmp.path(), DatabaseConfig::default(), &[resource.clone()])
            .unwrap();
        let mut registry = Registry::new();
        registry.register_database(db).unwrap();

        let mut note = Object::new(resource);
        note.set("text", "remember the milk").unwrap();
        registry.store(&mut note).unwrap();

        let loaded = registry.find_by_rod_id(&note.reference()).unwrap();
        assert_eq!(loaded.get("text").and_then(|v| v.as_str()), Some("remember the milk"));
        registry.close_all().unwrap();
    }
}
