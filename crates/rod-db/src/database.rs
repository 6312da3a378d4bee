//! A database directory: metadata, record containers, byte stores and
//! indexes for a set of resources.
//!
//! ```text
//! <dir>/database.json                    metadata
//! <dir>/<container>.dat                  fixed-size records + owner tags
//! <dir>/<resource>.bytes                 variable-length payloads
//! <dir>/<resource>.<association>.join.idx
//! <dir>/<resource>.<field>.idx
//! ```
//!
//! Resources renamed with [`Metadata::add_prefix`] keep the file names they
//! were stored under.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rod_access::{
    accessors_for, decode_join_value, join_position, join_value, read_join_entry, AccessError,
    AccessResult, Accessor, Directory, JoinSource, LoadContext, Object, PendingUpdates, Reference,
    Resolver, SaveContext, UpdateTarget, Updater, Value,
};
use rod_arrange::{arrange_container, IdRemap};
use rod_index::{Decode, Encode, Index};
use rod_meta::{MetaError, Metadata, METADATA_FILE};
use rod_store::{ByteStore, Container, RecordContainer, Transaction};
use rod_types::{FieldDescriptor, Handle, NameHash, Resource, RodId, SLOT_SIZE};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{DbError, DbResult};
use crate::LIBRARY_VERSION;

/// Storage owned by one resource.
#[derive(Clone)]
struct ResourceSlot {
    resource: Arc<Resource>,
    /// Owner tag of the resource's records. Differs from the resource's own
    /// name hash when the database was opened under a prefix.
    tag: NameHash,
    accessors: Arc<Vec<Box<dyn Accessor>>>,
    bytes: ByteStore,
    /// Join index per plural association.
    joins: BTreeMap<String, Index>,
    /// Secondary index per indexed field.
    indexes: BTreeMap<String, Index>,
}

/// Copy of all mutable state, taken when a transaction begins.
struct Snapshot {
    metadata: Metadata,
    containers: BTreeMap<String, RecordContainer>,
    slots: BTreeMap<String, ResourceSlot>,
    pending: PendingUpdates,
    resolved: HashMap<(String, Handle), RodId>,
}

/// An open database.
pub struct Database {
    path: PathBuf,
    config: DatabaseConfig,
    metadata: Metadata,
    containers: BTreeMap<String, RecordContainer>,
    slots: BTreeMap<String, ResourceSlot>,
    /// Name hash to resource name, including tags recorded in metadata.
    hashes: HashMap<NameHash, String>,
    pending: PendingUpdates,
    /// Identifiers of forward-referenced objects, by the key their
    /// updaters were queued under.
    resolved: HashMap<(String, Handle), RodId>,
    transaction: Transaction,
    open: bool,
}

impl Database {
    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Create a new database directory for `resources`.
    pub fn create(
        path: impl AsRef<Path>,
        config: DatabaseConfig,
        resources: &[Arc<Resource>],
    ) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        if config.readonly {
            return Err(DbError::ReadOnly(path));
        }
        if path.join(METADATA_FILE).exists() {
            return Err(DbError::AlreadyExists(path));
        }
        fs::create_dir_all(&path)?;

        let mut metadata = Metadata::new(LIBRARY_VERSION);
        for resource in resources {
            metadata.register(resource);
        }
        let mut db = Self::assemble(path, config, metadata, resources)?;
        db.flush()?;
        info!(
            path = %db.path.display(),
            id = %db.id(),
            resources = resources.len(),
            "created database"
        );
        Ok(db)
    }

    /// Open an existing database directory.
    ///
    /// The stored version and every stored resource descriptor are checked
    /// before any record is read.
    pub fn open(
        path: impl AsRef<Path>,
        config: DatabaseConfig,
        resources: &[Arc<Resource>],
    ) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata_path = path.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(DbError::NotFound(path));
        }

        let mut metadata = Metadata::load(&metadata_path)?;
        metadata.ensure_valid(&LIBRARY_VERSION)?;
        for resource in resources {
            metadata.check_resource(resource)?;
        }
        for resource in resources {
            if metadata.resource(resource.name()).is_none() {
                metadata.register(resource);
            }
        }

        let arrange = config.arrange_on_open && !config.readonly;
        let mut db = Self::assemble(path, config, metadata, resources)?;
        if arrange {
            db.arrange()?;
        }
        info!(
            path = %db.path.display(),
            id = %db.id(),
            version = %db.metadata.version,
            readonly = db.config.readonly,
            "opened database"
        );
        Ok(db)
    }

    /// Open the database, run `f`, and close it on every exit path,
    /// including an error or a panic inside `f`.
    pub fn with_open<T, F>(
        path: impl AsRef<Path>,
        config: DatabaseConfig,
        resources: &[Arc<Resource>],
        f: F,
    ) -> DbResult<T>
    where
        F: FnOnce(&mut Database) -> DbResult<T>,
    {
        let mut db = Self::open(path, config, resources)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut db)));
        let closed = db.close();
        match outcome {
            Ok(Ok(value)) => {
                closed?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "close after failed operation also failed");
                }
                Err(e)
            }
            Err(payload) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "close after panic failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    fn assemble(
        path: PathBuf,
        config: DatabaseConfig,
        metadata: Metadata,
        resources: &[Arc<Resource>],
    ) -> DbResult<Self> {
        // a shared container is as wide as its widest member; file stems
        // come from the stored descriptors, which survive renaming
        let mut widths: BTreeMap<String, (usize, String)> = BTreeMap::new();
        for resource in resources {
            let stem = metadata
                .resource(resource.name())
                .map_or(resource.container(), |meta| meta.container_file_stem());
            let entry = widths
                .entry(resource.container().to_string())
                .or_insert_with(|| (0, stem.to_string()));
            entry.0 = entry.0.max(resource.element_size());
        }
        let mut containers = BTreeMap::new();
        for (name, (width, stem)) in widths {
            let file = path.join(format!("{stem}.dat"));
            let records = RecordContainer::open(&file, name.clone(), width)?;
            containers.insert(name, records);
        }

        let mut slots = BTreeMap::new();
        let mut hashes = HashMap::new();
        for resource in resources {
            let name = resource.name().to_string();
            hashes.insert(resource.name_hash(), name.clone());
            let meta = metadata.resource(&name);
            let tag = meta
                .and_then(|meta| NameHash::from_raw(meta.name_hash))
                .unwrap_or_else(|| resource.name_hash());
            let stem = meta.map_or(name.as_str(), |meta| meta.file_stem());
            hashes.entry(tag).or_insert_with(|| name.clone());
            let slot = open_slot(&path, &config, resource.clone(), tag, stem)?;
            slots.insert(name, slot);
        }

        Ok(Self {
            path,
            config,
            metadata,
            containers,
            slots,
            hashes,
            pending: PendingUpdates::new(),
            resolved: HashMap::new(),
            transaction: Transaction::new(),
            open: true,
        })
    }

    /// Write every container, byte store, index and the metadata.
    pub fn flush(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        if self.config.readonly {
            return Ok(());
        }
        for records in self.containers.values() {
            records.flush()?;
        }
        for slot in self.slots.values() {
            slot.bytes.flush()?;
            for index in slot.joins.values().chain(slot.indexes.values()) {
                index.flush()?;
            }
        }
        self.metadata.version = LIBRARY_VERSION;
        self.metadata.store(&self.path.join(METADATA_FILE))?;
        debug!(path = %self.path.display(), "flushed database");
        Ok(())
    }

    /// Flush and close. Closing a closed database is a no-op.
    pub fn close(&mut self) -> DbResult<()> {
        if !self.open {
            return Ok(());
        }
        if !self.pending.is_empty() {
            warn!(
                path = %self.path.display(),
                waiting = self.pending.len(),
                "closing with references to objects that were never stored"
            );
        }
        let flushed = self.flush();
        self.open = false;
        flushed?;
        info!(path = %self.path.display(), "closed database");
        Ok(())
    }

    /// Delete the database directory and everything in it.
    pub fn destroy(mut self) -> DbResult<()> {
        self.open = false;
        fs::remove_dir_all(&self.path)?;
        info!(path = %self.path.display(), "destroyed database");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.metadata.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Resources handled by this database.
    pub fn resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.slots.values().map(|slot| &slot.resource)
    }

    pub fn handles(&self, resource: &str) -> bool {
        self.slots.contains_key(resource)
    }

    /// Number of updaters waiting for objects to be stored.
    pub fn pending_updates(&self) -> usize {
        self.pending.len()
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DbError::NotOpen(self.path.clone()))
        }
    }

    fn ensure_writable(&self) -> DbResult<()> {
        self.ensure_open()?;
        if self.config.readonly {
            return Err(DbError::ReadOnly(self.path.clone()));
        }
        Ok(())
    }

    fn slot(&self, resource: &str) -> DbResult<&ResourceSlot> {
        self.slots
            .get(resource)
            .ok_or_else(|| DbError::UnknownResource(resource.to_string()))
    }

    fn records(&self, resource: &Resource) -> DbResult<&RecordContainer> {
        self.containers
            .get(resource.container())
            .ok_or_else(|| DbError::UnknownResource(resource.name().to_string()))
    }

    /// Whether `resource` is `ancestor` or inherits from it.
    fn descends_from(&self, resource: &Resource, ancestor: &str) -> bool {
        let mut current = Some(resource.name());
        let mut steps = 0;
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.slots.len() {
                break;
            }
            current = self.slots.get(name).and_then(|slot| slot.resource.parent());
        }
        false
    }

    // ---------------------------------------------------------------
    // Store
    // ---------------------------------------------------------------

    /// Write `object` to its record, assigning a rod_id on first store.
    ///
    /// Returns the deferred updates that became due because `object` now
    /// has an identifier; they have already been applied.
    pub fn store(&mut self, object: &mut Object) -> DbResult<Vec<Updater>> {
        self.ensure_writable()?;
        let name = object.resource().name().to_string();
        let slot = self.slot(&name)?;
        if **object.resource() != *slot.resource {
            return Err(MetaError::IncompatibleClass {
                resource: name,
                reason: "object was built from a different descriptor".to_string(),
            }
            .into());
        }
        let resource = slot.resource.clone();
        let accessors = slot.accessors.clone();
        let tag = slot.tag;

        detach_collections(object, &*self)?;
        self.refresh_references(&resource, object)?;

        let first = !object.is_persisted();
        let previous = if first {
            None
        } else {
            self.check_record(&resource, tag, object.rod_id())?;
            self.read_indexed(&resource, object.rod_id())?
        };

        if first {
            let records = self
                .containers
                .get_mut(resource.container())
                .ok_or_else(|| DbError::UnknownResource(name.clone()))?;
            let offset = records.allocate(tag)?;
            object.assign_id(RodId::from_offset(offset));
        }
        let rod_id = object.rod_id();
        let join_marks = self.metadata.resource_mut(&name)?.join_offsets.clone();

        if let Err(e) = self.save_properties(&name, &resource, &accessors, object) {
            let orphan = if first { rod_id.offset() } else { None };
            self.discard_partial_save(&name, orphan, join_marks)?;
            if let Some(offset) = orphan {
                if let Some(records) = self.containers.get_mut(resource.container()) {
                    records.set_owner(offset, None)?;
                }
                object.assign_id(RodId::NULL);
            }
            return Err(e);
        }

        self.rebind_collections(&resource, object)?;
        self.update_indexes(&resource, rod_id, previous.as_ref(), object)?;

        let bytes = self.slot(&name)?.bytes.len();
        let meta = self.metadata.resource_mut(&name)?;
        if first {
            meta.count += 1;
        }
        meta.bytes = bytes;
        self.metadata.touch();

        let due = self.resolve_pending(&name, object.handle(), rod_id)?;
        debug!(resource = %name, rod_id = %rod_id, first, due = due.len(), "stored object");
        Ok(due)
    }

    /// Replace pending references whose target has been stored since the
    /// reference was taken, in singular slots and appended collection
    /// elements alike.
    fn refresh_references(&self, resource: &Resource, object: &mut Object) -> DbResult<()> {
        for association in resource.singular() {
            let Some(Value::Ref(reference)) = object.get(&association.name) else {
                continue;
            };
            if let Some(rod_id) = self.stored_as(reference) {
                let stored = Reference::stored(reference.resource().clone(), rod_id);
                object.set(&association.name, stored)?;
            }
        }
        for association in resource.plural() {
            let waiting = match object.get(&association.name) {
                Some(Value::Refs(collection)) => {
                    collection.appended().iter().any(|r| !r.is_persisted())
                }
                _ => false,
            };
            if waiting {
                object
                    .collection_mut(&association.name)?
                    .refresh_appended(|reference| self.stored_as(reference));
            }
        }
        Ok(())
    }

    /// Identifier given to the object behind a pending reference, if it has
    /// been stored since.
    fn stored_as(&self, reference: &Reference) -> Option<RodId> {
        if reference.is_persisted() {
            return None;
        }
        let handle = reference.handle()?;
        self.resolved
            .get(&(reference.resource().name().to_string(), handle))
            .copied()
    }

    fn save_properties(
        &mut self,
        name: &str,
        resource: &Resource,
        accessors: &[Box<dyn Accessor>],
        object: &Object,
    ) -> DbResult<()> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| DbError::UnknownResource(name.to_string()))?;
        let records = self
            .containers
            .get_mut(resource.container())
            .ok_or_else(|| DbError::UnknownResource(name.to_string()))?;
        let meta = self.metadata.resource_mut(name)?;
        let mut ctx = SaveContext {
            records,
            bytes: &mut slot.bytes,
            joins: &mut slot.joins,
            join_offsets: &mut meta.join_offsets,
            pending: &mut self.pending,
        };
        for accessor in accessors {
            accessor.save(Some(object), &mut ctx)?;
        }
        Ok(())
    }

    /// Forget what a failed save left behind: updaters aimed at the orphaned
    /// record or at join ranges allocated during the save. The ranges are
    /// handed out again.
    fn discard_partial_save(
        &mut self,
        name: &str,
        orphan: Option<u64>,
        join_marks: BTreeMap<String, u64>,
    ) -> DbResult<()> {
        self.pending.discard(|updater| match &updater.target {
            UpdateTarget::Slot {
                resource, offset, ..
            } => resource == name && orphan == Some(*offset),
            UpdateTarget::Join {
                resource,
                association,
                key,
            } => {
                let mark = join_marks.get(association).copied().unwrap_or(0);
                resource == name && join_position(key).is_some_and(|p| p >= mark)
            }
        });
        self.metadata.resource_mut(name)?.join_offsets = join_marks;
        Ok(())
    }

    /// Point collections that gained elements at the join range just written.
    fn rebind_collections(&self, resource: &Resource, object: &mut Object) -> DbResult<()> {
        let records = self.records(resource)?;
        let offset = object.offset()?;
        for association in resource.plural() {
            let join_offset = records.read_u64(offset, association.offset + SLOT_SIZE)?;
            let collection = object.collection_mut(&association.name)?;
            if collection.is_dirty() {
                collection.mark_saved(
                    JoinSource::new(resource.name(), association.name.as_str()),
                    join_offset,
                );
            }
        }
        Ok(())
    }

    fn check_record(&self, resource: &Resource, tag: NameHash, rod_id: RodId) -> DbResult<()> {
        let not_found = || DbError::RecordNotFound {
            resource: resource.name().to_string(),
            rod_id: rod_id.get(),
        };
        let records = self.records(resource)?;
        let offset = rod_id.offset().ok_or_else(not_found)?;
        if offset >= records.element_count() {
            return Err(not_found());
        }
        match records.owner(offset)? {
            Some(owner) if owner == tag => Ok(()),
            _ => Err(not_found()),
        }
    }

    /// Current values of the indexed fields of a stored record.
    fn read_indexed(&self, resource: &Arc<Resource>, rod_id: RodId) -> DbResult<Option<Object>> {
        if !resource.fields().iter().any(FieldDescriptor::is_indexed) {
            return Ok(None);
        }
        let slot = self.slot(resource.name())?;
        let mut previous = Object::with_id(resource.clone(), rod_id);
        let ctx = LoadContext {
            records: self.records(resource)?,
            bytes: &slot.bytes,
            resolver: self,
        };
        for accessor in slot.accessors.iter() {
            if resource
                .field(accessor.name())
                .is_some_and(FieldDescriptor::is_indexed)
            {
                accessor.load(Some(&mut previous), &ctx)?;
            }
        }
        Ok(Some(previous))
    }

    fn update_indexes(
        &mut self,
        resource: &Resource,
        rod_id: RodId,
        previous: Option<&Object>,
        object: &Object,
    ) -> DbResult<()> {
        let slot = self
            .slots
            .get_mut(resource.name())
            .ok_or_else(|| DbError::UnknownResource(resource.name().to_string()))?;
        for field in resource.fields().iter().filter(|f| f.is_indexed()) {
            let Some(index) = slot.indexes.get_mut(&field.name) else {
                continue;
            };
            let new_key = index_key(field, object.get(&field.name))?;
            let old_key = match previous {
                Some(previous) => index_key(field, previous.get(&field.name))?,
                None => None,
            };
            if previous.is_some() && old_key == new_key {
                continue;
            }
            if let Some(old) = old_key {
                index.delete_value(&old, &rod_id)?;
            }
            if let Some(new) = new_key {
                index.put(&new, &rod_id)?;
            }
        }
        Ok(())
    }

    /// Apply every deferred update waiting on `(resource, handle)`, now that
    /// the object is stored as `rod_id`.
    pub fn resolve_pending(
        &mut self,
        resource: &str,
        handle: Handle,
        rod_id: RodId,
    ) -> DbResult<Vec<Updater>> {
        self.ensure_open()?;
        let due = self.pending.take(resource, handle);
        for updater in &due {
            self.apply_updater(updater, rod_id)?;
        }
        self.resolved.insert((resource.to_string(), handle), rod_id);
        if !due.is_empty() {
            debug!(resource, rod_id = %rod_id, applied = due.len(), "resolved deferred updates");
        }
        Ok(due)
    }

    fn apply_updater(&mut self, updater: &Updater, rod_id: RodId) -> DbResult<()> {
        match &updater.target {
            UpdateTarget::Slot {
                resource,
                offset,
                field_offset,
            } => {
                let container = self.slot(resource)?.resource.container().to_string();
                let records = self
                    .containers
                    .get_mut(&container)
                    .ok_or_else(|| DbError::UnknownResource(resource.clone()))?;
                records.write_u64(*offset, *field_offset, rod_id.get())?;
            }
            UpdateTarget::Join {
                resource,
                association,
                key,
            } => {
                let index = self
                    .slots
                    .get_mut(resource)
                    .and_then(|slot| slot.joins.get_mut(association))
                    .ok_or_else(|| AccessError::MissingJoinIndex {
                        resource: resource.clone(),
                        association: association.clone(),
                    })?;
                let value: Vec<u8> = index.get_first(key)?;
                let (_, hash) = decode_join_value(&value)?;
                index.set(key, &join_value(rod_id, hash))?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Load and query
    // ---------------------------------------------------------------

    /// Read the record `rod_id` of `resource` back into an object.
    pub fn load(&self, resource: &str, rod_id: RodId) -> DbResult<Object> {
        self.load_in(resource, rod_id, self)
    }

    /// Like [`Database::load`], resolving association targets through
    /// `resolver`. A record owned by a descendant of `resource` loads as
    /// that descendant.
    pub fn load_in(
        &self,
        resource: &str,
        rod_id: RodId,
        resolver: &dyn Resolver,
    ) -> DbResult<Object> {
        self.ensure_open()?;
        let requested = self.slot(resource)?;
        let not_found = || DbError::RecordNotFound {
            resource: resource.to_string(),
            rod_id: rod_id.get(),
        };
        let records = self.records(&requested.resource)?;
        let offset = rod_id.offset().ok_or_else(not_found)?;
        if offset >= records.element_count() {
            return Err(not_found());
        }
        let owner = records.owner(offset)?.ok_or_else(not_found)?;
        let slot = match self.hashes.get(&owner).and_then(|name| self.slots.get(name)) {
            Some(slot)
                if slot.resource.container() == requested.resource.container()
                    && self.descends_from(&slot.resource, resource) =>
            {
                slot
            }
            _ => return Err(not_found()),
        };

        let mut object = Object::with_id(slot.resource.clone(), rod_id);
        let ctx = LoadContext {
            records,
            bytes: &slot.bytes,
            resolver,
        };
        for accessor in slot.accessors.iter() {
            accessor.load(Some(&mut object), &ctx)?;
        }
        Ok(object)
    }

    /// Join entry lookup, resolving element resources through `resolver`.
    pub fn join_entry_in(
        &self,
        source: &JoinSource,
        join_offset: u64,
        local: u64,
        resolver: &dyn Resolver,
    ) -> AccessResult<Option<Reference>> {
        let slot = self
            .slots
            .get(&source.resource)
            .ok_or_else(|| AccessError::UnknownResource(source.resource.clone()))?;
        let index = slot.joins.get(&source.association).ok_or_else(|| {
            AccessError::MissingJoinIndex {
                resource: source.resource.clone(),
                association: source.association.clone(),
            }
        })?;
        let target = slot
            .resource
            .association(&source.association)
            .and_then(|a| a.target.as_deref());
        read_join_entry(index, target, join_offset, local, resolver)
    }

    /// Number of records owned by `resource`.
    pub fn count(&self, resource: &str) -> DbResult<u64> {
        self.ensure_open()?;
        let slot = self.slot(resource)?;
        let records = self.records(&slot.resource)?;
        Ok(records.offsets_of(slot.tag).len() as u64)
    }

    /// Every record owned by `resource`, in physical order.
    pub fn each(&self, resource: &str) -> DbResult<impl Iterator<Item = DbResult<Object>> + '_> {
        self.ensure_open()?;
        let slot = self.slot(resource)?;
        let offsets = self.records(&slot.resource)?.offsets_of(slot.tag);
        let name = slot.resource.name().to_string();
        Ok(offsets
            .into_iter()
            .map(move |offset| self.load(&name, RodId::from_offset(offset))))
    }

    /// First object whose indexed `field` equals `value`.
    pub fn find_by(
        &self,
        resource: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> DbResult<Option<Object>> {
        let (index, descriptor) = self.field_index(resource, field)?;
        let value: Value = value.into();
        let Some(key) = index_key(descriptor, Some(&value))? else {
            return Ok(None);
        };
        if !index.contains(&key)? {
            return Ok(None);
        }
        let rod_id: RodId = index.get_first(&key)?;
        self.load(resource, rod_id).map(Some)
    }

    /// Every object whose indexed `field` equals `value`, in store order.
    pub fn find_all_by(
        &self,
        resource: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> DbResult<Vec<Object>> {
        let (index, descriptor) = self.field_index(resource, field)?;
        let value: Value = value.into();
        let Some(key) = index_key(descriptor, Some(&value))? else {
            return Ok(Vec::new());
        };
        let ids = index
            .each_for::<_, RodId>(&key)?
            .collect::<Result<Vec<_>, _>>()?;
        ids.into_iter().map(|id| self.load(resource, id)).collect()
    }

    fn field_index(&self, resource: &str, field: &str) -> DbResult<(&Index, &FieldDescriptor)> {
        self.ensure_open()?;
        let slot = self.slot(resource)?;
        let not_indexed = || DbError::NotIndexed {
            resource: resource.to_string(),
            field: field.to_string(),
        };
        let descriptor = slot.resource.field(field).ok_or_else(not_indexed)?;
        let index = slot.indexes.get(field).ok_or_else(not_indexed)?;
        Ok((index, descriptor))
    }

    // ---------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------

    /// Run `f` as one transaction.
    ///
    /// On success the database is flushed. On error every container, index
    /// and the metadata are restored to their state before `f` ran. Objects
    /// held by the caller keep any identifiers assigned inside `f`.
    pub fn transaction<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Database) -> DbResult<T>,
    {
        self.ensure_writable()?;
        self.transaction.begin()?;
        let snapshot = self.snapshot();
        match f(self) {
            Ok(value) => {
                self.transaction.commit()?;
                self.transaction.reset()?;
                self.flush()?;
                Ok(value)
            }
            Err(e) => {
                self.restore(snapshot);
                self.transaction.abort()?;
                self.transaction.reset()?;
                info!(path = %self.path.display(), error = %e, "transaction aborted");
                Err(e)
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_started()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            metadata: self.metadata.clone(),
            containers: self.containers.clone(),
            slots: self.slots.clone(),
            pending: self.pending.clone(),
            resolved: self.resolved.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.metadata = snapshot.metadata;
        self.containers = snapshot.containers;
        self.slots = snapshot.slots;
        self.pending = snapshot.pending;
        self.resolved = snapshot.resolved;
    }

    // ---------------------------------------------------------------
    // Arrangement
    // ---------------------------------------------------------------

    /// Cluster the records of every shared container by resource and
    /// rewrite every reference to a moved record. Returns the number of
    /// records that moved.
    ///
    /// Objects loaded before the pass keep their old identifiers.
    pub fn arrange(&mut self) -> DbResult<usize> {
        self.ensure_writable()?;
        let names: Vec<String> = self.containers.keys().cloned().collect();
        let mut moved = 0;
        for name in names {
            let family = self.family(&name);
            let records = self
                .containers
                .get_mut(&name)
                .ok_or_else(|| DbError::UnknownResource(name.clone()))?;
            let arrangement = arrange_container(records, &family)?;
            if arrangement.moved() > 0 {
                self.rewrite_references(&name, &arrangement.remap)?;
                moved += arrangement.moved();
            }
        }
        info!(path = %self.path.display(), moved, "arranged database");
        Ok(moved)
    }

    /// Resources stored in `container`, parents before children.
    fn family(&self, container: &str) -> Vec<NameHash> {
        let mut members: Vec<(usize, &str, NameHash)> = self
            .slots
            .values()
            .filter(|slot| slot.resource.container() == container)
            .map(|slot| {
                let mut depth = 0;
                let mut parent = slot.resource.parent();
                while let Some(name) = parent {
                    depth += 1;
                    if depth > self.slots.len() {
                        break;
                    }
                    parent = self.slots.get(name).and_then(|p| p.resource.parent());
                }
                (depth, slot.resource.name(), slot.tag)
            })
            .collect();
        members.sort();
        members.into_iter().map(|(_, _, hash)| hash).collect()
    }

    fn rewrite_references(&mut self, container: &str, remap: &IdRemap) -> DbResult<()> {
        let by_name: HashMap<String, String> = self
            .slots
            .values()
            .map(|s| (s.resource.name().to_string(), s.resource.container().to_string()))
            .collect();
        let by_hash: HashMap<NameHash, String> = self
            .hashes
            .iter()
            .filter_map(|(hash, name)| by_name.get(name).map(|c| (*hash, c.clone())))
            .collect();
        let targets_container = |target: &Option<String>, hash: Option<NameHash>| -> bool {
            let found = match (target, hash) {
                (Some(name), _) => by_name.get(name),
                (None, Some(hash)) => by_hash.get(&hash),
                (None, None) => None,
            };
            found.is_some_and(|c| c == container)
        };

        // singular slots
        for slot in self.slots.values() {
            let resource = &slot.resource;
            if resource.singular().is_empty() {
                continue;
            }
            let Some(records) = self.containers.get_mut(resource.container()) else {
                continue;
            };
            for offset in records.offsets_of(slot.tag) {
                for association in resource.singular() {
                    let hash = if association.is_polymorphic() {
                        let raw = records.read_u64(offset, association.offset + SLOT_SIZE)?;
                        NameHash::from_raw(raw)
                    } else {
                        None
                    };
                    if !targets_container(&association.target, hash) {
                        continue;
                    }
                    let old = RodId::new(records.read_u64(offset, association.offset)?);
                    if let Some(new) = remap.moved(old) {
                        records.write_u64(offset, association.offset, new.get())?;
                    }
                }
            }
        }

        for slot in self.slots.values_mut() {
            // join entries
            for association in slot.resource.plural() {
                let Some(index) = slot.joins.get_mut(&association.name) else {
                    continue;
                };
                index.rewrite_values(|value| {
                    let (old, hash) = decode_join_value(value).ok()?;
                    if !targets_container(&association.target, hash) {
                        return None;
                    }
                    remap.moved(old).map(|new| join_value(new, hash))
                })?;
            }
            // secondary index values are the resource's own records
            if slot.resource.container() == container {
                for index in slot.indexes.values_mut() {
                    index.rewrite_values(|value| {
                        let old = RodId::decode(value).ok()?;
                        remap.moved(old).map(|new| new.encode())
                    })?;
                }
            }
        }

        for ((resource, _), rod_id) in self.resolved.iter_mut() {
            if by_name.get(resource.as_str()).is_some_and(|c| c == container) {
                *rod_id = remap.get(*rod_id);
            }
        }

        // deferred writes into moved records
        for updater in self.pending.iter_mut() {
            if let UpdateTarget::Slot {
                resource, offset, ..
            } = &mut updater.target
            {
                if !by_name.get(resource.as_str()).is_some_and(|c| c == container) {
                    continue;
                }
                if let Some(new) = remap
                    .moved(RodId::from_offset(*offset))
                    .and_then(|id| id.offset())
                {
                    *offset = new;
                }
            }
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.close() {
                warn!(path = %self.path.display(), error = %e, "failed to close database on drop");
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("id", &self.metadata.id)
            .field("resources", &self.slots.keys().collect::<Vec<_>>())
            .field("open", &self.open)
            .finish()
    }
}

impl Resolver for Database {
    fn resource(&self, name: &str) -> Option<Arc<Resource>> {
        self.slots.get(name).map(|slot| slot.resource.clone())
    }

    fn resource_by_hash(&self, hash: NameHash) -> Option<Arc<Resource>> {
        self.hashes
            .get(&hash)
            .and_then(|name| Resolver::resource(self, name))
    }
}

impl Directory for Database {
    fn join_entry(
        &self,
        source: &JoinSource,
        join_offset: u64,
        local: u64,
    ) -> AccessResult<Option<Reference>> {
        self.join_entry_in(source, join_offset, local, self)
    }

    fn find_by_rod_id(&self, reference: &Reference) -> AccessResult<Object> {
        Ok(self.load(reference.resource().name(), reference.rod_id())?)
    }
}

impl From<DbError> for AccessError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Access(e) => e,
            DbError::RecordNotFound { resource, rod_id } => {
                AccessError::RecordNotFound { resource, rod_id }
            }
            other => AccessError::Directory(Box::new(other)),
        }
    }
}

/// Open the bytes store and indexes of `resource`, stored under file `stem`.
fn open_slot(
    dir: &Path,
    config: &DatabaseConfig,
    resource: Arc<Resource>,
    tag: NameHash,
    stem: &str,
) -> DbResult<ResourceSlot> {
    let name = resource.name();
    let bytes = ByteStore::open(&dir.join(format!("{stem}.bytes")))?;

    let mut joins = BTreeMap::new();
    for association in resource.plural() {
        let mut index = Index::new(
            format!("{name}.{}", association.name),
            config.index_kind,
            dir.join(format!("{stem}.{}.join.idx", association.name)),
        );
        index.open(true, false, config.cache_size)?;
        joins.insert(association.name.clone(), index);
    }

    let mut indexes = BTreeMap::new();
    for field in resource.fields() {
        if let Some(kind) = field.index {
            let mut index = Index::new(
                format!("{name}.{}", field.name),
                kind,
                dir.join(format!("{stem}.{}.idx", field.name)),
            );
            index.open(true, false, config.cache_size)?;
            indexes.insert(field.name.clone(), index);
        }
    }

    Ok(ResourceSlot {
        accessors: Arc::new(accessors_for(&resource)),
        resource,
        tag,
        bytes,
        joins,
        indexes,
    })
}

/// Resolve collections that live in another owner's join index, so saving
/// `object` can copy their elements into its own.
pub fn detach_collections(object: &mut Object, directory: &dyn Directory) -> DbResult<()> {
    let resource = object.resource().clone();
    for association in resource.plural() {
        let own = JoinSource::new(resource.name(), association.name.as_str());
        let foreign = object
            .collection(&association.name)?
            .source()
            .is_some_and(|source| *source != own);
        if foreign {
            let mut collection = object.collection(&association.name)?.clone();
            collection.materialize(directory)?;
            object.set(&association.name, collection)?;
        }
    }
    Ok(())
}

/// Index key of a field value; `None` for null values, which are not indexed.
fn index_key(field: &FieldDescriptor, value: Option<&Value>) -> DbResult<Option<Vec<u8>>> {
    let key = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Int(v)) => v.encode(),
        Some(Value::UInt(v)) => v.encode(),
        Some(Value::Float(v)) => v.encode(),
        Some(Value::Str(v)) => v.encode(),
        Some(Value::Json(v)) => serde_json::to_vec(v)?,
        Some(Value::Portable(v)) => v.encode()?,
        Some(Value::Ref(_) | Value::Refs(_)) => {
            return Err(AccessError::TypeMismatch {
                property: field.name.clone(),
                expected: "field value",
            }
            .into())
        }
    };
    Ok(Some(key))
}
