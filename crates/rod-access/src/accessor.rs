//! Bridges between object properties and their record slots.
//!
//! Every property of a resource gets one [`Accessor`], built from its
//! descriptor by [`accessors_for`]. Accessors never batch: each call reads or
//! writes the slots of exactly one record.

use std::collections::BTreeMap;

use rod_index::Index;
use rod_store::{ByteStore, Container};
use rod_types::{
    AssociationDescriptor, Cardinality, FieldDescriptor, FieldType, NameHash, Portable, Resource,
    RodId, SLOT_SIZE,
};
use tracing::debug;

use crate::collection::{decode_join_value, join_key, join_value, Collection, JoinSource};
use crate::directory::Resolver;
use crate::error::{AccessError, AccessResult};
use crate::object::Object;
use crate::pending::{PendingUpdates, Updater};
use crate::value::{Reference, Value};

/// Storage a save writes into, for the records of one resource.
pub struct SaveContext<'a> {
    pub records: &'a mut dyn Container,
    pub bytes: &'a mut ByteStore,
    /// Join indexes of the resource's plural associations, by name.
    pub joins: &'a mut BTreeMap<String, Index>,
    /// Next free join offset, by association name.
    pub join_offsets: &'a mut BTreeMap<String, u64>,
    pub pending: &'a mut PendingUpdates,
}

/// Storage a load reads from, for the records of one resource.
pub struct LoadContext<'a> {
    pub records: &'a dyn Container,
    pub bytes: &'a ByteStore,
    pub resolver: &'a dyn Resolver,
}

/// Reads and writes one property of an object.
pub trait Accessor {
    /// Name of the property.
    fn name(&self) -> &str;

    /// Write the property of `object` into its record.
    fn save(&self, object: Option<&Object>, ctx: &mut SaveContext<'_>) -> AccessResult<()>;

    /// Read the property from the record into `object`.
    fn load(&self, object: Option<&mut Object>, ctx: &LoadContext<'_>) -> AccessResult<()>;
}

/// One accessor per property of `resource`, in layout order.
pub fn accessors_for(resource: &Resource) -> Vec<Box<dyn Accessor>> {
    let mut accessors: Vec<Box<dyn Accessor>> = Vec::new();
    for field in resource.fields() {
        if field.is_variable() {
            accessors.push(Box::new(SequenceAccessor::new(field.clone())));
        } else {
            accessors.push(Box::new(ScalarAccessor::new(field.clone())));
        }
    }
    for association in resource.associations() {
        match association.cardinality {
            Cardinality::Singular => {
                accessors.push(Box::new(SingularAccessor::new(association.clone())))
            }
            Cardinality::Plural => {
                accessors.push(Box::new(PluralAccessor::new(association.clone())))
            }
        }
    }
    accessors
}

fn null_object(property: &str) -> AccessError {
    AccessError::InvalidArgument(format!("cannot access {property} of a null object"))
}

fn mismatch(property: &str, expected: &'static str) -> AccessError {
    AccessError::TypeMismatch {
        property: property.to_string(),
        expected,
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Integer, unsigned integer and float fields, stored inline.
pub struct ScalarAccessor {
    field: FieldDescriptor,
}

impl ScalarAccessor {
    pub fn new(field: FieldDescriptor) -> Self {
        Self { field }
    }
}

impl Accessor for ScalarAccessor {
    fn name(&self) -> &str {
        &self.field.name
    }

    fn save(&self, object: Option<&Object>, ctx: &mut SaveContext<'_>) -> AccessResult<()> {
        let object = object.ok_or_else(|| null_object(&self.field.name))?;
        let offset = object.offset()?;
        let name = &self.field.name;
        let at = self.field.offset;
        match (self.field.field_type, object.get(name)) {
            (_, None | Some(Value::Null)) => {
                return Err(AccessError::InvalidArgument(format!(
                    "{}.{name} must not be null",
                    object.resource().name()
                )))
            }
            (FieldType::Integer, Some(Value::Int(v))) => ctx.records.write_i64(offset, at, *v)?,
            (FieldType::UnsignedInteger, Some(Value::UInt(v))) => {
                ctx.records.write_u64(offset, at, *v)?
            }
            (FieldType::Float, Some(Value::Float(v))) => ctx.records.write_f64(offset, at, *v)?,
            (FieldType::Integer, _) => return Err(mismatch(name, "integer")),
            (FieldType::UnsignedInteger, _) => return Err(mismatch(name, "unsigned integer")),
            (FieldType::Float, _) => return Err(mismatch(name, "float")),
            (other, _) => {
                return Err(AccessError::InvalidArgument(format!(
                    "{other} field {name} is not a scalar"
                )))
            }
        }
        Ok(())
    }

    fn load(&self, object: Option<&mut Object>, ctx: &LoadContext<'_>) -> AccessResult<()> {
        let object = object.ok_or_else(|| null_object(&self.field.name))?;
        let offset = object.offset()?;
        let at = self.field.offset;
        let value = match self.field.field_type {
            FieldType::Integer => Value::Int(ctx.records.read_i64(offset, at)?),
            FieldType::UnsignedInteger => Value::UInt(ctx.records.read_u64(offset, at)?),
            FieldType::Float => Value::Float(ctx.records.read_f64(offset, at)?),
            other => {
                return Err(AccessError::InvalidArgument(format!(
                    "{other} field {} is not a scalar",
                    self.field.name
                )))
            }
        };
        object.set(&self.field.name, value)
    }
}

// ---------------------------------------------------------------------------
// Variable-length values
// ---------------------------------------------------------------------------

/// String, json and generic-object fields, stored in the bytes container
/// and referenced by an `(offset, length)` pair.
pub struct SequenceAccessor {
    field: FieldDescriptor,
}

impl SequenceAccessor {
    pub fn new(field: FieldDescriptor) -> Self {
        Self { field }
    }

    fn encode(&self, value: &Value) -> AccessResult<Option<Vec<u8>>> {
        let name = &self.field.name;
        let encoded = match (self.field.field_type, value) {
            (_, Value::Null) => return Ok(None),
            (FieldType::String, Value::Str(s)) => s.as_bytes().to_vec(),
            (FieldType::String, _) => return Err(mismatch(name, "string")),
            (FieldType::Json, Value::Json(json)) => serde_json::to_vec(json)?,
            (FieldType::Json, _) => return Err(mismatch(name, "json")),
            (FieldType::Object, Value::Portable(portable)) => portable.encode()?,
            (FieldType::Object, _) => return Err(mismatch(name, "portable object")),
            (other, _) => {
                return Err(AccessError::InvalidArgument(format!(
                    "{other} field {name} is not variable-length"
                )))
            }
        };
        Ok(Some(encoded))
    }

    fn decode(&self, bytes: &[u8]) -> AccessResult<Value> {
        Ok(match self.field.field_type {
            FieldType::String => Value::Str(String::from_utf8(bytes.to_vec())?),
            FieldType::Json if bytes.is_empty() => Value::Json(serde_json::Value::Null),
            FieldType::Json => Value::Json(serde_json::from_slice(bytes)?),
            FieldType::Object if bytes.is_empty() => Value::Portable(Portable::Null),
            FieldType::Object => Value::Portable(Portable::decode(bytes)?),
            other => {
                return Err(AccessError::InvalidArgument(format!(
                    "{other} field {} is not variable-length",
                    self.field.name
                )))
            }
        })
    }
}

impl Accessor for SequenceAccessor {
    fn name(&self) -> &str {
        &self.field.name
    }

    fn save(&self, object: Option<&Object>, ctx: &mut SaveContext<'_>) -> AccessResult<()> {
        let object = object.ok_or_else(|| null_object(&self.field.name))?;
        let offset = object.offset()?;
        let value = object.get(&self.field.name).unwrap_or(&Value::Null);
        let (start, len) = match self.encode(value)? {
            Some(bytes) => ctx.bytes.append(&bytes),
            None => (0, 0),
        };
        ctx.records.write_u64(offset, self.field.offset, start)?;
        ctx.records
            .write_u64(offset, self.field.offset + SLOT_SIZE, len)?;
        Ok(())
    }

    fn load(&self, object: Option<&mut Object>, ctx: &LoadContext<'_>) -> AccessResult<()> {
        let object = object.ok_or_else(|| null_object(&self.field.name))?;
        let offset = object.offset()?;
        let start = ctx.records.read_u64(offset, self.field.offset)?;
        let len = ctx
            .records
            .read_u64(offset, self.field.offset + SLOT_SIZE)?;
        let value = if len == 0 {
            self.decode(&[])?
        } else {
            self.decode(ctx.bytes.read_bytes(start, len)?)?
        };
        object.set(&self.field.name, value)
    }
}

// ---------------------------------------------------------------------------
// Singular associations
// ---------------------------------------------------------------------------

/// One reference, stored as an identifier (plus name hash when polymorphic).
pub struct SingularAccessor {
    association: AssociationDescriptor,
}

impl SingularAccessor {
    pub fn new(association: AssociationDescriptor) -> Self {
        Self { association }
    }
}

impl Accessor for SingularAccessor {
    fn name(&self) -> &str {
        &self.association.name
    }

    fn save(&self, object: Option<&Object>, ctx: &mut SaveContext<'_>) -> AccessResult<()> {
        let name = &self.association.name;
        let object = object.ok_or_else(|| null_object(name))?;
        let offset = object.offset()?;
        let at = self.association.offset;

        let (rod_id, hash) = match object.get(name) {
            None | Some(Value::Null) => (RodId::NULL, 0),
            Some(Value::Ref(reference)) => {
                let rod_id = if reference.is_persisted() {
                    reference.rod_id()
                } else {
                    let handle = reference.handle().ok_or_else(|| {
                        AccessError::InvalidArgument(format!("{name} points at a detached object"))
                    })?;
                    ctx.pending.register(
                        reference.resource().name(),
                        handle,
                        Updater::slot(object.resource().name(), offset, at),
                    );
                    RodId::NULL
                };
                (rod_id, reference.resource().name_hash().get())
            }
            Some(_) => return Err(mismatch(name, "reference")),
        };

        ctx.records.write_u64(offset, at, rod_id.get())?;
        if self.association.is_polymorphic() {
            ctx.records.write_u64(offset, at + SLOT_SIZE, hash)?;
        }
        Ok(())
    }

    fn load(&self, object: Option<&mut Object>, ctx: &LoadContext<'_>) -> AccessResult<()> {
        let name = &self.association.name;
        let object = object.ok_or_else(|| null_object(name))?;
        let offset = object.offset()?;
        let at = self.association.offset;

        let rod_id = RodId::new(ctx.records.read_u64(offset, at)?);
        let value = if rod_id.is_null() {
            Value::Null
        } else {
            let resource = match &self.association.target {
                Some(target) => ctx
                    .resolver
                    .resource(target)
                    .ok_or_else(|| AccessError::UnknownResource(target.clone()))?,
                None => {
                    let raw = ctx.records.read_u64(offset, at + SLOT_SIZE)?;
                    let hash = NameHash::from_raw(raw).ok_or_else(|| {
                        AccessError::InvalidArgument(format!(
                            "{name} of {}#{} has no type tag",
                            object.resource().name(),
                            object.rod_id()
                        ))
                    })?;
                    ctx.resolver
                        .resource_by_hash(hash)
                        .ok_or(AccessError::UnknownNameHash(hash))?
                }
            };
            Value::Ref(Reference::stored(resource, rod_id))
        };
        object.set(name, value)
    }
}

// ---------------------------------------------------------------------------
// Plural associations
// ---------------------------------------------------------------------------

/// Many references, stored as `(count, join offset)` into a join index.
pub struct PluralAccessor {
    association: AssociationDescriptor,
}

impl PluralAccessor {
    pub fn new(association: AssociationDescriptor) -> Self {
        Self { association }
    }
}

impl Accessor for PluralAccessor {
    fn name(&self) -> &str {
        &self.association.name
    }

    fn save(&self, object: Option<&Object>, ctx: &mut SaveContext<'_>) -> AccessResult<()> {
        let name = &self.association.name;
        let object = object.ok_or_else(|| null_object(name))?;
        let offset = object.offset()?;
        let at = self.association.offset;
        let owner = object.resource().name();
        let own_source = JoinSource::new(owner, name.as_str());

        let empty = Collection::new(self.association.target.clone());
        let collection = match object.get(name) {
            None | Some(Value::Null) => &empty,
            Some(Value::Refs(collection)) => collection,
            Some(_) => return Err(mismatch(name, "collection")),
        };

        if collection.is_empty() {
            ctx.records.write_u64(offset, at, 0)?;
            ctx.records.write_u64(offset, at + SLOT_SIZE, 0)?;
            return Ok(());
        }
        if let Some(source) = collection.source() {
            if *source != own_source {
                return Err(AccessError::InvalidArgument(format!(
                    "{owner}.{name} holds a collection of {}.{}",
                    source.resource, source.association
                )));
            }
            if !collection.is_dirty() {
                ctx.records.write_u64(offset, at, collection.size())?;
                ctx.records
                    .write_u64(offset, at + SLOT_SIZE, collection.join_offset())?;
                return Ok(());
            }
        }

        let index = ctx
            .joins
            .get_mut(name)
            .ok_or_else(|| AccessError::MissingJoinIndex {
                resource: owner.to_string(),
                association: name.clone(),
            })?;
        let join_offset = ctx.join_offsets.get(name).copied().unwrap_or(0);
        let polymorphic = self.association.is_polymorphic();

        for i in 0..collection.stored_len() {
            let from = join_key(collection.join_offset(), i);
            let to = join_key(join_offset, i);
            let value: Vec<u8> = index.get_first(&from)?;
            index.set(&to, &value)?;
            if decode_join_value(&value)?.0.is_null() {
                ctx.pending.follow_join(owner, name, &from, &to);
            }
        }
        for (k, reference) in collection.appended().iter().enumerate() {
            let key = join_key(join_offset, collection.stored_len() + k as u64);
            let hash = polymorphic.then(|| reference.resource().name_hash());
            if reference.is_persisted() {
                index.set(&key, &join_value(reference.rod_id(), hash))?;
            } else {
                let handle = reference.handle().ok_or_else(|| {
                    AccessError::InvalidArgument(format!("{name} holds a detached object"))
                })?;
                index.set(&key, &join_value(RodId::NULL, hash))?;
                ctx.pending.register(
                    reference.resource().name(),
                    handle,
                    Updater::join(owner, name.as_str(), key),
                );
            }
        }

        ctx.join_offsets
            .insert(name.clone(), join_offset + collection.size());
        ctx.records.write_u64(offset, at, collection.size())?;
        ctx.records.write_u64(offset, at + SLOT_SIZE, join_offset)?;
        debug!(
            resource = owner,
            association = %name,
            join_offset,
            size = collection.size(),
            "wrote join range"
        );
        Ok(())
    }

    fn load(&self, object: Option<&mut Object>, ctx: &LoadContext<'_>) -> AccessResult<()> {
        let name = &self.association.name;
        let object = object.ok_or_else(|| null_object(name))?;
        let offset = object.offset()?;
        let at = self.association.offset;
        let size = ctx.records.read_u64(offset, at)?;
        let join_offset = ctx.records.read_u64(offset, at + SLOT_SIZE)?;
        let source = JoinSource::new(object.resource().name(), name.as_str());
        let collection =
            Collection::from_join(self.association.target.clone(), source, size, join_offset);
        object.set(name, collection)
    }
}
