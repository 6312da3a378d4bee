use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rod_types::{Cardinality, Handle, Resource, RodId};

use crate::collection::Collection;
use crate::error::{AccessError, AccessResult};
use crate::value::{Reference, Value};

/// An in-memory instance of a resource.
///
/// The object carries a [`RodId`] once it has been stored, and a
/// process-unique [`Handle`] from the moment it is created. Properties start
/// out null, except plural associations which start as empty collections.
#[derive(Clone, PartialEq)]
pub struct Object {
    resource: Arc<Resource>,
    rod_id: RodId,
    handle: Handle,
    values: BTreeMap<String, Value>,
}

impl Object {
    pub fn new(resource: Arc<Resource>) -> Self {
        Self::with_id(resource, RodId::NULL)
    }

    /// Blank object bound to an existing record, ready to be loaded.
    pub fn with_id(resource: Arc<Resource>, rod_id: RodId) -> Self {
        let mut values = BTreeMap::new();
        for field in resource.fields() {
            values.insert(field.name.clone(), Value::Null);
        }
        for association in resource.associations() {
            let value = match association.cardinality {
                Cardinality::Singular => Value::Null,
                Cardinality::Plural => {
                    Value::Refs(Collection::new(association.target.clone()))
                }
            };
            values.insert(association.name.clone(), value);
        }
        Self {
            resource,
            rod_id,
            handle: Handle::next(),
            values,
        }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn rod_id(&self) -> RodId {
        self.rod_id
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_persisted(&self) -> bool {
        !self.rod_id.is_null()
    }

    /// Bind the object to the record it was stored in.
    pub fn assign_id(&mut self, rod_id: RodId) {
        self.rod_id = rod_id;
    }

    /// Physical offset of the object's record.
    pub fn offset(&self) -> AccessResult<u64> {
        self.rod_id.offset().ok_or_else(|| {
            AccessError::InvalidArgument(format!(
                "{} object has not been assigned a rod_id",
                self.resource.name()
            ))
        })
    }

    /// Reference to this object, usable before it has been stored.
    pub fn reference(&self) -> Reference {
        if self.is_persisted() {
            Reference::stored(self.resource.clone(), self.rod_id)
        } else {
            Reference::pending(self.resource.clone(), self.handle)
        }
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    pub fn set(&mut self, property: &str, value: impl Into<Value>) -> AccessResult<()> {
        let slot = self.slot_mut(property)?;
        *slot = value.into();
        Ok(())
    }

    /// Point a singular association at `target`, or clear it.
    pub fn link(&mut self, property: &str, target: Option<&Object>) -> AccessResult<()> {
        self.set(property, target.map(Object::reference))
    }

    pub fn collection(&self, property: &str) -> AccessResult<&Collection> {
        match self.values.get(property) {
            Some(Value::Refs(collection)) => Ok(collection),
            Some(_) => Err(AccessError::TypeMismatch {
                property: property.to_string(),
                expected: "collection",
            }),
            None => Err(self.unknown(property)),
        }
    }

    pub fn collection_mut(&mut self, property: &str) -> AccessResult<&mut Collection> {
        match self.slot_mut(property)? {
            Value::Refs(collection) => Ok(collection),
            _ => Err(AccessError::TypeMismatch {
                property: property.to_string(),
                expected: "collection",
            }),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn slot_mut(&mut self, property: &str) -> AccessResult<&mut Value> {
        match self.values.get_mut(property) {
            Some(value) => Ok(value),
            None => Err(AccessError::UnknownProperty {
                resource: self.resource.name().to_string(),
                property: property.to_string(),
            }),
        }
    }

    fn unknown(&self, property: &str) -> AccessError {
        AccessError::UnknownProperty {
            resource: self.resource.name().to_string(),
            property: property.to_string(),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("resource", &self.resource.name())
            .field("rod_id", &self.rod_id)
            .field("handle", &self.handle)
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rod_types::{FieldType, ResourceBuilder};

    fn user() -> Arc<Resource> {
        Arc::new(
            ResourceBuilder::new("User")
                .field("name", FieldType::String)
                .has_one("account", "Account")
                .has_many("files", "File")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn new_object_has_null_fields_and_empty_collections() {
        let object = Object::new(user());
        assert!(!object.is_persisted());
        assert_eq!(object.get("name"), Some(&Value::Null));
        assert_eq!(object.get("account"), Some(&Value::Null));
        assert!(object.collection("files").unwrap().is_empty());
    }

    #[test]
    fn unknown_property_is_rejected() {
        let mut object = Object::new(user());
        let err = object.set("email", "a@b.c").unwrap_err();
        assert!(matches!(err, AccessError::UnknownProperty { .. }));
    }

    #[test]
    fn offset_requires_rod_id() {
        let mut object = Object::new(user());
        assert!(matches!(
            object.offset(),
            Err(AccessError::InvalidArgument(_))
        ));
        object.assign_id(RodId::new(3));
        assert_eq!(object.offset().unwrap(), 2);
    }

    #[test]
    fn reference_tracks_persistence() {
        let mut object = Object::new(user());
        let pending = object.reference();
        assert!(!pending.is_persisted());
        assert_eq!(pending.handle(), Some(object.handle()));

        object.assign_id(RodId::new(1));
        assert!(object.reference().is_persisted());
        assert_ne!(object.reference(), pending);
    }

    #[test]
    fn handles_are_distinct() {
        let a = Object::new(user());
        let b = Object::new(user());
        assert_ne!(a.handle(), b.handle());
    }
}
