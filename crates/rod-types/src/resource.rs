//! Compiled schema descriptors and their physical record layout.
//!
//! A [`Resource`] describes one record type: its scalar and variable-length
//! fields, its associations, and the byte offset of every property inside a
//! fixed-size record. Every slot is [`SLOT_SIZE`] bytes wide:
//!
//! ```text
//! integer / unsigned / float      [value]
//! string / json / object          [bytes offset][bytes length]
//! singular association            [rod_id]
//! polymorphic singular            [rod_id][name hash]
//! plural association              [count][join offset]
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::id::NameHash;

/// Width in bytes of every slot in a record.
pub const SLOT_SIZE: usize = 8;

/// Semantic type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    UnsignedInteger,
    Float,
    String,
    Json,
    Object,
}

impl FieldType {
    /// Variable-length fields live in the bytes container.
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::String | Self::Json | Self::Object)
    }

    /// Number of slots the field occupies in a record.
    pub fn slot_count(&self) -> usize {
        if self.is_variable() {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::UnsignedInteger => "ulong",
            Self::Float => "float",
            Self::String => "string",
            Self::Json => "json",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

impl FromStr for FieldType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(Self::Integer),
            "ulong" | "unsigned" => Ok(Self::UnsignedInteger),
            "float" => Ok(Self::Float),
            "string" => Ok(Self::String),
            "json" => Ok(Self::Json),
            "object" => Ok(Self::Object),
            other => Err(TypeError::UnknownFieldType(other.to_string())),
        }
    }
}

/// Backing strategy of an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Hash table; values per key keep insertion order.
    Hash,
    /// Ordered tree; keys iterate in byte order of their encoding.
    Btree,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash => f.write_str("hash"),
            Self::Btree => f.write_str("btree"),
        }
    }
}

impl FromStr for IndexKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash" => Ok(Self::Hash),
            "btree" => Ok(Self::Btree),
            other => Err(TypeError::UnknownIndexKind(other.to_string())),
        }
    }
}

/// A resolved field with its position inside the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Byte offset of the first slot.
    pub offset: usize,
    /// Secondary index maintained for the field, if any.
    pub index: Option<IndexKind>,
}

impl FieldDescriptor {
    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    pub fn is_variable(&self) -> bool {
        self.field_type.is_variable()
    }
}

/// Whether an association refers to one object or to many.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Singular,
    Plural,
}

/// A resolved association with its position inside the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDescriptor {
    pub name: String,
    /// Target resource name; `None` means polymorphic.
    pub target: Option<String>,
    pub cardinality: Cardinality,
    /// Byte offset of the first slot.
    pub offset: usize,
}

impl AssociationDescriptor {
    pub fn is_polymorphic(&self) -> bool {
        self.target.is_none()
    }

    /// Number of slots the association occupies in a record.
    pub fn slot_count(&self) -> usize {
        match self.cardinality {
            Cardinality::Singular if self.is_polymorphic() => 2,
            Cardinality::Singular => 1,
            Cardinality::Plural => 2,
        }
    }
}

/// Compiled schema descriptor of one record type.
///
/// Resources are immutable once built and are shared as `Arc<Resource>`
/// for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    name: String,
    name_hash: NameHash,
    parent: Option<String>,
    container: String,
    fields: Vec<FieldDescriptor>,
    singular: Vec<AssociationDescriptor>,
    plural: Vec<AssociationDescriptor>,
    element_size: usize,
}

impl Resource {
    /// Rebuild a resource from an already computed layout.
    ///
    /// Used when descriptors are read back from metadata; the layout is taken
    /// as-is and only the name hash is recomputed.
    pub fn from_parts(
        name: impl Into<String>,
        parent: Option<String>,
        container: impl Into<String>,
        fields: Vec<FieldDescriptor>,
        singular: Vec<AssociationDescriptor>,
        plural: Vec<AssociationDescriptor>,
        element_size: usize,
    ) -> TypeResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name_hash: NameHash::derive(&name),
            name,
            parent,
            container: container.into(),
            fields,
            singular,
            plural,
            element_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_hash(&self) -> NameHash {
        self.name_hash
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Name of the physical container holding the records.
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn singular(&self) -> &[AssociationDescriptor] {
        &self.singular
    }

    pub fn plural(&self) -> &[AssociationDescriptor] {
        &self.plural
    }

    /// Size in bytes of one record.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a singular or plural association by name.
    pub fn association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.singular
            .iter()
            .chain(self.plural.iter())
            .find(|a| a.name == name)
    }

    /// All associations, singular first.
    pub fn associations(&self) -> impl Iterator<Item = &AssociationDescriptor> {
        self.singular.iter().chain(self.plural.iter())
    }

    /// Number of associations with a fixed target.
    pub fn monomorphic_count(&self) -> usize {
        self.associations().filter(|a| !a.is_polymorphic()).count()
    }

    /// Number of polymorphic associations.
    pub fn polymorphic_count(&self) -> usize {
        self.associations().filter(|a| a.is_polymorphic()).count()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn validate_name(name: &str) -> TypeResult<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(TypeError::InvalidName(name.to_string()));
    }
    Ok(())
}

enum PendingProperty {
    Field(String, FieldType, Option<IndexKind>),
    Singular(String, Option<String>),
    Plural(String, Option<String>),
}

impl PendingProperty {
    fn name(&self) -> &str {
        match self {
            Self::Field(name, ..) | Self::Singular(name, _) | Self::Plural(name, _) => name,
        }
    }
}

/// Builds a [`Resource`] and computes its record layout.
///
/// Offsets are assigned in declaration order, with all fields placed before
/// singular associations and singular before plural ones. A resource that
/// inherits from a parent starts with the parent's layout and, unless told
/// otherwise, shares the parent's container.
///
/// ```
/// use rod_types::{FieldType, IndexKind, ResourceBuilder};
///
/// let user = ResourceBuilder::new("User")
///     .field("name", FieldType::String)
///     .indexed_field("age", FieldType::Integer, IndexKind::Hash)
///     .has_one("account", "Account")
///     .build()
///     .unwrap();
/// assert_eq!(user.element_size(), 32);
/// ```
pub struct ResourceBuilder {
    name: String,
    parent: Option<Resource>,
    container: Option<String>,
    properties: Vec<PendingProperty>,
}

impl ResourceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            container: None,
            properties: Vec::new(),
        }
    }

    /// Inherit every property of `parent` at the same offsets.
    pub fn inherits(mut self, parent: &Resource) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Store records in a named container instead of the default one.
    pub fn container(mut self, name: impl Into<String>) -> Self {
        self.container = Some(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.properties
            .push(PendingProperty::Field(name.into(), field_type, None));
        self
    }

    pub fn indexed_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        index: IndexKind,
    ) -> Self {
        self.properties
            .push(PendingProperty::Field(name.into(), field_type, Some(index)));
        self
    }

    pub fn has_one(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.properties
            .push(PendingProperty::Singular(name.into(), Some(target.into())));
        self
    }

    pub fn has_one_polymorphic(mut self, name: impl Into<String>) -> Self {
        self.properties
            .push(PendingProperty::Singular(name.into(), None));
        self
    }

    pub fn has_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.properties
            .push(PendingProperty::Plural(name.into(), Some(target.into())));
        self
    }

    pub fn has_many_polymorphic(mut self, name: impl Into<String>) -> Self {
        self.properties.push(PendingProperty::Plural(name.into(), None));
        self
    }

    /// Compute the layout and produce the immutable descriptor.
    pub fn build(self) -> TypeResult<Resource> {
        validate_name(&self.name)?;

        let (mut fields, mut singular, mut plural, mut offset, inherited_container) =
            match &self.parent {
                Some(parent) => (
                    parent.fields.clone(),
                    parent.singular.clone(),
                    parent.plural.clone(),
                    parent.element_size,
                    Some(parent.container.clone()),
                ),
                None => (Vec::new(), Vec::new(), Vec::new(), 0, None),
            };

        let mut seen: Vec<String> = fields
            .iter()
            .map(|f| f.name.clone())
            .chain(singular.iter().chain(plural.iter()).map(|a| a.name.clone()))
            .collect();
        for property in &self.properties {
            let name = property.name();
            if name.is_empty() || seen.iter().any(|s| s == name) {
                return Err(TypeError::DuplicateProperty {
                    resource: self.name.clone(),
                    property: name.to_string(),
                });
            }
            seen.push(name.to_string());
        }

        let mut properties = self.properties;
        // fields, then singular, then plural; stable within each group
        properties.sort_by_key(|p| match p {
            PendingProperty::Field(..) => 0,
            PendingProperty::Singular(..) => 1,
            PendingProperty::Plural(..) => 2,
        });

        for property in properties {
            match property {
                PendingProperty::Field(name, field_type, index) => {
                    fields.push(FieldDescriptor {
                        name,
                        field_type,
                        offset,
                        index,
                    });
                    offset += field_type.slot_count() * SLOT_SIZE;
                }
                PendingProperty::Singular(name, target) => {
                    let descriptor = AssociationDescriptor {
                        name,
                        target,
                        cardinality: Cardinality::Singular,
                        offset,
                    };
                    offset += descriptor.slot_count() * SLOT_SIZE;
                    singular.push(descriptor);
                }
                PendingProperty::Plural(name, target) => {
                    let descriptor = AssociationDescriptor {
                        name,
                        target,
                        cardinality: Cardinality::Plural,
                        offset,
                    };
                    offset += descriptor.slot_count() * SLOT_SIZE;
                    plural.push(descriptor);
                }
            }
        }

        let container = self
            .container
            .or(inherited_container)
            .unwrap_or_else(|| self.name.clone());

        Ok(Resource {
            name_hash: NameHash::derive(&self.name),
            parent: self.parent.map(|p| p.name),
            name: self.name,
            container,
            fields,
            singular,
            plural,
            element_size: offset.max(SLOT_SIZE),
        })
    }
}
