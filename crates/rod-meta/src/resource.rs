use std::collections::BTreeMap;

use rod_types::{AssociationDescriptor, FieldDescriptor, Resource};
use serde::{Deserialize, Serialize};

use crate::error::{MetaError, MetaResult};

/// Stored form of a compiled [`Resource`] together with its counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub name: String,
    /// Tag written into polymorphic slots and owner tables for this resource.
    /// Survives [`crate::Metadata::add_prefix`] so existing tags keep resolving.
    pub name_hash: u64,
    pub parent: Option<String>,
    pub container: String,
    pub element_size: usize,
    pub fields: Vec<FieldDescriptor>,
    pub singular: Vec<AssociationDescriptor>,
    pub plural: Vec<AssociationDescriptor>,
    /// Records owned by the resource.
    #[serde(default)]
    pub count: u64,
    /// Size of the resource's bytes container.
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub monomorphic: usize,
    #[serde(default)]
    pub polymorphic: usize,
    /// Next free join offset, per plural association.
    #[serde(default)]
    pub join_offsets: BTreeMap<String, u64>,
    /// File stem of the bytes and index files, when it is not `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stem: Option<String>,
    /// File stem of the record container, when it is not `container`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_stem: Option<String>,
}

impl ResourceMeta {
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            name: resource.name().to_string(),
            name_hash: resource.name_hash().get(),
            parent: resource.parent().map(str::to_string),
            container: resource.container().to_string(),
            element_size: resource.element_size(),
            fields: resource.fields().to_vec(),
            singular: resource.singular().to_vec(),
            plural: resource.plural().to_vec(),
            count: 0,
            bytes: 0,
            monomorphic: resource.monomorphic_count(),
            polymorphic: resource.polymorphic_count(),
            join_offsets: resource
                .plural()
                .iter()
                .map(|a| (a.name.clone(), 0))
                .collect(),
            stem: None,
            container_stem: None,
        }
    }

    /// Stem of `<stem>.bytes`, `<stem>.<field>.idx` and
    /// `<stem>.<association>.join.idx`.
    pub fn file_stem(&self) -> &str {
        self.stem.as_deref().unwrap_or(&self.name)
    }

    /// Stem of the `<stem>.dat` record container.
    pub fn container_file_stem(&self) -> &str {
        self.container_stem.as_deref().unwrap_or(&self.container)
    }

    /// Rebuild the compiled descriptor from its stored form.
    pub fn to_resource(&self) -> MetaResult<Resource> {
        Ok(Resource::from_parts(
            self.name.clone(),
            self.parent.clone(),
            self.container.clone(),
            self.fields.clone(),
            self.singular.clone(),
            self.plural.clone(),
            self.element_size,
        )?)
    }

    /// Next free join offset of a plural association.
    pub fn join_offset(&self, association: &str) -> u64 {
        self.join_offsets.get(association).copied().unwrap_or(0)
    }

    /// Fail with [`MetaError::IncompatibleClass`] unless `other` describes the
    /// same physical layout: names, types, offsets and association targets.
    pub fn check_compatibility(&self, other: &ResourceMeta) -> MetaResult<()> {
        let fail = |reason: String| {
            Err(MetaError::IncompatibleClass {
                resource: self.name.clone(),
                reason,
            })
        };

        if self.name != other.name {
            return fail(format!("name {} differs from {}", self.name, other.name));
        }
        if self.container != other.container {
            return fail(format!(
                "container {} differs from {}",
                self.container, other.container
            ));
        }
        if self.parent != other.parent {
            return fail(format!(
                "parent {:?} differs from {:?}",
                self.parent, other.parent
            ));
        }
        if self.element_size != other.element_size {
            return fail(format!(
                "element size {} differs from {}",
                self.element_size, other.element_size
            ));
        }

        if self.fields.len() != other.fields.len() {
            return fail(format!(
                "{} fields, expected {}",
                other.fields.len(),
                self.fields.len()
            ));
        }
        for (mine, theirs) in self.fields.iter().zip(&other.fields) {
            if mine.name != theirs.name {
                return fail(format!("field {} differs from {}", mine.name, theirs.name));
            }
            if mine.field_type != theirs.field_type {
                return fail(format!(
                    "field {} has type {}, expected {}",
                    mine.name, theirs.field_type, mine.field_type
                ));
            }
            if mine.offset != theirs.offset {
                return fail(format!(
                    "field {} at offset {}, expected {}",
                    mine.name, theirs.offset, mine.offset
                ));
            }
        }

        check_associations(&self.name, "singular", &self.singular, &other.singular)?;
        check_associations(&self.name, "plural", &self.plural, &other.plural)
    }

    /// Rename under `prefix`. The files keep their stems.
    pub(crate) fn add_prefix(&mut self, prefix: &str) {
        if self.stem.is_none() {
            self.stem = Some(self.name.clone());
        }
        if self.container_stem.is_none() {
            self.container_stem = Some(self.container.clone());
        }
        self.name = format!("{prefix}{}", self.name);
        self.container = format!("{prefix}{}", self.container);
        if let Some(parent) = &mut self.parent {
            *parent = format!("{prefix}{parent}");
        }
        for association in self.singular.iter_mut().chain(self.plural.iter_mut()) {
            if let Some(target) = &mut association.target {
                *target = format!("{prefix}{target}");
            }
        }
    }
}

fn check_associations(
    resource: &str,
    kind: &str,
    mine: &[AssociationDescriptor],
    theirs: &[AssociationDescriptor],
) -> MetaResult<()> {
    let fail = |reason: String| {
        Err(MetaError::IncompatibleClass {
            resource: resource.to_string(),
            reason,
        })
    };
    if mine.len() != theirs.len() {
        return fail(format!(
            "{} {kind} associations, expected {}",
            theirs.len(),
            mine.len()
        ));
    }
    for (a, b) in mine.iter().zip(theirs) {
        if a.name != b.name {
            return fail(format!("association {} differs from {}", a.name, b.name));
        }
        if a.target != b.target {
            return fail(format!(
                "association {} targets {:?}, expected {:?}",
                a.name, b.target, a.target
            ));
        }
        if a.offset != b.offset {
            return fail(format!(
                "association {} at offset {}, expected {}",
                a.name, b.offset, a.offset
            ));
        }
    }
    Ok(())
}
