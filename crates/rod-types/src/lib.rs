//! Foundation types for the ROD embedded object store.
//!
//! This crate provides the identifiers, schema descriptors and portable
//! values shared by every other ROD crate. Nothing here touches storage; the
//! types only describe *what* is stored and *where* inside a record.
//!
//! # Key Types
//!
//! - [`RodId`] -- 1-based record identifier, `0` is the null reference
//! - [`NameHash`] -- stable tag identifying a resource for polymorphic references
//! - [`Handle`] -- transient identity of an in-memory object before it has an id
//! - [`Resource`] -- compiled schema descriptor with its physical layout
//! - [`ResourceBuilder`] -- builds a [`Resource`] from resolved field descriptors
//! - [`Portable`] -- self-describing value tree for generic-object fields

pub mod error;
pub mod id;
pub mod portable;
pub mod resource;

pub use error::{TypeError, TypeResult};
pub use id::{Handle, NameHash, RodId};
pub use portable::Portable;
pub use resource::{
    AssociationDescriptor, Cardinality, FieldDescriptor, FieldType, IndexKind, Resource,
    ResourceBuilder, SLOT_SIZE,
};
