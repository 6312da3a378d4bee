//! Embedded object database for ROD.
//!
//! This is the main entry point for applications embedding ROD. A
//! [`Database`] is a directory holding the metadata document, one record
//! container per resource family, a bytes container and the indexes of each
//! resource. A [`Registry`] ties several open databases together so objects
//! can reference records stored elsewhere.
//!
//! # Key Types
//!
//! - [`Database`] -- create/open/close, store/load/find, transactions, arrangement
//! - [`Registry`] -- resource and database directory service
//! - [`DatabaseConfig`] -- open options, loadable from TOML
//! - [`LIBRARY_VERSION`] -- version written into new metadata

pub mod config;
pub mod database;
pub mod error;
pub mod registry;

pub use config::DatabaseConfig;
pub use database::{detach_collections, Database};
pub use error::{DbError, DbResult};
pub use registry::Registry;

// Re-export key types
pub use rod_access::{Collection, Object, Reference, Updater, Value};
pub use rod_meta::{Metadata, Version};
pub use rod_types::{FieldType, IndexKind, Resource, ResourceBuilder, RodId};

/// Library version recorded in metadata and checked on open.
pub const LIBRARY_VERSION: Version = Version::new(0, 2, 1);
