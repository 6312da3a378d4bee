//! Metadata and schema compatibility for ROD databases.
//!
//! Every database directory carries one metadata document recording the
//! library version that wrote it, creation and update timestamps, and the
//! compiled descriptor of every resource stored inside. Opening a database
//! compares that document against the running library and the compiled
//! resources before a single record is read.
//!
//! # Key Types
//!
//! - [`Version`] -- `major.minor.patch` tag with the compatibility rules
//! - [`ResourceMeta`] -- stored form of a resource descriptor plus counters
//! - [`Metadata`] -- the per-database document

pub mod error;
pub mod metadata;
pub mod resource;
pub mod version;

pub use error::{MetaError, MetaResult};
pub use metadata::{Metadata, METADATA_FILE};
pub use resource::ResourceMeta;
pub use version::Version;
