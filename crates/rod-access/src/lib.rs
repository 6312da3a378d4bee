//! Object properties, associations and collections for ROD.
//!
//! This crate moves values between in-memory [`Object`]s and fixed-size
//! records. Each property is served by an [`Accessor`]; associations to
//! objects that are not stored yet are completed later through the
//! [`PendingUpdates`] queue; plural associations load as lazy
//! [`Collection`] proxies over a join index.
//!
//! # Key Types
//!
//! - [`Object`] / [`Value`] / [`Reference`] -- in-memory instances
//! - [`Accessor`] -- scalar, sequence, singular and plural property bridges
//! - [`PendingUpdates`] -- deferred identifier writes keyed by object handle
//! - [`Collection`] -- lazy view over a plural association
//! - [`Resolver`] / [`Directory`] -- resource and record lookup seam

pub mod accessor;
pub mod collection;
pub mod directory;
pub mod error;
pub mod object;
pub mod pending;
pub mod value;

#[cfg(test)]
mod testing;

pub use accessor::{
    accessors_for, Accessor, LoadContext, PluralAccessor, SaveContext, ScalarAccessor,
    SequenceAccessor, SingularAccessor,
};
pub use collection::{
    decode_join_value, join_key, join_position, join_value, read_join_entry, Collection, Iter, JoinSource,
};
pub use directory::{Directory, Resolver};
pub use error::{AccessError, AccessResult};
pub use object::Object;
pub use pending::{PendingUpdates, UpdateTarget, Updater};
pub use value::{Identity, Reference, Value};
