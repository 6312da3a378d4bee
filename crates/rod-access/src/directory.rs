use std::sync::Arc;

use rod_types::{NameHash, Resource};

use crate::collection::JoinSource;
use crate::error::AccessResult;
use crate::object::Object;
use crate::value::Reference;

/// Resolves resource descriptors by name or by stored name hash.
pub trait Resolver {
    fn resource(&self, name: &str) -> Option<Arc<Resource>>;

    fn resource_by_hash(&self, hash: NameHash) -> Option<Arc<Resource>>;
}

/// Lookup service used to navigate associations.
///
/// Implemented by a single database for its own resources and by the
/// registry, which routes each request to the owning database.
pub trait Directory: Resolver {
    /// Entry `local` of the join range starting at `join_offset`.
    fn join_entry(
        &self,
        source: &JoinSource,
        join_offset: u64,
        local: u64,
    ) -> AccessResult<Option<Reference>>;

    /// Load the object a reference points at.
    fn find_by_rod_id(&self, reference: &Reference) -> AccessResult<Object>;
}
