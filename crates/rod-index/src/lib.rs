//! Key-value indexes for the ROD object store.
//!
//! An [`Index`] maps byte-encoded keys to one or more byte-encoded values.
//! It backs both secondary lookups on indexed fields and the join entries
//! that materialize plural associations.
//!
//! # Key Types
//!
//! - [`Index`] -- lifecycle-managed index (closed / open / destroyed)
//! - [`IndexBackend`] -- storage strategy seam
//! - [`HashBackend`] -- hash table; values per key keep insertion order
//! - [`BtreeBackend`] -- ordered map; keys iterate in encoded byte order
//! - [`Encode`] / [`Decode`] -- order-preserving key and value codec
//!
//! # Lifecycle
//!
//! ```text
//! closed --open--> open --close/save--> closed
//!    \                                    |
//!     `-------------destroy---------------'--> destroyed
//! ```

pub mod backend;
pub mod codec;
pub mod error;
pub mod index;

pub use backend::{BtreeBackend, HashBackend, IndexBackend};
pub use codec::{Decode, Encode};
pub use error::{IndexError, IndexResult};
pub use index::{kind_from_config, EachDecoded, EachFor, Index, IndexState, Pairs};
pub use rod_types::IndexKind;
