//! Storage primitives for the ROD object store.
//!
//! This crate is the narrow storage surface the accessor layer writes
//! through. It knows nothing about resources or properties: it stores
//! fixed-size records addressed by offset, append-only byte payloads, and
//! tracks transaction state.
//!
//! # Storage Types
//!
//! - [`Container`] -- trait for fixed-size record storage with typed slot access
//! - [`RecordContainer`] -- in-memory records with per-slot owner tags, persisted
//!   to a CRC-checked `.dat` file
//! - [`ByteStore`] -- append-only byte container for variable-length values
//! - [`Transaction`] -- begin/commit/abort/reset state machine
//!
//! # Design Rules
//!
//! 1. Records are never removed; offsets are stable until an arrangement pass.
//! 2. The byte container only grows. Overwritten values leave stale bytes behind.
//! 3. Files are read whole on open and written whole on flush.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod bytes;
pub mod error;
pub mod record;
pub mod traits;
pub mod transaction;

pub use bytes::ByteStore;
pub use error::{StoreError, StoreResult};
pub use record::RecordContainer;
pub use traits::Container;
pub use transaction::{Transaction, TxOutcome};
