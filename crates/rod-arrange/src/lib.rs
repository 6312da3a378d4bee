//! Page arrangement for shared record containers.
//!
//! Resources of one family share a container, so their records interleave
//! in allocation order. An arrangement pass moves each resource's records
//! into one contiguous run, in family order, and reports every identifier
//! that changed so references elsewhere can be rewritten.
//!
//! # Key Types
//!
//! - [`ArrangementPlan`] -- pure plan for one resource, computed from the owner table
//! - [`arrange_container`] -- runs one plan per resource and accumulates the moves
//! - [`IdRemap`] -- old identifier to new identifier

pub mod arrange;
pub mod error;
pub mod plan;
pub mod remap;

pub use arrange::{arrange_container, Arrangement};
pub use error::{ArrangeError, ArrangeResult};
pub use plan::ArrangementPlan;
pub use remap::IdRemap;
