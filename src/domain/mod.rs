//! Domain models for prefstore
//!
//! Typed values and the pure commit rule, without any I/O concerns.

mod mutation;
mod value;

pub use mutation::{apply_mutations, AppliedEdits, Mutation, PendingEdits};
pub use value::{PrefMap, PrefValue, ValueError, ValueKind};
