//! Buffered editor mutations and the rule for applying them
//!
//! An editor records what a caller wants to change; nothing touches the
//! cache until commit. At commit the buffer is applied in a fixed order:
//! `clear` first, then each mutation in the order its key was first edited.

use indexmap::IndexMap;

use super::value::{PrefMap, PrefValue};

/// A pending change to one key
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Store a value. `Set(None)` is an explicit null and deletes the key.
    Set(Option<PrefValue>),
    /// Delete the key
    Remove,
}

/// What an editor has buffered since its last commit
#[derive(Debug, Default, Clone)]
pub struct PendingEdits {
    pub clear: bool,
    pub mutations: IndexMap<String, Mutation>,
}

impl PendingEdits {
    pub fn is_empty(&self) -> bool {
        !self.clear && self.mutations.is_empty()
    }

    /// Records a mutation, replacing any earlier one for the same key
    pub fn record(&mut self, key: impl Into<String>, mutation: Mutation) {
        self.mutations.insert(key.into(), mutation);
    }

    /// Drains the buffer, leaving it empty for reuse
    pub fn take(&mut self) -> PendingEdits {
        std::mem::take(self)
    }
}

/// Outcome of applying a buffer to a map
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AppliedEdits {
    /// True when the map's content differs from before
    pub changed: bool,
    /// Keys whose value changed, in application order.
    /// Keys removed only by `clear` are not listed.
    pub keys: Vec<String>,
}

/// Applies buffered edits to `map`.
///
/// A write of a value equal to the current one is skipped, as is a removal
/// of an absent key; neither counts as a change.
pub fn apply_mutations(map: &mut PrefMap, edits: PendingEdits) -> AppliedEdits {
    let mut applied = AppliedEdits::default();

    if edits.clear && !map.is_empty() {
        map.clear();
        applied.changed = true;
    }

    for (key, mutation) in edits.mutations {
        match mutation {
            Mutation::Remove | Mutation::Set(None) => {
                if map.remove(&key).is_none() {
                    continue;
                }
            }
            Mutation::Set(Some(value)) => {
                if map.get(&key) == Some(&value) {
                    continue;
                }
                map.insert(key.clone(), value);
            }
        }

        applied.changed = true;
        applied.keys.push(key);
    }

    applied
}
