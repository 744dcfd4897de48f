//! Batched edits and the commit protocol
//!
//! An [`Editor`] buffers puts, removes and clears. Committing turns the
//! buffer into a [`CommitResult`]: an immutable snapshot of one generation
//! that the notifier and the disk writer both consume.
//!
//! Lock order: store lock, then editor lock. Never the reverse.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::notifier::PreferenceListener;
use super::store::Preferences;
use crate::domain::{apply_mutations, Mutation, PendingEdits, PrefMap, PrefValue};

/// How a disk write ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// False when the write was skipped as unnecessary
    pub was_written: bool,
    /// True when the commit's state is durable (or already was)
    pub success: bool,
}

impl WriteOutcome {
    pub fn written() -> Self {
        Self {
            was_written: true,
            success: true,
        }
    }

    pub fn skipped() -> Self {
        Self {
            was_written: false,
            success: true,
        }
    }

    pub fn failed() -> Self {
        Self {
            was_written: false,
            success: false,
        }
    }
}

struct CompletionState {
    outcome: Mutex<Option<WriteOutcome>>,
    done: Condvar,
}

/// One-shot signal fired when a commit's write finishes
#[derive(Clone)]
pub struct Completion {
    state: Arc<CompletionState>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(CompletionState {
                outcome: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    /// Records the outcome and wakes every waiter. Later signals are ignored.
    pub(crate) fn signal(&self, outcome: WriteOutcome) {
        let mut slot = self.state.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.state.done.notify_all();
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.outcome.lock().is_some()
    }

    /// Blocks until the write has finished
    pub fn wait(&self) -> WriteOutcome {
        let mut slot = self.state.outcome.lock();
        loop {
            if let Some(outcome) = *slot {
                return outcome;
            }
            self.state.done.wait(&mut slot);
        }
    }
}

/// Immutable result of committing one editor buffer
pub struct CommitResult {
    pub(crate) generation: u64,
    /// Changed keys in application order; `None` when nobody listens
    pub(crate) keys_modified: Option<Vec<String>>,
    pub(crate) listeners: Option<Vec<Arc<dyn PreferenceListener>>>,
    /// The full content of this generation
    pub(crate) map: Arc<PrefMap>,
    pub(crate) completion: Completion,
}

impl CommitResult {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn map(&self) -> &PrefMap {
        &self.map
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }
}

/// Buffers mutations until `apply` or `commit`.
///
/// Methods take `&self` so an editor can be shared; the buffer has its own
/// lock.
pub struct Editor {
    store: Preferences,
    pending: Mutex<PendingEdits>,
}

impl Editor {
    pub(crate) fn new(store: Preferences) -> Self {
        Self {
            store,
            pending: Mutex::new(PendingEdits::default()),
        }
    }

    fn record(&self, key: &str, mutation: Mutation) -> &Self {
        self.pending.lock().record(key, mutation);
        self
    }

    /// Stores a value. `None` deletes the key at commit.
    pub fn put(&self, key: &str, value: Option<PrefValue>) -> &Self {
        self.record(key, Mutation::Set(value))
    }

    pub fn put_string(&self, key: &str, value: &str) -> &Self {
        self.put(key, Some(PrefValue::String(value.to_string())))
    }

    pub fn put_int(&self, key: &str, value: i32) -> &Self {
        self.put(key, Some(PrefValue::Int(value)))
    }

    pub fn put_long(&self, key: &str, value: i64) -> &Self {
        self.put(key, Some(PrefValue::Long(value)))
    }

    pub fn put_float(&self, key: &str, value: f32) -> &Self {
        self.put(key, Some(PrefValue::Float(value)))
    }

    pub fn put_bool(&self, key: &str, value: bool) -> &Self {
        self.put(key, Some(PrefValue::Bool(value)))
    }

    pub fn put_string_set<I, S>(&self, key: &str, values: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        self.put(key, Some(PrefValue::StringSet(set)))
    }

    pub fn remove(&self, key: &str) -> &Self {
        self.record(key, Mutation::Remove)
    }

    /// Removes every key. Runs before the other buffered mutations.
    pub fn clear(&self) -> &Self {
        self.pending.lock().clear = true;
        self
    }

    /// Commits to memory and schedules the disk write without waiting.
    ///
    /// Listeners are notified immediately; the in-memory state they observe
    /// already includes this commit.
    pub fn apply(&self) {
        let result = Arc::new(self.commit_to_memory());
        self.store.enqueue_async_write(&result);
        self.store.notify_listeners(&result);
    }

    /// Commits to memory, writes to disk and waits for the write.
    ///
    /// Returns true if the new state is durable.
    pub fn commit(&self) -> bool {
        self.commit_with_outcome().success
    }

    /// Like [`commit`](Self::commit), reporting whether disk I/O happened
    pub fn commit_with_outcome(&self) -> WriteOutcome {
        let result = Arc::new(self.commit_to_memory());
        self.store.enqueue_sync_write(&result);
        let outcome = result.completion.wait();
        debug!(
            generation = result.generation,
            written = outcome.was_written,
            success = outcome.success,
            "commit finished"
        );
        self.store.notify_listeners(&result);
        outcome
    }

    fn commit_to_memory(&self) -> CommitResult {
        let mut state = self.store.loaded_state();

        // An in-flight write may still be serializing the current map
        if state.writes_in_flight > 0 {
            let copy = PrefMap::clone(&state.map);
            state.map = Arc::new(copy);
            debug!(
                in_flight = state.writes_in_flight,
                "copied map to isolate in-flight write"
            );
        }

        let live = state.listeners.snapshot();
        let listeners = (!live.is_empty()).then_some(live);

        let applied = {
            let edits = self.pending.lock().take();
            apply_mutations(Arc::make_mut(&mut state.map), edits)
        };

        if applied.changed {
            state.generation += 1;
        }
        state.writes_in_flight += 1;

        CommitResult {
            generation: state.generation,
            keys_modified: listeners.as_ref().map(|_| applied.keys),
            listeners,
            map: Arc::clone(&state.map),
            completion: Completion::new(),
        }
    }
}
