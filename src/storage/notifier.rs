//! Change notification
//!
//! Listeners are held weakly: registering does not keep a listener alive,
//! and a dropped listener silently stops receiving events. Each commit
//! snapshots the live listeners, so late registrants miss earlier commits.
//!
//! Every callback runs on the notifier's own thread. Batches posted from
//! other threads are queued there, which keeps successive batches ordered.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use super::error::Result;
use super::queue::SerialWorker;
use super::store::Preferences;

/// Receives a callback for every key whose value changed in a commit
pub trait PreferenceListener: Send + Sync {
    fn on_changed(&self, prefs: &Preferences, key: &str);
}

/// Registration handle returned by [`Preferences::register_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<ListenerId, Weak<dyn PreferenceListener>>,
}

impl ListenerRegistry {
    pub(crate) fn register(&mut self, listener: Weak<dyn PreferenceListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, listener);
        id
    }

    pub(crate) fn unregister(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Live listeners in registration order. Dead entries are pruned.
    pub(crate) fn snapshot(&mut self) -> Vec<Arc<dyn PreferenceListener>> {
        let mut live = Vec::with_capacity(self.listeners.len());
        self.listeners.retain(|_, weak| match weak.upgrade() {
            Some(listener) => {
                live.push(listener);
                true
            }
            None => false,
        });
        live
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

/// Keys changed by one commit, with the listeners registered at that time
pub(crate) struct ChangeBatch {
    pub(crate) store: Preferences,
    pub(crate) keys: Vec<String>,
    pub(crate) listeners: Vec<Arc<dyn PreferenceListener>>,
}

impl ChangeBatch {
    fn deliver(self) {
        // Most recently applied key first
        for key in self.keys.iter().rev() {
            for listener in &self.listeners {
                listener.on_changed(&self.store, key);
            }
        }
    }
}

/// Owns the thread all listener callbacks run on
pub struct Notifier {
    worker: SerialWorker,
}

impl Notifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            worker: SerialWorker::spawn("prefstore-notify")?,
        })
    }

    /// True when called from the notification thread
    pub fn is_notifier_thread(&self) -> bool {
        self.worker.is_current()
    }

    pub(crate) fn dispatch(&self, batch: ChangeBatch) {
        if batch.keys.is_empty() || batch.listeners.is_empty() {
            return;
        }
        if self.is_notifier_thread() {
            batch.deliver();
        } else {
            self.worker.submit(Box::new(move || batch.deliver()));
        }
    }

    /// Blocks until every batch posted before this call has been delivered
    pub fn flush(&self) {
        self.worker.flush();
    }
}
