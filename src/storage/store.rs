//! The preference store
//!
//! Reads are served from memory. The map is loaded on a background thread
//! when the store opens; the first read blocks until that load finishes.
//!
//! The store holds one swappable `Arc` to the current map. A commit hands a
//! clone of that `Arc` to the disk writer; while any write is in flight the
//! next commit swaps in a private copy before mutating, so a writer's map
//! never changes underneath it.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::config::StoreConfig;
use super::editor::{CommitResult, Editor};
use super::error::{Result, StoreError};
use super::loader::{backup_path, load_from_disk, FileStamp, LoadHandle, Loaded};
use super::notifier::{ChangeBatch, ListenerId, ListenerRegistry, Notifier, PreferenceListener};
use super::queue::{PendingWrite, PendingWrites, ShutdownCoordinator, WriteQueue};
use super::writer::{FileWriter, SyncStats, WriteContext};
use crate::domain::{PrefMap, PrefValue};

/// State guarded by the store lock
pub(crate) struct StoreState {
    /// Set while a load is running; readers wait on it
    pub(crate) load: Option<LoadHandle<Arc<Loaded>>>,
    pub(crate) map: Arc<PrefMap>,
    pub(crate) generation: u64,
    pub(crate) writes_in_flight: usize,
    pub(crate) stamp: Option<FileStamp>,
    pub(crate) listeners: ListenerRegistry,
}

struct Shared {
    file: PathBuf,
    backup: PathBuf,
    state: Mutex<StoreState>,
    /// Held for the whole of every disk write and every load
    writer: Arc<Mutex<FileWriter>>,
    queue: Arc<WriteQueue>,
    notifier: Arc<Notifier>,
    coordinator: Arc<dyn ShutdownCoordinator>,
}

impl WriteContext for Shared {
    fn current_generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn record_stamp(&self, stamp: FileStamp) {
        self.state.lock().stamp = Some(stamp);
    }
}

/// A file-backed preference store. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct Preferences {
    shared: Arc<Shared>,
}

/// Configures collaborators before opening a store
pub struct PreferencesBuilder {
    file: PathBuf,
    config: StoreConfig,
    queue: Option<Arc<WriteQueue>>,
    notifier: Option<Arc<Notifier>>,
    coordinator: Option<Arc<dyn ShutdownCoordinator>>,
}

impl PreferencesBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a write queue between stores
    pub fn write_queue(mut self, queue: Arc<WriteQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Shares a notification thread between stores
    pub fn notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Registers asynchronous writes with `coordinator`
    pub fn shutdown_coordinator(mut self, coordinator: Arc<dyn ShutdownCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Opens the store and starts loading it in the background
    pub fn open(self) -> Result<Preferences> {
        let queue = match self.queue {
            Some(queue) => queue,
            None => Arc::new(WriteQueue::new()?),
        };
        let notifier = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(Notifier::new()?),
        };
        let coordinator = self
            .coordinator
            .unwrap_or_else(|| Arc::new(PendingWrites::new()));

        let backup = backup_path(&self.file);
        let writer = Arc::new(Mutex::new(FileWriter::new(
            self.file.clone(),
            backup.clone(),
            &self.config,
        )));
        let load = spawn_load(&self.file, &backup, &writer);

        debug!(file = %self.file.display(), "opening preferences");

        Ok(Preferences {
            shared: Arc::new(Shared {
                file: self.file,
                backup,
                state: Mutex::new(StoreState {
                    load: Some(load),
                    map: Arc::new(PrefMap::new()),
                    generation: 0,
                    writes_in_flight: 0,
                    stamp: None,
                    listeners: ListenerRegistry::default(),
                }),
                writer,
                queue,
                notifier,
                coordinator,
            }),
        })
    }
}

fn spawn_load(
    file: &Path,
    backup: &Path,
    writer: &Arc<Mutex<FileWriter>>,
) -> LoadHandle<Arc<Loaded>> {
    let file = file.to_path_buf();
    let backup = backup.to_path_buf();
    let writer = Arc::clone(writer);

    LoadHandle::spawn(move || {
        // Keeps the backup restore from racing a write
        let _writing = writer.lock();
        Arc::new(load_from_disk(&file, &backup))
    })
}

impl Preferences {
    /// Opens a store with default configuration
    pub fn open(file: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(file).open()
    }

    pub fn builder(file: impl Into<PathBuf>) -> PreferencesBuilder {
        PreferencesBuilder {
            file: file.into(),
            config: StoreConfig::default(),
            queue: None,
            notifier: None,
            coordinator: None,
        }
    }

    /// Path of the primary file
    pub fn path(&self) -> &Path {
        &self.shared.file
    }

    /// Path of the backup file
    pub fn backup_path(&self) -> &Path {
        &self.shared.backup
    }

    /// Returns true once the background load has finished
    pub fn is_loaded(&self) -> bool {
        let state = self.shared.state.lock();
        state.load.as_ref().map_or(true, LoadHandle::is_ready)
    }

    /// Takes the store lock, first waiting for any pending load
    pub(crate) fn loaded_state(&self) -> MutexGuard<'_, StoreState> {
        loop {
            let mut state = self.shared.state.lock();
            let Some(load) = state.load.clone() else {
                return state;
            };

            if load.is_ready() {
                let loaded = load.wait();
                state.map = Arc::clone(&loaded.map);
                state.stamp = loaded.stamp;
                state.load = None;
                return state;
            }

            drop(state);
            load.wait();
        }
    }

    fn read<T>(&self, key: &str, extract: impl FnOnce(&PrefValue) -> Option<T>) -> Option<T> {
        self.loaded_state().map.get(key).and_then(extract)
    }

    /// Returns the raw value for `key`
    pub fn get(&self, key: &str) -> Option<PrefValue> {
        self.read(key, |v| Some(v.clone()))
    }

    /// Returns the string at `key`, or `default` if it is missing or not a
    /// string
    pub fn get_string(&self, key: &str, default: Option<&str>) -> Option<String> {
        self.read(key, |v| v.as_str().map(String::from))
            .or_else(|| default.map(String::from))
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.read(key, PrefValue::as_int).unwrap_or(default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.read(key, PrefValue::as_long).unwrap_or(default)
    }

    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.read(key, PrefValue::as_float).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.read(key, PrefValue::as_bool).unwrap_or(default)
    }

    pub fn get_string_set(
        &self,
        key: &str,
        default: Option<BTreeSet<String>>,
    ) -> Option<BTreeSet<String>> {
        self.read(key, |v| v.as_string_set().cloned()).or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.loaded_state().map.contains_key(key)
    }

    /// Returns a copy of every entry
    pub fn get_all(&self) -> PrefMap {
        PrefMap::clone(&self.loaded_state().map)
    }

    pub fn len(&self) -> usize {
        self.loaded_state().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts an edit session. Blocks until the store is loaded.
    pub fn edit(&self) -> Editor {
        drop(self.loaded_state());
        Editor::new(self.clone())
    }

    /// Registers a listener without taking ownership of it.
    ///
    /// The listener stops receiving events when it is dropped or
    /// unregistered, whichever comes first.
    pub fn register_listener<L: PreferenceListener + 'static>(&self, listener: &Arc<L>) -> ListenerId {
        let weak: std::sync::Weak<L> = Arc::downgrade(listener);
        self.shared.state.lock().listeners.register(weak)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.shared.state.lock().listeners.unregister(id)
    }

    /// Returns true when the file on disk no longer matches what this store
    /// last read or wrote, and none of this store's writes explain it
    pub fn has_changed_externally(&self) -> bool {
        {
            let state = self.shared.state.lock();
            if state.writes_in_flight > 0 || state.load.is_some() {
                return false;
            }
        }

        let current = FileStamp::read(&self.shared.file);
        let state = self.shared.state.lock();
        match current {
            Ok(stamp) => state.stamp != Some(stamp),
            Err(e) if e.kind() == io::ErrorKind::NotFound => state.stamp.is_some(),
            Err(_) => true,
        }
    }

    /// Reloads from disk if the file changed externally.
    ///
    /// Returns true if a reload was started.
    pub fn reload_if_changed_externally(&self) -> bool {
        if !self.has_changed_externally() {
            return false;
        }

        let mut state = self.shared.state.lock();
        if state.load.is_some() || state.writes_in_flight > 0 {
            return false;
        }

        let reason = StoreError::ExternalModification(self.shared.file.clone());
        info!(reason = %reason, "reloading preferences");
        state.load = Some(spawn_load(
            &self.shared.file,
            &self.shared.backup,
            &self.shared.writer,
        ));
        true
    }

    /// Newest in-memory generation
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }

    /// Newest generation known to be on disk
    pub fn durable_generation(&self) -> u64 {
        self.shared.writer.lock().durable_generation()
    }

    pub fn writes_in_flight(&self) -> usize {
        self.shared.state.lock().writes_in_flight
    }

    /// Number of completed fsyncs
    pub fn sync_count(&self) -> u64 {
        self.shared.writer.lock().stats().count()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.shared.writer.lock().stats().clone()
    }

    /// Blocks until queued writes and notifications have finished
    pub fn flush(&self) {
        self.shared.queue.flush();
        self.shared.notifier.flush();
    }

    pub(crate) fn enqueue_sync_write(&self, result: &Arc<CommitResult>) {
        self.enqueue_disk_write(result, true, None);
    }

    pub(crate) fn enqueue_async_write(&self, result: &Arc<CommitResult>) {
        let pending = PendingWrite::new(result.completion.clone());
        let id = pending.id();
        self.shared.coordinator.register(pending);

        let coordinator = Arc::clone(&self.shared.coordinator);
        self.enqueue_disk_write(result, false, Some(Box::new(move || coordinator.complete(id))));
    }

    fn enqueue_disk_write(
        &self,
        result: &Arc<CommitResult>,
        sync: bool,
        post_write: Option<Box<dyn FnOnce() + Send>>,
    ) {
        let shared = Arc::clone(&self.shared);
        let result = Arc::clone(result);
        let write = move || {
            shared.writer.lock().write(&result, sync, &*shared);
            shared.state.lock().writes_in_flight -= 1;
            if let Some(post_write) = post_write {
                post_write();
            }
        };

        // A blocking commit with nothing else in flight writes on the
        // caller's thread
        if sync && self.shared.state.lock().writes_in_flight == 1 {
            write();
            return;
        }

        self.shared.queue.submit(write);
    }

    pub(crate) fn notify_listeners(&self, result: &CommitResult) {
        let (Some(keys), Some(listeners)) = (&result.keys_modified, &result.listeners) else {
            return;
        };

        self.shared.notifier.dispatch(ChangeBatch {
            store: self.clone(),
            keys: keys.clone(),
            listeners: listeners.clone(),
        });
    }
}
