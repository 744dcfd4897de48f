//! # Storage Layer
//!
//! A file-backed preference store with in-memory reads and crash-safe writes.
//!
//! ## Components
//!
//! | Component | Role | Thread |
//! |-----------|------|--------|
//! | [`Preferences`] | Cached map, accessors, listener registry | caller |
//! | [`Editor`] | Buffers edits, commits a generation | caller |
//! | [`WriteQueue`] | Runs disk writes in submission order | `prefstore-writer` |
//! | [`Notifier`] | Delivers change callbacks | `prefstore-notify` |
//! | [`LoadHandle`] | One-shot background load | `prefstore-load` |
//! | [`StoreWatcher`] | Reloads after external edits | `prefstore-watch` |
//!
//! ## On-Disk Layout
//!
//! ```text
//! prefs.json        # Primary file (JSON, keys sorted)
//! prefs.json.bak    # Present only while a write is in progress
//! ```
//!
//! A write renames the primary to the backup, writes a fresh primary,
//! fsyncs it and deletes the backup. Finding a backup on load means the
//! last write never finished, so the backup wins.
//!
//! ## Lock Order
//!
//! Writer lock, then store lock, then editor lock.

mod config;
mod editor;
mod error;
mod format;
mod loader;
mod notifier;
mod queue;
mod store;
mod watch;
mod writer;

pub use config::{StoreConfig, DEFAULT_FILE_NAME};
pub use editor::{CommitResult, Completion, Editor, WriteOutcome};
pub use error::{Result, StoreError};
pub use format::{decode, encode, FORMAT_VERSION};
pub use loader::{backup_path, load_from_disk, FileStamp, LoadHandle, Loaded, BACKUP_SUFFIX};
pub use notifier::{ListenerId, Notifier, PreferenceListener};
pub use queue::{PendingWrite, PendingWriteId, PendingWrites, ShutdownCoordinator, WriteQueue};
pub use store::{Preferences, PreferencesBuilder};
pub use watch::StoreWatcher;
pub use writer::SyncStats;
