//! prefstore - A file-backed key-value preference store
//!
//! Reads are served from an in-memory map loaded in the background. Writes
//! are batched through an [`Editor`] and committed either synchronously
//! (`commit`) or asynchronously (`apply`), then persisted with a
//! backup-file protocol that survives a crash at any point.
//!
//! ```no_run
//! use prefstore::Preferences;
//!
//! let prefs = Preferences::open("/tmp/app/prefs.json")?;
//! prefs.edit().put_int("launches", 3).put_bool("onboarded", true).apply();
//! assert_eq!(prefs.get_int("launches", 0), 3);
//! # Ok::<(), prefstore::StoreError>(())
//! ```

pub mod cli;
pub mod domain;
pub mod storage;

pub use domain::{PrefMap, PrefValue, ValueKind};
pub use storage::{Editor, PreferenceListener, Preferences, StoreConfig, StoreError};
