//! Loading preferences from disk
//!
//! A load runs on its own thread and is exposed as a [`LoadHandle`], a
//! one-shot value that readers block on until it resolves. Loads never
//! fail from the caller's point of view: anything unreadable becomes an
//! empty map.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::error::{Result, StoreError};
use super::format;
use crate::domain::PrefMap;

/// Suffix appended to the primary path to form the backup path
pub const BACKUP_SUFFIX: &str = ".bak";

/// Returns the backup path for a preferences file
pub fn backup_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Modification time and size of the primary file, used to spot edits
/// made by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

impl FileStamp {
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            modified: meta.modified()?,
            len: meta.len(),
        })
    }
}

/// Result of one load
#[derive(Debug, Default)]
pub struct Loaded {
    pub map: Arc<PrefMap>,
    /// Baseline for change detection; `None` if nothing was parsed
    pub stamp: Option<FileStamp>,
}

/// Reads the preferences file, restoring from the backup first if one
/// exists.
pub fn load_from_disk(file: &Path, backup: &Path) -> Loaded {
    if backup.exists() {
        // An interrupted write left the backup behind; it is authoritative
        debug!(file = %file.display(), "restoring preferences from backup");
        let _ = fs::remove_file(file);
        if let Err(e) = fs::rename(backup, file) {
            warn!(backup = %backup.display(), error = %e, "failed to restore backup");
        }
    }

    match read_file(file) {
        Ok((map, stamp)) => Loaded {
            map: Arc::new(map),
            stamp: Some(stamp),
        },
        Err(StoreError::Load { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            Loaded::default()
        }
        Err(e) => {
            warn!(file = %file.display(), error = %e, "cannot read preferences, starting empty");
            Loaded::default()
        }
    }
}

fn read_file(file: &Path) -> Result<(PrefMap, FileStamp)> {
    let load_err = |source| StoreError::Load {
        path: file.to_path_buf(),
        source,
    };

    let stamp = FileStamp::read(file).map_err(load_err)?;
    let handle = File::open(file).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            warn!(file = %file.display(), "no permission to read preferences file");
        }
        load_err(e)
    })?;

    let mut bytes = Vec::with_capacity(stamp.len as usize);
    BufReader::with_capacity(16 * 1024, handle)
        .read_to_end(&mut bytes)
        .map_err(load_err)?;

    let map = format::decode(&bytes)?;
    Ok((map, stamp))
}

struct Slot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// One-shot handle to a value computed on a background thread
pub struct LoadHandle<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for LoadHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone + Default + Send + 'static> LoadHandle<T> {
    /// Runs `load` on a new thread.
    ///
    /// If the thread cannot be started the handle resolves to `T::default()`.
    pub fn spawn<F>(load: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let handle = Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                ready: Condvar::new(),
            }),
        };

        let slot = Arc::clone(&handle.slot);
        let spawned = thread::Builder::new()
            .name("prefstore-load".to_string())
            .spawn(move || {
                let value = load();
                *slot.value.lock() = Some(value);
                slot.ready.notify_all();
            });

        if let Err(e) = spawned {
            warn!(error = %e, "failed to start load thread, using empty preferences");
            *handle.slot.value.lock() = Some(T::default());
        }

        handle
    }

    /// Returns true once the value is available
    pub fn is_ready(&self) -> bool {
        self.slot.value.lock().is_some()
    }

    /// Blocks until the value is available
    pub fn wait(&self) -> T {
        let mut value = self.slot.value.lock();
        loop {
            if let Some(v) = value.as_ref() {
                return v.clone();
            }
            self.slot.ready.wait(&mut value);
        }
    }
}
