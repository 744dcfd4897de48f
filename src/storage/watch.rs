//! Watching the preferences file for external edits
//!
//! The watcher observes the file's directory and, after a debounce, asks
//! the store whether the file changed under it. Events caused by the
//! store's own writes are filtered out by the stamp comparison in
//! [`Preferences::has_changed_externally`].

use std::ffi::OsString;
use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, Debouncer};
use tracing::{debug, warn};

use super::error::{Result, StoreError};
use super::store::Preferences;

/// Watches a store's file and reloads it when someone else changes it
pub struct StoreWatcher {
    debouncer: Option<Debouncer<notify::RecommendedWatcher>>,
    worker: Option<JoinHandle<()>>,
}

impl StoreWatcher {
    /// Starts watching. `on_reload` runs on the watcher thread after each
    /// reload the watcher triggers.
    pub fn start<F>(prefs: Preferences, debounce: Duration, on_reload: F) -> Result<Self>
    where
        F: Fn(&Preferences) + Send + 'static,
    {
        let watch_err = |message: String| StoreError::Watch {
            path: prefs.path().to_path_buf(),
            message,
        };

        let dir = match prefs.path().parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        let names = watched_names(prefs.path());

        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(debounce, tx).map_err(|e| watch_err(e.to_string()))?;
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| watch_err(e.to_string()))?;

        debug!(dir = %dir.display(), "watching preferences directory");

        let worker = thread::Builder::new()
            .name("prefstore-watch".to_string())
            .spawn(move || {
                while let Ok(result) = rx.recv() {
                    match result {
                        Ok(events) => {
                            let relevant = events.iter().any(|e| {
                                e.path
                                    .file_name()
                                    .is_some_and(|name| names.iter().any(|n| n == name))
                            });
                            if relevant && prefs.reload_if_changed_externally() {
                                on_reload(&prefs);
                            }
                        }
                        Err(error) => warn!(error = ?error, "watch error"),
                    }
                }
            })
            .map_err(|source| StoreError::Spawn {
                name: "prefstore-watch",
                source,
            })?;

        Ok(Self {
            debouncer: Some(debouncer),
            worker: Some(worker),
        })
    }
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        // Dropping the debouncer closes the channel, ending the worker
        self.debouncer.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn watched_names(file: &Path) -> Vec<OsString> {
    let Some(name) = file.file_name() else {
        return Vec::new();
    };
    let mut backup = name.to_os_string();
    backup.push(super::loader::BACKUP_SUFFIX);
    vec![name.to_os_string(), backup]
}
