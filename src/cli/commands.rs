//! Command implementations
//!
//! Every mutating command commits synchronously so the process never exits
//! with a write still queued.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;

use super::output::Output;
use crate::domain::{PrefMap, PrefValue, ValueKind};
use crate::storage::{Preferences, StoreConfig, StoreError, StoreWatcher};

/// Opens the store at `file`
pub fn open(file: &Path, config: &StoreConfig) -> Result<Preferences> {
    Preferences::builder(file)
        .config(config.clone())
        .open()
        .with_context(|| format!("Failed to open preferences: {}", file.display()))
}

pub fn get(output: &Output, prefs: &Preferences, key: &str, default: Option<&str>) -> Result<()> {
    match (prefs.get(key), default) {
        (Some(value), _) => output.value(key, &value),
        (None, Some(default)) => output.value(key, &PrefValue::from(default)),
        (None, None) => bail!("Key not found: {}", key),
    }
    Ok(())
}

pub fn set(output: &Output, prefs: &Preferences, key: &str, kind: ValueKind, raw: &str) -> Result<()> {
    let value = PrefValue::parse(kind, raw).map_err(StoreError::from)?;

    let before = prefs.generation();
    let outcome = prefs.edit().put(key, Some(value)).commit_with_outcome();
    if !outcome.success {
        bail!("Failed to write {}", prefs.path().display());
    }

    report(output, key, prefs.generation() != before, "Set", "Unchanged");
    Ok(())
}

pub fn remove(output: &Output, prefs: &Preferences, key: &str) -> Result<()> {
    let before = prefs.generation();
    if !prefs.edit().remove(key).commit() {
        bail!("Failed to write {}", prefs.path().display());
    }

    report(output, key, prefs.generation() != before, "Removed", "Not present");
    Ok(())
}

pub fn clear(output: &Output, prefs: &Preferences) -> Result<()> {
    let count = prefs.len();
    if !prefs.edit().clear().commit() {
        bail!("Failed to write {}", prefs.path().display());
    }

    output.success(&format!("Cleared {} entries", count), None, count > 0);
    Ok(())
}

pub fn list(output: &Output, prefs: &Preferences) {
    let sorted: BTreeMap<String, PrefValue> = prefs.get_all().into_iter().collect();
    output.entries(&sorted);
}

pub fn contains(output: &Output, prefs: &Preferences, key: &str) {
    let present = prefs.contains(key);
    if output.is_json() {
        output.data(&serde_json::json!({ "key": key, "present": present }));
    } else {
        println!("{}", present);
    }
}

/// Prints external changes until the process is interrupted
pub fn watch(output: &Output, prefs: &Preferences, config: &StoreConfig) -> Result<()> {
    let printer = *output;
    let last_seen = Mutex::new(prefs.get_all());

    let _watcher = StoreWatcher::start(
        prefs.clone(),
        Duration::from_millis(config.watch_debounce_ms),
        move |prefs| {
            let current = prefs.get_all();
            let mut last = last_seen.lock();
            for key in changed_keys(&last, &current) {
                printer.change(&key, current.get(&key));
            }
            *last = current;
        },
    )?;

    if !output.is_json() {
        eprintln!("Watching {} (Ctrl-C to stop)", prefs.path().display());
    }

    loop {
        thread::park();
    }
}

fn report(output: &Output, key: &str, changed: bool, done: &str, noop: &str) {
    let verb = if changed { done } else { noop };
    output.success(&format!("{} {}", verb, key), Some(key), changed);
}

/// Keys whose presence or value differs between two maps, sorted
fn changed_keys(before: &PrefMap, after: &PrefMap) -> Vec<String> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|key| before.get(*key) != after.get(*key))
        .cloned()
        .collect()
}
