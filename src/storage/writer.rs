//! Atomic write protocol
//!
//! At every instant at least one of the primary file and the backup file
//! holds a complete snapshot:
//!
//! 1. The primary is renamed to the backup (unless a backup from an earlier
//!    failure already exists, in which case the primary is just deleted).
//! 2. A fresh primary is written and fsynced.
//! 3. Permissions are applied and the file is stat'ed for change detection.
//! 4. The backup is deleted; this generation is now durable.
//!
//! If step 2 or 3 fails the partial primary is deleted so the next load
//! recovers from the backup.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::config::StoreConfig;
use super::editor::{CommitResult, WriteOutcome};
use super::error::{Result, StoreError};
use super::format;
use super::loader::FileStamp;

/// Permissions for a parent directory the writer has to create
const DIR_MODE: u32 = 0o771;

const SYNC_BUCKETS: usize = 16;

/// Store state the writer consults while writing
pub(crate) trait WriteContext {
    /// The newest in-memory generation
    fn current_generation(&self) -> u64;

    /// Records the primary file's stamp after a successful write
    fn record_stamp(&self, stamp: FileStamp);
}

/// Exponentially bucketed fsync durations, in milliseconds
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    buckets: [u64; SYNC_BUCKETS],
    count: u64,
}

impl SyncStats {
    pub fn add(&mut self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        let bucket = if ms == 0 {
            0
        } else {
            ((u64::BITS - ms.leading_zeros()) as usize).min(SYNC_BUCKETS - 1)
        };
        self.buckets[bucket] += 1;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Renders non-empty buckets as `[<1ms: 3, <4ms: 1]`
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .buckets
            .iter()
            .enumerate()
            .filter(|(_, n)| **n > 0)
            .map(|(i, n)| {
                if i == SYNC_BUCKETS - 1 {
                    format!(">={}ms: {}", 1u64 << (i - 1), n)
                } else {
                    format!("<{}ms: {}", 1u64 << i, n)
                }
            })
            .collect();
        format!("[{}]", parts.join(", "))
    }
}

/// Writes commit results to the primary file
pub(crate) struct FileWriter {
    file: PathBuf,
    backup: PathBuf,
    mode: u32,
    slow_fsync: Duration,
    log_interval: u64,
    durable_generation: u64,
    stats: SyncStats,
}

impl FileWriter {
    pub(crate) fn new(file: PathBuf, backup: PathBuf, config: &StoreConfig) -> Self {
        Self {
            file,
            backup,
            mode: config.mode,
            slow_fsync: Duration::from_millis(config.slow_fsync_ms),
            log_interval: u64::from(config.sync_log_interval.max(1)),
            durable_generation: 0,
            stats: SyncStats::default(),
        }
    }

    pub(crate) fn durable_generation(&self) -> u64 {
        self.durable_generation
    }

    pub(crate) fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Persists `commit` and signals its completion.
    ///
    /// `sync` is true for a blocking `commit()`, which must reach disk even
    /// if a newer generation exists in memory. An asynchronous write of an
    /// intermediate generation is skipped since a later one will follow.
    pub(crate) fn write(
        &mut self,
        commit: &CommitResult,
        sync: bool,
        ctx: &dyn WriteContext,
    ) -> WriteOutcome {
        let outcome = self.write_inner(commit, sync, ctx);
        commit.completion.signal(outcome);
        outcome
    }

    fn write_inner(
        &mut self,
        commit: &CommitResult,
        sync: bool,
        ctx: &dyn WriteContext,
    ) -> WriteOutcome {
        if self.file.exists() {
            let needs_write = self.durable_generation < commit.generation
                && (sync || ctx.current_generation() == commit.generation);

            if !needs_write {
                debug!(
                    generation = commit.generation,
                    durable = self.durable_generation,
                    "skipping unnecessary write"
                );
                return WriteOutcome::skipped();
            }

            if !self.backup.exists() {
                if let Err(e) = fs::rename(&self.file, &self.backup) {
                    warn!(
                        file = %self.file.display(),
                        backup = %self.backup.display(),
                        error = %e,
                        "couldn't rename file to backup"
                    );
                    return WriteOutcome::failed();
                }
            } else {
                // The existing backup is older and still the recovery point
                let _ = fs::remove_file(&self.file);
            }
        }

        match self.write_primary(commit) {
            Ok(stamp) => {
                ctx.record_stamp(stamp);
                if let Err(e) = fs::remove_file(&self.backup) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(backup = %self.backup.display(), error = %e, "couldn't delete backup");
                    }
                }
                self.durable_generation = commit.generation;
                WriteOutcome::written()
            }
            Err(e) => {
                warn!(file = %self.file.display(), error = %e, "write failed");
                if self.file.exists() {
                    if let Err(e) = fs::remove_file(&self.file) {
                        warn!(file = %self.file.display(), error = %e, "couldn't clean up partially-written file");
                    }
                }
                WriteOutcome::failed()
            }
        }
    }

    fn write_primary(&mut self, commit: &CommitResult) -> Result<FileStamp> {
        let file = self.create_file()?;
        let write_err = |source| StoreError::Write {
            path: self.file.clone(),
            source,
        };

        let mut writer = BufWriter::new(file);
        format::write_map(&commit.map, &mut writer)?;
        writer.flush().map_err(write_err)?;
        let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;

        let started = Instant::now();
        file.sync_all().map_err(write_err)?;
        let fsync = started.elapsed();
        drop(file);

        set_mode(&self.file, self.mode).map_err(write_err)?;
        let stamp = FileStamp::read(&self.file).map_err(write_err)?;

        self.record_sync(fsync);
        Ok(stamp)
    }

    fn create_file(&self) -> Result<File> {
        let open = || {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.file)
        };

        match open() {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let permission_err = |source| StoreError::Permission {
                    path: self.file.clone(),
                    source,
                };
                if let Some(parent) = self.file.parent() {
                    fs::create_dir_all(parent).map_err(permission_err)?;
                    set_mode(parent, DIR_MODE).map_err(permission_err)?;
                }
                open().map_err(permission_err)
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(StoreError::Permission {
                path: self.file.clone(),
                source: e,
            }),
            Err(e) => Err(StoreError::Write {
                path: self.file.clone(),
                source: e,
            }),
        }
    }

    fn record_sync(&mut self, fsync: Duration) {
        self.stats.add(fsync);
        if fsync > self.slow_fsync || self.stats.count() % self.log_interval == 0 {
            info!(
                file = %self.file.display(),
                fsync_ms = fsync.as_millis() as u64,
                "time required to fsync: {}",
                self.stats.summary()
            );
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
