// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log shared by several processes
//!
//! The log is the source of truth; every process keeps a materialized copy
//! and catches up on entries other processes appended before it reads or
//! writes. An advisory lock file serializes writers:
//!
//! - reads hold the shared lock while catching up
//! - writes hold the exclusive lock across catch-up, condition check and
//!   append, which makes each write a compare-and-set against the latest
//!   committed state
//!
//! Every append is followed by `fsync()`. Checksums detect bit flips and a
//! line without its trailing newline is a torn write from a crashed writer;
//! replay stops at either. Only a holder of the exclusive lock truncates a
//! torn tail.
//!
//! A writer folds the log into a [`Snapshot`] after a purge or once the log
//! holds `compaction_threshold` entries, and starts a new generation. Other
//! handles notice the new snapshot on their next catch-up and reload from it.

use crate::error::StoreError;
use crate::operation::Operation;
use crate::snapshot::{self, Snapshot};
use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "wal.lock";

/// Log entries after which a writer compacts
pub const DEFAULT_COMPACTION_THRESHOLD: u64 = 10_000;

/// A single entry in the write-ahead log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number
    pub sequence: u64,
    /// Microseconds since Unix epoch
    pub timestamp_micros: u64,
    /// Writer that appended the entry
    pub machine_id: String,
    pub operation: Operation,
    /// CRC32 checksum of the serialized operation
    pub checksum: u32,
}

impl WalEntry {
    pub fn new(sequence: u64, machine_id: &str, operation: Operation, at: DateTime<Utc>) -> Self {
        let checksum = Self::calculate_checksum(&operation);
        Self {
            sequence,
            timestamp_micros: u64::try_from(at.timestamp_micros()).unwrap_or(0),
            machine_id: machine_id.to_string(),
            operation,
            checksum,
        }
    }

    fn calculate_checksum(operation: &Operation) -> u32 {
        let json = serde_json::to_string(operation).unwrap_or_default();
        crc32fast::hash(json.as_bytes())
    }

    pub fn verify(&self) -> bool {
        self.checksum == Self::calculate_checksum(&self.operation)
    }
}

/// Holds an advisory lock on the lock file until dropped
struct LockGuard {
    file: File,
}

impl LockGuard {
    fn shared(lock: &File) -> Result<Self, StoreError> {
        let file = lock.try_clone()?;
        file.lock_shared()?;
        Ok(Self { file })
    }

    fn exclusive(lock: &File) -> Result<Self, StoreError> {
        let file = lock.try_clone()?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "failed to release WAL lock");
        }
    }
}

fn open_log(path: &Path) -> Result<File, StoreError> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)?)
}

/// One process's handle on a shared log
pub struct Wal {
    dir: PathBuf,
    generation: u64,
    path: PathBuf,
    file: File,
    lock: File,
    machine_id: String,
    /// Bytes of the log already applied to this handle's state
    offset: u64,
    next_sequence: u64,
    /// Entries in the current generation's log
    logged: u64,
    compaction_threshold: u64,
    /// Whether the state was seeded from the current generation
    loaded: bool,
}

impl Wal {
    /// Open or create the log in `dir`
    pub fn open(dir: &Path, machine_id: &str) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))?;

        let _guard = LockGuard::shared(&lock)?;
        let generation = snapshot::latest_generation(dir)?.unwrap_or(0);
        let path = snapshot::log_path(dir, generation);
        let file = open_log(&path)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            generation,
            path,
            file,
            lock,
            machine_id: machine_id.to_string(),
            offset: 0,
            next_sequence: 0,
            logged: 0,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            loaded: false,
        })
    }

    /// Compact once the log holds `threshold` entries; 0 compacts only
    /// after purges
    pub fn with_compaction_threshold(mut self, threshold: u64) -> Self {
        self.compaction_threshold = threshold;
        self
    }

    /// Log file of the current generation
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sequence number the next append will use
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Bring `state` up to date under the shared lock
    pub fn refresh(&mut self, state: &mut MaterializedState) -> Result<usize, StoreError> {
        let _guard = LockGuard::shared(&self.lock)?;
        self.catch_up(state, false)
    }

    /// Catch up under the exclusive lock, let `decide` inspect the latest
    /// state and append the operations it returns, stamped with `now`.
    ///
    /// The operations are applied to `state` only after they are durable.
    pub fn transact<T, E>(
        &mut self,
        state: &mut MaterializedState,
        now: DateTime<Utc>,
        decide: impl FnOnce(&MaterializedState) -> Result<(Vec<Operation>, T), E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = LockGuard::exclusive(&self.lock)?;
        self.catch_up(state, true)?;
        let (ops, out) = decide(state)?;
        if ops.is_empty() {
            return Ok(out);
        }

        self.append(&ops, now)?;
        for op in &ops {
            state.apply(op);
        }

        let purged = ops
            .iter()
            .any(|op| matches!(op, Operation::ConsumersPurged { .. }));
        let full = self.compaction_threshold > 0 && self.logged >= self.compaction_threshold;
        if purged || full {
            // The operations are committed; a failed compaction is retried
            // by a later write
            if let Err(e) = self.compact_locked(state, now) {
                tracing::warn!(error = %e, generation = self.generation, "WAL compaction failed");
            }
        }
        Ok(out)
    }

    /// Fold everything committed so far into a snapshot and start a new
    /// generation
    pub fn compact(
        &mut self,
        state: &mut MaterializedState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let _guard = LockGuard::exclusive(&self.lock)?;
        self.catch_up(state, true)?;
        self.compact_locked(state, now)
    }

    /// Caller holds the exclusive lock and has caught up
    fn compact_locked(
        &mut self,
        state: &MaterializedState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let generation = self.generation + 1;
        Snapshot::new(generation, self.next_sequence, now, state.clone()).save(&self.dir)?;

        // A leftover log of the new generation never held committed entries
        let path = snapshot::log_path(&self.dir, generation);
        File::create(&path)?.sync_all()?;
        let file = open_log(&path)?;

        let compacted = self.logged;
        self.generation = generation;
        self.path = path;
        self.file = file;
        self.offset = 0;
        self.logged = 0;

        match snapshot::remove_stale(&self.dir, generation) {
            Ok(removed) => tracing::info!(
                generation,
                compacted,
                removed,
                next_sequence = self.next_sequence,
                "WAL compacted into snapshot"
            ),
            Err(e) => tracing::warn!(generation, error = %e, "failed to remove stale WAL files"),
        }
        Ok(())
    }

    /// Replace `state` with the newest snapshot and reopen its log
    fn reload(&mut self, state: &mut MaterializedState) -> Result<(), StoreError> {
        let generation = match snapshot::latest_generation(&self.dir)? {
            Some(generation) => {
                let snapshot = Snapshot::load(&snapshot::snapshot_path(&self.dir, generation))?;
                *state = snapshot.state;
                self.next_sequence = snapshot.next_sequence;
                tracing::debug!(
                    generation,
                    next_sequence = self.next_sequence,
                    "loaded WAL snapshot"
                );
                generation
            }
            None => {
                *state = MaterializedState::new();
                self.next_sequence = 0;
                0
            }
        };

        self.generation = generation;
        self.path = snapshot::log_path(&self.dir, generation);
        self.file = open_log(&self.path)?;
        self.offset = 0;
        self.logged = 0;
        self.loaded = true;
        Ok(())
    }

    /// Apply entries past this handle's offset; returns how many applied.
    ///
    /// Caller holds the lock. `repair` truncates an invalid tail.
    fn catch_up(&mut self, state: &mut MaterializedState, repair: bool) -> Result<usize, StoreError> {
        let superseded = snapshot::snapshot_path(&self.dir, self.generation + 1).exists();
        if !self.loaded || superseded || !self.path.exists() {
            self.reload(state)?;
        }

        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(self.offset))?;

        let mut applied = 0;
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }

            let entry = if line.ends_with('\n') {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    self.offset += bytes_read as u64;
                    continue;
                }
                serde_json::from_str::<WalEntry>(trimmed)
                    .ok()
                    .filter(WalEntry::verify)
            } else {
                None
            };

            let Some(entry) = entry else {
                self.invalid_tail(repair)?;
                break;
            };

            state.apply(&entry.operation);
            self.next_sequence = self.next_sequence.max(entry.sequence + 1);
            self.offset += bytes_read as u64;
            self.logged += 1;
            applied += 1;
        }

        if applied > 0 {
            tracing::trace!(applied, offset = self.offset, "caught up on WAL");
        }
        Ok(applied)
    }

    fn invalid_tail(&mut self, repair: bool) -> Result<(), StoreError> {
        if !repair {
            tracing::warn!(
                path = %self.path.display(),
                offset = self.offset,
                "stopping WAL replay at invalid entry"
            );
            return Ok(());
        }

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(self.offset)?;
        file.sync_all()?;
        tracing::warn!(
            path = %self.path.display(),
            offset = self.offset,
            "WAL truncated at corruption point"
        );
        Ok(())
    }

    /// Append operations and fsync; caller holds the exclusive lock and has
    /// caught up
    fn append(&mut self, ops: &[Operation], now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        for op in ops {
            let entry = WalEntry::new(self.next_sequence, &self.machine_id, op.clone(), now);
            serde_json::to_writer(&mut buf, &entry)?;
            buf.push(b'\n');
            tracing::trace!(sequence = self.next_sequence, op = op.name(), "appending to WAL");
            self.next_sequence += 1;
        }

        self.file.write_all(&buf)?;
        self.file.sync_all()?;
        self.offset += buf.len() as u64;
        self.logged += ops.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
