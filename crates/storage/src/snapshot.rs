// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshots for journal compaction
//!
//! The journal is split into generations. Generation `g` consists of
//! `snapshot-<g>.json`, the state every earlier entry produced, followed by
//! the entries in `wal-<g>.jsonl`. Generation 0 starts from the empty state
//! and has no snapshot. Writing the snapshot of `g + 1` is what starts the
//! next generation; the files of earlier generations are garbage from then
//! on.

use crate::error::StoreError;
use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_PREFIX: &str = "snapshot-";
const SNAPSHOT_SUFFIX: &str = ".json";
const LOG_PREFIX: &str = "wal-";
const LOG_SUFFIX: &str = ".jsonl";

/// Full state at the start of a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub generation: u64,
    /// Sequence number of the first entry of the generation's log
    pub next_sequence: u64,
    pub created_at: DateTime<Utc>,
    pub state: MaterializedState,
}

impl Snapshot {
    /// Current version of the snapshot format
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(
        generation: u64,
        next_sequence: u64,
        created_at: DateTime<Utc>,
        state: MaterializedState,
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            generation,
            next_sequence,
            created_at,
            state,
        }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        if snapshot.version != Self::CURRENT_VERSION {
            return Err(StoreError::UnsupportedSnapshot {
                path: path.to_path_buf(),
                version: snapshot.version,
            });
        }
        Ok(snapshot)
    }

    /// Write into `dir` through a temporary file, so readers only ever see a
    /// complete snapshot
    pub fn save(&self, dir: &Path) -> Result<PathBuf, StoreError> {
        let path = snapshot_path(dir, self.generation);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

pub fn snapshot_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{SNAPSHOT_PREFIX}{generation}{SNAPSHOT_SUFFIX}"))
}

pub fn log_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{LOG_PREFIX}{generation}{LOG_SUFFIX}"))
}

fn parse_generation(name: &str, prefix: &str, suffix: &str) -> Option<u64> {
    name.strip_prefix(prefix)?.strip_suffix(suffix)?.parse().ok()
}

/// Highest generation with a snapshot in `dir`
pub fn latest_generation(dir: &Path) -> Result<Option<u64>, StoreError> {
    let mut latest = None;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let generation = name
            .to_str()
            .and_then(|n| parse_generation(n, SNAPSHOT_PREFIX, SNAPSHOT_SUFFIX));
        latest = latest.max(generation);
    }
    Ok(latest)
}

/// Delete logs and snapshots of generations before `current`; returns how
/// many files went
pub fn remove_stale(dir: &Path, current: u64) -> Result<usize, StoreError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let generation = parse_generation(name, SNAPSHOT_PREFIX, SNAPSHOT_SUFFIX)
            .or_else(|| parse_generation(name, LOG_PREFIX, LOG_SUFFIX));
        if generation.is_some_and(|g| g < current) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
