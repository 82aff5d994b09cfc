//! Append-only event log and compacted snapshot.
//!
//! The log is JSON lines, one event per state transition (full record
//! snapshot). The snapshot file is the compaction point: written atomically
//! (tmp + rename), after which the log is truncated. Recovery loads the
//! snapshot and replays the log tail.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::types::{JobId, JobRecord, UserProfile};

pub(crate) const LOG_FILE: &str = "jobs.log";
pub(crate) const SNAPSHOT_FILE: &str = "snapshot.json";

/// One durable event. Profiles are logged as full snapshots too, so replay
/// needs no rescan of job history to rebuild the profile table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum LogEvent {
    Job { seq: u64, record: JobRecord },
    Profile { seq: u64, profile: UserProfile },
}

impl LogEvent {
    pub(crate) fn seq(&self) -> u64 {
        match self {
            LogEvent::Job { seq, .. } | LogEvent::Profile { seq, .. } => *seq,
        }
    }
}

/// Full store state at a compaction point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub next_job_id: JobId,
    pub last_seq: u64,
    pub jobs: Vec<JobRecord>,
    pub profiles: Vec<UserProfile>,
}

/// Serialized writer over the append log. All writes go through the store's
/// single mutex, so this needs no locking of its own.
pub(crate) struct LogWriter {
    path: PathBuf,
    file: File,
}

impl LogWriter {
    pub(crate) fn open(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Append one event and make it durable before returning.
    pub(crate) fn append(&mut self, event: &LogEvent) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Drop all logged events (called right after a snapshot is durable).
    pub(crate) fn truncate(&mut self) -> Result<(), StoreError> {
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.file.sync_data()?;
        // Reopen in append mode for subsequent writes.
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }
}

/// Read the snapshot, if any.
pub(crate) fn read_snapshot(dir: &Path) -> Result<Option<Snapshot>, StoreError> {
    let path = dir.join(SNAPSHOT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&data)?))
}

/// Write the snapshot atomically: tmp file, fsync, rename over the old one.
pub(crate) fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    let path = dir.join(SNAPSHOT_FILE);
    let mut file = File::create(&tmp)?;
    file.write_all(&serde_json::to_vec_pretty(snapshot)?)?;
    file.sync_all()?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Replay all events in the log, oldest first.
///
/// A torn final line (crash mid-append) is dropped with a warning; everything
/// before it was synced and is intact.
pub(crate) fn replay(dir: &Path) -> Result<Vec<LogEvent>, StoreError> {
    let path = dir.join(LOG_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(&path)?);
    let mut events = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(
                    line = lineno + 1,
                    error = %e,
                    "dropping torn tail of job log"
                );
                break;
            }
        }
    }
    Ok(events)
}
