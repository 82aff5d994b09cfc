//! Durable job store: append-only event log + compacted snapshot.
//!
//! Every mutation appends a full record snapshot to the log and fsyncs before
//! returning, so a restart after a crash rebuilds the exact state by loading
//! the last snapshot and replaying the tail. One writer at a time; readers
//! share the same short-lived lock.

pub mod log;
pub mod types;


pub use types::{
    JobId, JobRecord, JobState, QualitySpec, TransitionFields, UnixMillis, UserProfile,
};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use url::Url;

use crate::error::{StoreError, SubmitError};
use log::{LogEvent, LogWriter, Snapshot};

/// Log entries between automatic compactions for [`JobStore::open_default`].
const DEFAULT_COMPACT_AFTER: usize = 4096;

/// Current time in Unix milliseconds (record timestamps).
pub fn unix_millis() -> UnixMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as UnixMillis
}

/// Reject anything that is not an absolute http/https URL with a host.
pub fn validate_url(raw: &str) -> Result<(), SubmitError> {
    let parsed = Url::parse(raw).map_err(|e| SubmitError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SubmitError::InvalidUrl(format!(
            "{raw}: unsupported scheme {:?}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(SubmitError::InvalidUrl(format!("{raw}: missing host")));
    }
    Ok(())
}

struct StoreInner {
    state_dir: PathBuf,
    jobs: HashMap<JobId, JobRecord>,
    profiles: HashMap<String, UserProfile>,
    next_id: JobId,
    seq: u64,
    writer: LogWriter,
    compact_after: usize,
    since_compact: usize,
}

/// Handle to the durable job store.
pub struct JobStore {
    inner: Mutex<StoreInner>,
}

impl JobStore {
    /// Open (or create) the store in `dir`: load the snapshot, replay the log
    /// tail, rebuild the in-memory index and profile table.
    ///
    /// `compact_after` bounds the log: once that many events accumulate past
    /// the last compaction, the next mutation triggers one.
    pub async fn open_at(dir: impl AsRef<Path>, compact_after: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut jobs = HashMap::new();
        let mut profiles = HashMap::new();
        let mut next_id: JobId = 1;
        let mut seq: u64 = 0;

        if let Some(snapshot) = log::read_snapshot(dir)? {
            next_id = snapshot.next_job_id;
            seq = snapshot.last_seq;
            for record in snapshot.jobs {
                jobs.insert(record.id, record);
            }
            for profile in snapshot.profiles {
                profiles.insert(profile.id.clone(), profile);
            }
        }

        let events = log::replay(dir)?;
        let replayed = events.len();
        for event in events {
            seq = seq.max(event.seq());
            match event {
                LogEvent::Job { record, .. } => {
                    next_id = next_id.max(record.id + 1);
                    jobs.insert(record.id, record);
                }
                LogEvent::Profile { profile, .. } => {
                    profiles.insert(profile.id.clone(), profile);
                }
            }
        }
        if replayed > 0 {
            tracing::debug!(events = replayed, "replayed job log tail");
        }

        let writer = LogWriter::open(dir)?;
        Ok(Self {
            inner: Mutex::new(StoreInner {
                state_dir: dir.to_path_buf(),
                jobs,
                profiles,
                next_id,
                seq,
                writer,
                compact_after: compact_after.max(1),
                since_compact: replayed,
            }),
        })
    }

    /// Open the store in the default XDG state directory.
    pub async fn open_default() -> Result<Self, StoreError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("courier")
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        Self::open_at(xdg_dirs.get_state_home(), DEFAULT_COMPACT_AFTER).await
    }

    /// Create a new Queued job for `owner_id`, registering the owner's
    /// profile on first contact. Durable before returning.
    pub async fn submit(
        &self,
        owner_id: &str,
        display_name: Option<&str>,
        source_url: &str,
        quality: QualitySpec,
    ) -> Result<JobRecord, SubmitError> {
        validate_url(source_url)?;

        let mut inner = self.inner.lock().await;
        let now = unix_millis();
        let id = inner.next_id;
        let record = JobRecord {
            id,
            owner_id: owner_id.to_string(),
            source_url: source_url.to_string(),
            quality,
            state: JobState::Queued,
            attempt: 0,
            created_at: now,
            started_at: None,
            finished_at: None,
            retry_at: None,
            result_size_bytes: None,
            failure_reason: None,
        };

        inner.append_job(&record)?;
        inner.next_id = id + 1;
        inner.jobs.insert(id, record.clone());

        let profile = match inner.profiles.get(owner_id) {
            Some(existing) => {
                // Keep the profile's display name current without touching counters.
                let name = display_name.map(str::to_string);
                if name.is_some() && name != existing.display_name {
                    let mut updated = existing.clone();
                    updated.display_name = name;
                    Some(updated)
                } else {
                    None
                }
            }
            None => Some(UserProfile {
                id: owner_id.to_string(),
                display_name: display_name.map(str::to_string),
                joined_at: now,
                downloads_completed: 0,
                bytes_delivered: 0,
                last_download_at: None,
            }),
        };
        if let Some(profile) = profile {
            inner.append_profile(&profile)?;
            inner.profiles.insert(owner_id.to_string(), profile);
        }

        inner.maybe_compact()?;
        Ok(record)
    }

    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.inner.lock().await.jobs.get(&id).cloned()
    }

    /// All jobs owned by `owner_id`, newest first.
    pub async fn list_by_owner(&self, owner_id: &str) -> Vec<JobRecord> {
        let inner = self.inner.lock().await;
        let mut out: Vec<JobRecord> = inner
            .jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    /// Compare-and-swap state transition.
    ///
    /// Succeeds only if the record is currently in `from`; otherwise returns
    /// `Ok(false)` without side effects, so racing callers resolve to exactly
    /// one winner. On a transition into Succeeded the owner's profile is
    /// updated in the same critical section.
    pub async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        fields: TransitionFields,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(current) = inner.jobs.get(&id) else {
            return Err(StoreError::NotFound(id));
        };
        if current.state != from || from.is_terminal() {
            return Ok(false);
        }

        let mut updated = current.clone();
        updated.state = to;
        updated.retry_at = if to == JobState::Queued {
            fields.retry_at
        } else {
            None
        };
        if to.is_terminal() {
            updated.finished_at = Some(fields.finished_at.unwrap_or_else(unix_millis));
        }
        if to == JobState::Succeeded {
            updated.result_size_bytes = fields.result_size_bytes;
        }
        if to == JobState::Failed {
            updated.failure_reason = fields.failure_reason;
        }

        inner.append_job(&updated)?;
        if to == JobState::Succeeded {
            if let Some(profile) = inner.profiles.get(&updated.owner_id) {
                let mut profile = profile.clone();
                profile.downloads_completed += 1;
                profile.bytes_delivered += updated.result_size_bytes.unwrap_or(0);
                profile.last_download_at = updated.finished_at;
                inner.append_profile(&profile)?;
                inner.profiles.insert(profile.id.clone(), profile);
            }
        }
        inner.jobs.insert(id, updated);
        inner.maybe_compact()?;
        Ok(true)
    }

    /// Atomically claim the next eligible Queued job and move it to Running
    /// with `attempt + 1`.
    ///
    /// Eligible means: FIFO by (`created_at`, id), any backoff deadline
    /// (`retry_at`) has passed, and the owner has no Running job (per-user
    /// fairness skip). Returns `None` when nothing can be started right now.
    pub async fn claim_next_queued(&self, now: UnixMillis) -> Result<Option<JobRecord>, StoreError> {
        let mut inner = self.inner.lock().await;
        let running_owners: HashSet<String> = inner
            .jobs
            .values()
            .filter(|j| j.state == JobState::Running)
            .map(|j| j.owner_id.clone())
            .collect();

        let candidate = inner
            .jobs
            .values()
            .filter(|j| j.state == JobState::Queued)
            .filter(|j| j.retry_at.map_or(true, |t| t <= now))
            .filter(|j| !running_owners.contains(&j.owner_id))
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        let Some(id) = candidate else {
            return Ok(None);
        };

        // The lock is held throughout, so the record cannot have changed.
        let mut updated = inner.jobs[&id].clone();
        updated.state = JobState::Running;
        updated.attempt += 1;
        updated.retry_at = None;
        if updated.started_at.is_none() {
            updated.started_at = Some(now);
        }
        inner.append_job(&updated)?;
        inner.jobs.insert(id, updated.clone());
        inner.maybe_compact()?;
        Ok(Some(updated))
    }

    /// Requeue every job stranded in Running (crash recovery). The
    /// interrupted attempt produced no outcome, so its increment is rolled
    /// back before the job is re-claimed. Returns the number requeued.
    pub async fn recover_running(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        let stranded: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|j| j.state == JobState::Running)
            .map(|j| j.id)
            .collect();
        for id in &stranded {
            let mut updated = inner.jobs[id].clone();
            updated.state = JobState::Queued;
            updated.attempt = updated.attempt.saturating_sub(1);
            updated.retry_at = None;
            inner.append_job(&updated)?;
            inner.jobs.insert(*id, updated);
        }
        if !stranded.is_empty() {
            inner.maybe_compact()?;
        }
        Ok(stranded.len())
    }

    /// Force a compaction: durable snapshot, then truncate the log.
    pub async fn compact(&self) -> Result<(), StoreError> {
        self.inner.lock().await.compact()
    }

    pub async fn profile(&self, owner_id: &str) -> Option<UserProfile> {
        self.inner.lock().await.profiles.get(owner_id).cloned()
    }

    pub async fn profiles(&self) -> Vec<UserProfile> {
        self.inner.lock().await.profiles.values().cloned().collect()
    }

    /// Jobs that are not yet terminal (Queued or Running).
    pub async fn non_terminal_jobs(&self) -> Vec<JobRecord> {
        let inner = self.inner.lock().await;
        let mut out: Vec<JobRecord> = inner
            .jobs
            .values()
            .filter(|j| !j.state.is_terminal())
            .cloned()
            .collect();
        out.sort_by_key(|j| (j.created_at, j.id));
        out
    }

    /// True while any job is Queued or Running.
    pub async fn has_live_jobs(&self) -> bool {
        self.inner
            .lock()
            .await
            .jobs
            .values()
            .any(|j| !j.state.is_terminal())
    }
}

impl StoreInner {
    fn append_job(&mut self, record: &JobRecord) -> Result<(), StoreError> {
        self.seq += 1;
        let event = LogEvent::Job {
            seq: self.seq,
            record: record.clone(),
        };
        self.writer.append(&event)?;
        self.since_compact += 1;
        Ok(())
    }

    fn append_profile(&mut self, profile: &UserProfile) -> Result<(), StoreError> {
        self.seq += 1;
        let event = LogEvent::Profile {
            seq: self.seq,
            profile: profile.clone(),
        };
        self.writer.append(&event)?;
        self.since_compact += 1;
        Ok(())
    }

    fn maybe_compact(&mut self) -> Result<(), StoreError> {
        if self.since_compact >= self.compact_after {
            self.compact()?;
        }
        Ok(())
    }

    fn compact(&mut self) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            next_job_id: self.next_id,
            last_seq: self.seq,
            jobs: self.jobs.values().cloned().collect(),
            profiles: self.profiles.values().cloned().collect(),
        };
        log::write_snapshot(&self.state_dir, &snapshot)?;
        self.writer.truncate()?;
        self.since_compact = 0;
        tracing::debug!(
            jobs = snapshot.jobs.len(),
            profiles = snapshot.profiles.len(),
            "compacted job log"
        );
        Ok(())
    }
}
