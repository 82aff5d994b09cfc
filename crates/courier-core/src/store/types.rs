//! Types stored in the job log and profile table.

use serde::{Deserialize, Serialize};

use crate::error::FailureReason;

/// Job identifier: assigned by the store at submission, monotonic, never reused.
pub type JobId = u64;

/// Milliseconds since the Unix epoch.
pub type UnixMillis = i64;

/// Requested output quality, a closed set mirroring the extractor's menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualitySpec {
    #[default]
    Best,
    Hd,
    Sd480,
    Sd360,
    AudioOnly,
}

impl QualitySpec {
    pub fn as_str(self) -> &'static str {
        match self {
            QualitySpec::Best => "best",
            QualitySpec::Hd => "hd",
            QualitySpec::Sd480 => "sd480",
            QualitySpec::Sd360 => "sd360",
            QualitySpec::AudioOnly => "audio",
        }
    }
}

impl std::fmt::Display for QualitySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QualitySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" => Ok(QualitySpec::Best),
            "hd" | "720p" => Ok(QualitySpec::Hd),
            "sd480" | "480p" => Ok(QualitySpec::Sd480),
            "sd360" | "360p" => Ok(QualitySpec::Sd360),
            "audio" | "audio_only" => Ok(QualitySpec::AudioOnly),
            other => Err(format!(
                "unknown quality {other:?} (expected best, hd, sd480, sd360, audio)"
            )),
        }
    }
}

/// Job lifecycle state. Succeeded, Failed, and Cancelled are terminal sinks;
/// a terminal record is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One download-and-delivery request and its full lifecycle.
///
/// Every state transition appends a complete snapshot of this record to the
/// job log, so replay alone reconstructs the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub owner_id: String,
    pub source_url: String,
    pub quality: QualitySpec,
    pub state: JobState,
    /// Execution attempts so far. Starts at 0; incremented when a worker
    /// claims the job. Never exceeds the configured attempt budget.
    pub attempt: u32,
    pub created_at: UnixMillis,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<UnixMillis>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finished_at: Option<UnixMillis>,
    /// Earliest claim time for a requeued job waiting out its backoff delay.
    /// Persisted so the delay survives a restart. Cleared on claim.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_at: Option<UnixMillis>,
    /// Set only on Succeeded.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result_size_bytes: Option<u64>,
    /// Set only on Failed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_reason: Option<FailureReason>,
}

/// Per-user counters, owned by the store and updated only as a side effect of
/// a job reaching Succeeded (plus registration at first submission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_name: Option<String>,
    pub joined_at: UnixMillis,
    pub downloads_completed: u64,
    pub bytes_delivered: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_download_at: Option<UnixMillis>,
}

/// Fields applied together with a state transition.
///
/// `retry_at` is only honored on a transition back to Queued; transitions to
/// Running or a terminal state always clear it.
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    pub finished_at: Option<UnixMillis>,
    pub retry_at: Option<UnixMillis>,
    pub result_size_bytes: Option<u64>,
    pub failure_reason: Option<FailureReason>,
}
