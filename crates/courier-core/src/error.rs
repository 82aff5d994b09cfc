//! Error taxonomy for submission, admission, extraction, delivery, and storage.
//!
//! Typed enums so callers and the retry policy can classify failures before
//! anything is flattened into anyhow at the presentation layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::types::JobId;

/// Admission-time refusal. The job is never created; the caller may resubmit later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmitError {
    /// Too many active jobs across all users.
    #[error("global capacity reached ({active} active, limit {limit})")]
    GlobalCapacity { active: usize, limit: usize },
    /// The user already has their maximum number of active jobs.
    #[error("per-user capacity reached ({active} active, limit {limit})")]
    PerUserCapacity { active: usize, limit: usize },
    /// Too many admitted submissions inside the rolling window.
    #[error("submission frequency cap reached ({limit} per {window_secs}s)")]
    Frequency { limit: usize, window_secs: u64 },
}

/// Submission failure: bad input, admission refusal, or a store fault.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Malformed or non-absolute URL; rejected before anything is persisted.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Rejected(#[from] AdmitError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// JobStore / filesystem failure. Fatal to the affected job, never to the pool.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("job {0} not found")]
    NotFound(JobId),
}

/// Error from the external Extractor capability.
///
/// The core never retries inside the extractor; transient errors feed the
/// job-level retry policy, permanent ones terminate the job.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Network trouble, timeouts, site-side hiccups. Retryable.
    #[error("extraction failed (transient): {0}")]
    Transient(String),
    /// Unsupported URL, content removed. Never retried.
    #[error("extraction failed (permanent): {0}")]
    Permanent(String),
}

/// Error from the external DeliveryGateway capability.
#[derive(Debug, Error)]
pub enum DeliverError {
    /// Artifact exceeds the platform size limit. Never retried; surfaced so a
    /// presentation layer can suggest a lower quality.
    #[error("artifact too large: {size_bytes} bytes (limit {limit_bytes})")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },
    #[error("delivery failed (transient): {0}")]
    Transient(String),
    #[error("delivery failed (permanent): {0}")]
    Permanent(String),
}

/// Cancellation refusal.
#[derive(Debug, Error)]
pub enum CancelError {
    #[error("job {0} not found")]
    NotFound(JobId),
    /// The job already reached a terminal state; nothing to cancel.
    #[error("job {0} already finished")]
    AlreadyTerminal(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal failure reason recorded on a Failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Transient extraction failures exhausted the attempt budget.
    ExtractionTransient { detail: String },
    ExtractionPermanent { detail: String },
    DeliveryTooLarge { size_bytes: u64, limit_bytes: u64 },
    /// Transient delivery failures exhausted the attempt budget.
    DeliveryTransient { detail: String },
    DeliveryPermanent { detail: String },
    /// Store or spool filesystem fault while executing the job.
    InternalStorage { detail: String },
}

impl FailureReason {
    pub fn summary(&self) -> String {
        match self {
            FailureReason::ExtractionTransient { detail } => {
                format!("extraction failed after retries: {detail}")
            }
            FailureReason::ExtractionPermanent { detail } => {
                format!("extraction failed: {detail}")
            }
            FailureReason::DeliveryTooLarge {
                size_bytes,
                limit_bytes,
            } => format!("artifact too large: {size_bytes} bytes (limit {limit_bytes})"),
            FailureReason::DeliveryTransient { detail } => {
                format!("delivery failed after retries: {detail}")
            }
            FailureReason::DeliveryPermanent { detail } => format!("delivery failed: {detail}"),
            FailureReason::InternalStorage { detail } => format!("internal storage error: {detail}"),
        }
    }
}
