//! One job attempt: cancel check, extract with timeout, cancel check,
//! deliver with timeout, then finalize (terminal transition or requeue with
//! backoff).
//!
//! The finalize order is persist -> remove temp artifacts -> release permit,
//! each step idempotent, so a crash mid-sequence re-runs safely from the
//! durable state after recovery.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

use crate::adapters::{DeliveryGateway, Extractor};
use crate::error::{DeliverError, ExtractError, FailureReason};
use crate::limiter::PermitTable;
use crate::retry::{FailureKind, RetryDecision, RetryPolicy};
use crate::spool;
use crate::store::{unix_millis, JobRecord, JobState, JobStore, TransitionFields};

use super::control::CancelRegistry;

/// Everything a worker needs, shared across the pool.
pub(crate) struct WorkerCtx {
    pub(crate) store: Arc<JobStore>,
    pub(crate) permits: Arc<PermitTable>,
    pub(crate) cancels: Arc<CancelRegistry>,
    pub(crate) extractor: Arc<dyn Extractor>,
    pub(crate) gateway: Arc<dyn DeliveryGateway>,
    pub(crate) policy: RetryPolicy,
    pub(crate) extract_timeout: Duration,
    pub(crate) deliver_timeout: Duration,
    pub(crate) spool_root: PathBuf,
    pub(crate) wake: Arc<Notify>,
}

enum Outcome {
    Success { size_bytes: u64 },
    /// Retryable failure, subject to the attempt budget.
    Transient(FailureReason),
    /// Straight to Failed, no retry.
    Fatal(FailureReason),
    Cancelled,
}

/// Execute one attempt for a job already claimed into Running.
pub(crate) async fn run_attempt(ctx: &WorkerCtx, job: JobRecord) {
    let outcome = execute(ctx, &job).await;
    finalize(ctx, &job, outcome).await;
}

async fn execute(ctx: &WorkerCtx, job: &JobRecord) -> Outcome {
    if ctx.cancels.is_cancelled(job.id) {
        return Outcome::Cancelled;
    }

    let dest_dir = match spool::prepare(&ctx.spool_root, job.id).await {
        Ok(dir) => dir,
        Err(e) => {
            return Outcome::Fatal(FailureReason::InternalStorage {
                detail: format!("spool dir: {e}"),
            })
        }
    };

    let artifact = match timeout(
        ctx.extract_timeout,
        ctx.extractor.resolve(&job.source_url, job.quality, &dest_dir),
    )
    .await
    {
        Err(_) => {
            return Outcome::Transient(FailureReason::ExtractionTransient {
                detail: format!("timed out after {}s", ctx.extract_timeout.as_secs()),
            })
        }
        Ok(Err(ExtractError::Transient(detail))) => {
            return Outcome::Transient(FailureReason::ExtractionTransient { detail })
        }
        Ok(Err(ExtractError::Permanent(detail))) => {
            return Outcome::Fatal(FailureReason::ExtractionPermanent { detail })
        }
        Ok(Ok(artifact)) => artifact,
    };

    // A cancel that landed while extracting is observed here, before any
    // delivery side effect.
    if ctx.cancels.is_cancelled(job.id) {
        return Outcome::Cancelled;
    }

    match timeout(
        ctx.deliver_timeout,
        ctx.gateway.deliver(&job.owner_id, &artifact),
    )
    .await
    {
        Err(_) => Outcome::Transient(FailureReason::DeliveryTransient {
            detail: format!("timed out after {}s", ctx.deliver_timeout.as_secs()),
        }),
        Ok(Err(DeliverError::TooLarge {
            size_bytes,
            limit_bytes,
        })) => Outcome::Fatal(FailureReason::DeliveryTooLarge {
            size_bytes,
            limit_bytes,
        }),
        Ok(Err(DeliverError::Transient(detail))) => {
            Outcome::Transient(FailureReason::DeliveryTransient { detail })
        }
        Ok(Err(DeliverError::Permanent(detail))) => {
            Outcome::Fatal(FailureReason::DeliveryPermanent { detail })
        }
        Ok(Ok(())) => Outcome::Success {
            size_bytes: artifact.size_bytes,
        },
    }
}

async fn finalize(ctx: &WorkerCtx, job: &JobRecord, outcome: Outcome) {
    match outcome {
        Outcome::Success { size_bytes } => {
            let fields = TransitionFields {
                result_size_bytes: Some(size_bytes),
                ..Default::default()
            };
            settle(ctx, job, JobState::Succeeded, fields).await;
            tracing::info!(
                job = job.id,
                owner = %job.owner_id,
                bytes = size_bytes,
                attempt = job.attempt,
                "delivered"
            );
        }
        Outcome::Cancelled => {
            settle(ctx, job, JobState::Cancelled, Default::default()).await;
            tracing::info!(job = job.id, "cancelled");
        }
        Outcome::Fatal(reason) => {
            fail(ctx, job, reason).await;
        }
        Outcome::Transient(reason) => {
            match ctx.policy.decide(job.attempt, FailureKind::Transient) {
                RetryDecision::RetryAfter(delay) => requeue(ctx, job, reason, delay).await,
                RetryDecision::NoRetry => fail(ctx, job, reason).await,
            }
        }
    }
}

/// Requeue with a backoff deadline; the permit and cancel flag stay live.
async fn requeue(ctx: &WorkerCtx, job: &JobRecord, reason: FailureReason, delay: Duration) {
    tracing::debug!(
        job = job.id,
        attempt = job.attempt,
        delay_ms = delay.as_millis() as u64,
        reason = %reason.summary(),
        "requeueing after transient failure"
    );
    let fields = TransitionFields {
        retry_at: Some(unix_millis() + delay.as_millis() as i64),
        ..Default::default()
    };
    match ctx
        .store
        .transition(job.id, JobState::Running, JobState::Queued, fields)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(job = job.id, "requeue lost a transition race");
        }
        Err(e) => {
            tracing::error!(job = job.id, error = %e, "store failure while requeueing");
            // The job can't be made durable as Queued; terminate it rather
            // than strand it in Running.
            fail(
                ctx,
                job,
                FailureReason::InternalStorage {
                    detail: e.to_string(),
                },
            )
            .await;
            return;
        }
    }
    if let Err(e) = spool::cleanup(&ctx.spool_root, job.id).await {
        tracing::warn!(job = job.id, error = %e, "spool cleanup failed");
    }
}

async fn fail(ctx: &WorkerCtx, job: &JobRecord, reason: FailureReason) {
    tracing::warn!(job = job.id, attempt = job.attempt, reason = %reason.summary(), "job failed");
    let fields = TransitionFields {
        failure_reason: Some(reason),
        ..Default::default()
    };
    settle(ctx, job, JobState::Failed, fields).await;
}

/// Terminal sequence: persist the final record (profile update included for
/// Succeeded), remove temp artifacts, release the permit, drop the cancel
/// flag. Each step is idempotent.
async fn settle(ctx: &WorkerCtx, job: &JobRecord, to: JobState, fields: TransitionFields) {
    match ctx
        .store
        .transition(job.id, JobState::Running, to, fields)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(job = job.id, to = to.as_str(), "finalize lost a transition race");
        }
        Err(e) => {
            tracing::error!(job = job.id, error = %e, "store failure while finalizing");
        }
    }
    if let Err(e) = spool::cleanup(&ctx.spool_root, job.id).await {
        tracing::warn!(job = job.id, error = %e, "spool cleanup failed");
    }
    ctx.permits.release(job.id);
    ctx.cancels.unregister(job.id);
    ctx.wake.notify_waiters();
}
