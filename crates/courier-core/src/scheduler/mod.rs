//! Worker pool: a fixed number of workers pulling claimed jobs from the
//! store until told to stop.
//!
//! Admission order is FIFO modulo the per-user fairness skip; the claim
//! itself is a store-level compare-and-swap, so two workers can never pick
//! the same job.

mod control;
mod worker;

pub use control::CancelRegistry;
pub(crate) use worker::WorkerCtx;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::store::unix_millis;

/// How long an idle worker parks before re-checking for claimable jobs
/// (covers backoff deadlines coming due without a dedicated timer).
const CLAIM_TICK: Duration = Duration::from_millis(200);

/// Handle to a running pool of workers.
pub struct WorkerPool {
    workers: JoinSet<()>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl WorkerPool {
    /// Spawn `count` workers sharing `ctx`.
    pub(crate) fn spawn(ctx: Arc<WorkerCtx>, count: usize) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::clone(&ctx.wake);
        let mut workers = JoinSet::new();
        for n in 0..count.max(1) {
            let ctx = Arc::clone(&ctx);
            let stop = Arc::clone(&stop);
            workers.spawn(worker_loop(n, ctx, stop));
        }
        tracing::info!(workers = count.max(1), "worker pool started");
        Self {
            workers,
            stop,
            wake,
        }
    }

    /// Stop claiming new jobs and wait for in-flight attempts to finish.
    pub async fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.wake.notify_waiters();
        while self.workers.join_next().await.is_some() {}
        tracing::info!("worker pool stopped");
    }
}

async fn worker_loop(n: usize, ctx: Arc<WorkerCtx>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        match ctx.store.claim_next_queued(unix_millis()).await {
            Ok(Some(job)) => {
                tracing::debug!(
                    worker = n,
                    job = job.id,
                    attempt = job.attempt,
                    "claimed job"
                );
                worker::run_attempt(&ctx, job).await;
            }
            Ok(None) => {
                // Park until new work arrives or the tick expires (the tick
                // also picks up jobs whose backoff deadline has passed).
                tokio::select! {
                    _ = ctx.wake.notified() => {}
                    _ = tokio::time::sleep(CLAIM_TICK) => {}
                }
            }
            Err(e) => {
                // A store fault must never take the pool down; back off and retry.
                tracing::error!(worker = n, error = %e, "claim failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
