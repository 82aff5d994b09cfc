//! The `Courier` facade: owns the store, limiter, cancel registry, permit
//! table, and adapters, and exposes the submission surface a front end
//! (CLI, bot, HTTP layer) drives.
//!
//! Opening the service recovers from a previous run: stranded Running jobs
//! are requeued and every non-terminal job gets its admission permit and
//! cancel flag rebuilt, so restart capacity accounting matches the durable
//! queue exactly.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::adapters::{DeliveryGateway, Extractor};
use crate::config::CourierConfig;
use crate::error::{CancelError, SubmitError};
use crate::limiter::{PermitTable, RateLimiter};
use crate::scheduler::{CancelRegistry, WorkerCtx, WorkerPool};
use crate::stats::{GlobalStats, StatsAggregator};
use crate::store::{self, JobId, JobRecord, JobState, JobStore, QualitySpec, UserProfile};

pub struct Courier {
    cfg: CourierConfig,
    store: Arc<JobStore>,
    limiter: Arc<RateLimiter>,
    permits: Arc<PermitTable>,
    cancels: Arc<CancelRegistry>,
    stats: StatsAggregator,
    wake: Arc<Notify>,
    ctx: Arc<WorkerCtx>,
}

impl Courier {
    /// Open the durable state under the configured directories, run crash
    /// recovery, and wire the adapters in. Workers are not started until
    /// [`Courier::spawn_workers`].
    pub async fn open(
        cfg: CourierConfig,
        extractor: Arc<dyn Extractor>,
        gateway: Arc<dyn DeliveryGateway>,
    ) -> anyhow::Result<Self> {
        let state_dir = cfg.state_dir()?;
        let spool_root: PathBuf = cfg.spool_dir()?;

        let store = Arc::new(JobStore::open_at(&state_dir, cfg.compact_log_entries()).await?);
        let requeued = store.recover_running().await?;
        if requeued > 0 {
            tracing::info!(jobs = requeued, "requeued jobs stranded by a previous run");
        }

        let limiter = Arc::new(RateLimiter::new(
            cfg.max_active_jobs,
            cfg.max_active_per_user,
            cfg.max_submissions_per_window,
            cfg.submission_window(),
        ));
        let permits = Arc::new(PermitTable::default());
        let cancels = Arc::new(CancelRegistry::new());

        // Everything still in the durable queue was admitted before the
        // restart; rebuild its permit and cancel flag.
        for job in store.non_terminal_jobs().await {
            permits.insert(job.id, limiter.readmit(&job.owner_id));
            cancels.register(job.id);
        }

        let wake = Arc::new(Notify::new());
        let ctx = Arc::new(WorkerCtx {
            store: Arc::clone(&store),
            permits: Arc::clone(&permits),
            cancels: Arc::clone(&cancels),
            extractor,
            gateway,
            policy: cfg.retry_policy(),
            extract_timeout: cfg.extract_timeout(),
            deliver_timeout: cfg.deliver_timeout(),
            spool_root,
            wake: Arc::clone(&wake),
        });

        Ok(Self {
            stats: StatsAggregator::new(Arc::clone(&store)),
            cfg,
            store,
            limiter,
            permits,
            cancels,
            wake,
            ctx,
        })
    }

    /// Start the configured number of workers against this service's state.
    pub fn spawn_workers(&self) -> WorkerPool {
        WorkerPool::spawn(Arc::clone(&self.ctx), self.cfg.workers)
    }

    /// Validate, admit, and enqueue one download job.
    ///
    /// Validation runs before admission so a malformed URL never consumes a
    /// frequency-window slot. On admission the job is durable before this
    /// returns; if persisting fails the permit is returned immediately.
    pub async fn submit_job(
        &self,
        owner_id: &str,
        display_name: Option<&str>,
        source_url: &str,
        quality: QualitySpec,
    ) -> Result<JobRecord, SubmitError> {
        store::validate_url(source_url)?;
        let permit = self.limiter.try_admit(owner_id)?;
        match self
            .store
            .submit(owner_id, display_name, source_url, quality)
            .await
        {
            Ok(job) => {
                self.permits.insert(job.id, permit);
                self.cancels.register(job.id);
                self.wake.notify_waiters();
                tracing::info!(
                    job = job.id,
                    owner = owner_id,
                    url = source_url,
                    quality = %job.quality,
                    "job submitted"
                );
                Ok(job)
            }
            Err(e) => {
                permit.release();
                Err(e)
            }
        }
    }

    /// Cancel a job.
    ///
    /// A Queued job is cancelled immediately and its extractor is never
    /// invoked. A Running job gets its cancel flag set; the worker observes
    /// it at the next checkpoint and settles the job as Cancelled. The
    /// returned state tells the caller which of the two happened.
    pub async fn cancel_job(&self, id: JobId) -> Result<JobState, CancelError> {
        let Some(job) = self.store.get(id).await else {
            return Err(CancelError::NotFound(id));
        };
        if job.state.is_terminal() {
            return Err(CancelError::AlreadyTerminal(id));
        }

        // Fast path: still Queued, so no worker owns it. The CAS loses only
        // if a worker claimed it concurrently, in which case we fall through
        // to the cooperative path.
        if self
            .store
            .transition(id, JobState::Queued, JobState::Cancelled, Default::default())
            .await?
        {
            self.permits.release(id);
            self.cancels.unregister(id);
            tracing::info!(job = id, "cancelled while queued");
            return Ok(JobState::Cancelled);
        }

        if self.cancels.request_cancel(id) {
            tracing::info!(job = id, "cancellation requested for running job");
            return Ok(JobState::Running);
        }

        // Finished between the lookup and the flag set.
        Err(CancelError::AlreadyTerminal(id))
    }

    pub async fn job_status(&self, id: JobId) -> Option<JobRecord> {
        self.store.get(id).await
    }

    /// All jobs submitted by `owner_id`, newest first.
    pub async fn list_user_jobs(&self, owner_id: &str) -> Vec<JobRecord> {
        self.store.list_by_owner(owner_id).await
    }

    pub async fn global_stats(&self) -> GlobalStats {
        self.stats.global_stats().await
    }

    pub async fn user_stats(&self, owner_id: &str) -> Option<UserProfile> {
        self.stats.user_stats(owner_id).await
    }

    /// True while any job is Queued or Running. Lets a batch front end
    /// decide when draining is complete.
    pub async fn has_live_jobs(&self) -> bool {
        self.store.has_live_jobs().await
    }

    pub fn config(&self) -> &CourierConfig {
        &self.cfg
    }
}
