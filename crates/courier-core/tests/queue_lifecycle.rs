//! End-to-end lifecycle tests driving the `Courier` service with scripted
//! extractor and gateway adapters: retry-until-success, permanent failures,
//! size rejection, per-user caps, queued cancellation, and crash recovery.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use courier_core::config::RetryConfig;
use courier_core::store::JobStore;
use courier_core::{
    AdmitError, Artifact, Courier, CourierConfig, DeliverError, DeliveryGateway, ExtractError,
    Extractor, FailureReason, JobId, JobRecord, JobState, MediaKind, QualitySpec, SubmitError,
};

enum ExtractStep {
    Ok { size_bytes: u64 },
    Transient(&'static str),
    Permanent(&'static str),
    /// Block inside the extractor until the test opens the gate, then succeed.
    Stall,
}

/// Extractor that plays back a script of outcomes, then succeeds forever.
struct ScriptedExtractor {
    script: Mutex<VecDeque<ExtractStep>>,
    calls: AtomicUsize,
    gate: Semaphore,
}

impl ScriptedExtractor {
    fn new(script: Vec<ExtractStep>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn resolve(
        &self,
        _url: &str,
        _quality: QualitySpec,
        dest_dir: &Path,
    ) -> Result<Artifact, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExtractStep::Ok { size_bytes: 64 });
        let step = match step {
            ExtractStep::Stall => {
                let _permit = self.gate.acquire().await.expect("extractor gate closed");
                ExtractStep::Ok { size_bytes: 64 }
            }
            other => other,
        };
        match step {
            ExtractStep::Stall => unreachable!("stall resolved above"),
            ExtractStep::Transient(msg) => Err(ExtractError::Transient(msg.to_string())),
            ExtractStep::Permanent(msg) => Err(ExtractError::Permanent(msg.to_string())),
            ExtractStep::Ok { size_bytes } => {
                let path = dest_dir.join("media.bin");
                tokio::fs::write(&path, vec![0u8; size_bytes as usize])
                    .await
                    .map_err(|e| ExtractError::Transient(e.to_string()))?;
                Ok(Artifact {
                    path,
                    size_bytes,
                    media_kind: MediaKind::Video,
                })
            }
        }
    }
}

/// Gateway that records successful deliveries and plays back scripted refusals.
#[derive(Default)]
struct RecordingGateway {
    deliveries: Mutex<Vec<(String, u64)>>,
    refusals: Mutex<VecDeque<DeliverError>>,
}

impl RecordingGateway {
    fn with_refusals(refusals: Vec<DeliverError>) -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            refusals: Mutex::new(refusals.into()),
        })
    }

    fn deliveries(&self) -> Vec<(String, u64)> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryGateway for RecordingGateway {
    async fn deliver(&self, owner_id: &str, artifact: &Artifact) -> Result<(), DeliverError> {
        if let Some(refusal) = self.refusals.lock().unwrap().pop_front() {
            return Err(refusal);
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((owner_id.to_string(), artifact.size_bytes));
        Ok(())
    }
}

fn test_config(root: &Path, workers: usize) -> CourierConfig {
    CourierConfig {
        workers,
        state_dir: Some(root.join("state")),
        spool_dir: Some(root.join("spool")),
        retry: Some(RetryConfig {
            max_attempts: 3,
            base_delay_secs: 0.01,
            max_delay_secs: 1,
        }),
        extract_timeout_secs: 5,
        deliver_timeout_secs: 5,
        ..CourierConfig::default()
    }
}

async fn wait_terminal(courier: &Courier, id: JobId) -> JobRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(job) = courier.job_status(id).await {
            if job.state.is_terminal() {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} never reached a terminal state"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = ScriptedExtractor::new(vec![
        ExtractStep::Transient("connection reset"),
        ExtractStep::Transient("connection reset"),
        ExtractStep::Ok { size_bytes: 100 },
    ]);
    let gateway = RecordingGateway::with_refusals(vec![]);
    let courier = Courier::open(
        test_config(dir.path(), 1),
        Arc::clone(&extractor) as Arc<dyn Extractor>,
        Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
    )
    .await
    .unwrap();

    let job = courier
        .submit_job("u1", Some("Uma"), "https://example.com/v", QualitySpec::Best)
        .await
        .unwrap();
    let pool = courier.spawn_workers();
    let done = wait_terminal(&courier, job.id).await;
    pool.shutdown().await;

    assert_eq!(done.state, JobState::Succeeded);
    assert_eq!(done.attempt, 3);
    assert_eq!(done.result_size_bytes, Some(100));
    assert_eq!(extractor.calls(), 3);
    // Exactly one delivery despite three attempts.
    assert_eq!(gateway.deliveries(), vec![("u1".to_string(), 100)]);

    let stats = courier.global_stats().await;
    assert_eq!(stats.total_downloads, 1);
    assert_eq!(stats.total_bytes, 100);
}

#[tokio::test]
async fn permanent_extraction_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = ScriptedExtractor::new(vec![ExtractStep::Permanent("video removed")]);
    let gateway = RecordingGateway::with_refusals(vec![]);
    let courier = Courier::open(
        test_config(dir.path(), 1),
        Arc::clone(&extractor) as Arc<dyn Extractor>,
        Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
    )
    .await
    .unwrap();

    let job = courier
        .submit_job("u1", None, "https://example.com/gone", QualitySpec::Hd)
        .await
        .unwrap();
    let pool = courier.spawn_workers();
    let done = wait_terminal(&courier, job.id).await;
    pool.shutdown().await;

    assert_eq!(done.state, JobState::Failed);
    assert_eq!(done.attempt, 1);
    assert!(matches!(
        done.failure_reason,
        Some(FailureReason::ExtractionPermanent { .. })
    ));
    assert_eq!(extractor.calls(), 1);
    assert!(gateway.deliveries().is_empty());
}

#[tokio::test]
async fn oversized_artifact_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = ScriptedExtractor::new(vec![ExtractStep::Ok { size_bytes: 999 }]);
    let gateway = RecordingGateway::with_refusals(vec![DeliverError::TooLarge {
        size_bytes: 999,
        limit_bytes: 100,
    }]);
    let courier = Courier::open(
        test_config(dir.path(), 1),
        Arc::clone(&extractor) as Arc<dyn Extractor>,
        Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
    )
    .await
    .unwrap();

    let job = courier
        .submit_job("u1", None, "https://example.com/big", QualitySpec::Best)
        .await
        .unwrap();
    let pool = courier.spawn_workers();
    let done = wait_terminal(&courier, job.id).await;
    pool.shutdown().await;

    assert_eq!(done.state, JobState::Failed);
    assert_eq!(done.attempt, 1);
    assert!(matches!(
        done.failure_reason,
        Some(FailureReason::DeliveryTooLarge {
            size_bytes: 999,
            limit_bytes: 100
        })
    ));
    assert_eq!(extractor.calls(), 1);
    assert!(gateway.deliveries().is_empty());
}

#[tokio::test]
async fn per_user_cap_rejects_until_completion() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = ScriptedExtractor::new(vec![]);
    let gateway = RecordingGateway::with_refusals(vec![]);
    let courier = Courier::open(
        test_config(dir.path(), 1),
        Arc::clone(&extractor) as Arc<dyn Extractor>,
        Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
    )
    .await
    .unwrap();

    let first = courier
        .submit_job("u1", None, "https://example.com/a", QualitySpec::Best)
        .await
        .unwrap();
    // Second submission from the same user is refused while the first is active.
    let refused = courier
        .submit_job("u1", None, "https://example.com/b", QualitySpec::Best)
        .await;
    assert!(matches!(
        refused,
        Err(SubmitError::Rejected(AdmitError::PerUserCapacity {
            active: 1,
            limit: 1
        }))
    ));
    // Other users are unaffected.
    courier
        .submit_job("u2", None, "https://example.com/c", QualitySpec::Best)
        .await
        .unwrap();

    let pool = courier.spawn_workers();
    wait_terminal(&courier, first.id).await;
    // The slot frees as soon as the first job completes.
    courier
        .submit_job("u1", None, "https://example.com/b", QualitySpec::Best)
        .await
        .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while courier.has_live_jobs().await {
        assert!(tokio::time::Instant::now() < deadline, "queue never drained");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    pool.shutdown().await;

    assert_eq!(gateway.deliveries().len(), 3);
}

#[tokio::test]
async fn queued_cancel_never_invokes_the_extractor() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = ScriptedExtractor::new(vec![]);
    let gateway = RecordingGateway::with_refusals(vec![]);
    let courier = Courier::open(
        test_config(dir.path(), 1),
        Arc::clone(&extractor) as Arc<dyn Extractor>,
        Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
    )
    .await
    .unwrap();

    // No workers running yet, so the job stays Queued.
    let job = courier
        .submit_job("u1", None, "https://example.com/x", QualitySpec::Best)
        .await
        .unwrap();
    assert_eq!(courier.cancel_job(job.id).await.unwrap(), JobState::Cancelled);

    // Cancellation released the per-user slot.
    courier
        .submit_job("u1", None, "https://example.com/y", QualitySpec::Best)
        .await
        .unwrap();

    // Cancelling again reports the job as already finished.
    assert!(matches!(
        courier.cancel_job(job.id).await,
        Err(courier_core::CancelError::AlreadyTerminal(_))
    ));

    let pool = courier.spawn_workers();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while courier.has_live_jobs().await {
        assert!(tokio::time::Instant::now() < deadline, "queue never drained");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    pool.shutdown().await;

    let cancelled = courier.job_status(job.id).await.unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);
    // Only the second job ever reached the extractor.
    assert_eq!(extractor.calls(), 1);
    assert_eq!(gateway.deliveries().len(), 1);
}

#[tokio::test]
async fn running_cancel_settles_without_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path(), 1);
    let spool_root = cfg.spool_dir().unwrap();
    let extractor = ScriptedExtractor::new(vec![ExtractStep::Stall]);
    let gateway = RecordingGateway::with_refusals(vec![]);
    let courier = Courier::open(
        cfg,
        Arc::clone(&extractor) as Arc<dyn Extractor>,
        Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
    )
    .await
    .unwrap();

    let job = courier
        .submit_job("u1", None, "https://example.com/slow", QualitySpec::Best)
        .await
        .unwrap();
    let pool = courier.spawn_workers();

    // Wait until the worker is inside the extractor call.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while extractor.calls() == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "extractor never invoked"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Mid-extract cancellation is cooperative: the call reports the job
    // still Running, and the worker observes the flag at its next checkpoint.
    assert_eq!(courier.cancel_job(job.id).await.unwrap(), JobState::Running);
    extractor.gate.add_permits(1);

    let done = wait_terminal(&courier, job.id).await;
    pool.shutdown().await;

    assert_eq!(done.state, JobState::Cancelled);
    // The flag was observed before delivery; nothing was handed out.
    assert!(gateway.deliveries().is_empty());
    // The spool directory is removed on the cancel path too.
    assert!(!spool_root.join(format!("job-{}", job.id)).exists());
    // The per-user slot freed when the job settled.
    courier
        .submit_job("u1", None, "https://example.com/next", QualitySpec::Best)
        .await
        .unwrap();
}

#[tokio::test]
async fn restart_requeues_stranded_jobs_and_restores_admission() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path(), 1);
    let state_dir = cfg.state_dir().unwrap();

    // Simulate a crash: a store with a claimed (Running) job, dropped without
    // the job ever settling.
    {
        let store = JobStore::open_at(&state_dir, 4096).await.unwrap();
        store
            .submit("u1", None, "https://example.com/v", QualitySpec::Best)
            .await
            .unwrap();
        let claimed = store
            .claim_next_queued(courier_core::store::unix_millis())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.state, JobState::Running);
    }

    let extractor = ScriptedExtractor::new(vec![]);
    let gateway = RecordingGateway::with_refusals(vec![]);
    let courier = Courier::open(
        cfg,
        Arc::clone(&extractor) as Arc<dyn Extractor>,
        Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
    )
    .await
    .unwrap();

    // The stranded job came back as Queued with its interrupted attempt
    // rolled back, and it still holds its admission slot.
    let recovered = courier.job_status(1).await.unwrap();
    assert_eq!(recovered.state, JobState::Queued);
    assert_eq!(recovered.attempt, 0);
    assert!(matches!(
        courier
            .submit_job("u1", None, "https://example.com/w", QualitySpec::Best)
            .await,
        Err(SubmitError::Rejected(AdmitError::PerUserCapacity { .. }))
    ));

    let pool = courier.spawn_workers();
    let done = wait_terminal(&courier, 1).await;
    pool.shutdown().await;

    assert_eq!(done.state, JobState::Succeeded);
    assert_eq!(done.attempt, 1);
    assert_eq!(gateway.deliveries().len(), 1);
}
