//! Cooperative cancellation: shared flags, one per live job.
//!
//! A flag is registered when a job is admitted and removed when it reaches a
//! terminal state. Cancelling sets the flag; the worker checks it at each
//! suspension point (before extraction, before delivery) and aborts cleanly.
//! A job already inside an extractor call finishes that call (or its
//! timeout) first, which bounds worst-case cancellation latency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::store::types::JobId;

/// Registry of job id -> cancel flag.
#[derive(Default)]
pub struct CancelRegistry {
    jobs: RwLock<HashMap<JobId, Arc<AtomicBool>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live job; returns the flag the worker will poll.
    pub fn register(&self, id: JobId) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&flag));
        flag
    }

    /// Remove a finished job's flag.
    pub fn unregister(&self, id: JobId) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    /// Request cancellation. Returns false if the job has no live flag
    /// (never admitted or already finished).
    pub fn request_cancel(&self, id: JobId) -> bool {
        match self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
        {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Whether cancellation was requested for `id`.
    pub fn is_cancelled(&self, id: JobId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
