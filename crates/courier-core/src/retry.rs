//! Retry and backoff policy for job attempts.
//!
//! Extraction and delivery share one attempt budget per job; the scheduler
//! asks this policy what to do after each failed attempt.

use std::time::Duration;

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network trouble, timeouts, flaky remote ends. Retryable.
    Transient,
    /// Unsupported input, removed content, size limits. Never retried.
    Permanent,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminate the job with the failure it just hit.
    NoRetry,
    /// Requeue and try again once the delay has passed.
    RetryAfter(Duration),
}

/// Exponential backoff with an attempt budget and a delay cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts per job (including the first).
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `base * 2^n`, capped.
    pub base_delay: Duration,
    /// Upper bound on any backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Decide what happens after attempt number `attempt` (1-based) failed
    /// with `kind`.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if kind == FailureKind::Permanent || attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }

    /// Delay before re-running a job that has made `attempt` attempts:
    /// `min(2^attempt * base_delay, max_delay)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }
}
