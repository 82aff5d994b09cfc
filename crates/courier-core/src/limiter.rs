//! Admission control: global/per-user capacity plus a sliding-window
//! frequency cap, handed out as single-use permits.
//!
//! A permit is granted at submission and held for the job's whole active
//! life (Queued and Running); it is returned exactly once, when the job
//! reaches a terminal state. Dropping an unreleased permit releases it as a
//! backstop, so a slot can never be leaked or released twice.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::AdmitError;
use crate::store::types::JobId;

struct LimiterState {
    active_total: usize,
    active_per_user: HashMap<String, usize>,
    admitted_at: HashMap<String, VecDeque<Instant>>,
}

impl LimiterState {
    /// Drop window entries older than `window`; owners with nothing left in
    /// the window are removed so the map stays bounded by recent submitters
    /// rather than every owner ever admitted.
    fn prune_admitted(&mut self, now: Instant, window: Duration) {
        self.admitted_at.retain(|_, recent| {
            while recent
                .front()
                .is_some_and(|t| now.duration_since(*t) >= window)
            {
                recent.pop_front();
            }
            !recent.is_empty()
        });
    }
}

struct LimiterShared {
    max_active: usize,
    max_active_per_user: usize,
    window: Duration,
    max_per_window: usize,
    state: Mutex<LimiterState>,
}

impl LimiterShared {
    fn release(&self, owner: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active_total = state.active_total.saturating_sub(1);
        if let Some(count) = state.active_per_user.get_mut(owner) {
            *count -= 1;
            if *count == 0 {
                state.active_per_user.remove(owner);
            }
        }
    }
}

/// Per-user and global admission gate.
pub struct RateLimiter {
    shared: Arc<LimiterShared>,
}

impl RateLimiter {
    pub fn new(
        max_active: usize,
        max_active_per_user: usize,
        max_per_window: usize,
        window: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(LimiterShared {
                max_active: max_active.max(1),
                max_active_per_user: max_active_per_user.max(1),
                window,
                max_per_window: max_per_window.max(1),
                state: Mutex::new(LimiterState {
                    active_total: 0,
                    active_per_user: HashMap::new(),
                    admitted_at: HashMap::new(),
                }),
            }),
        }
    }

    /// Admit a submission for `owner` or explain the refusal.
    ///
    /// Only admitted submissions consume frequency-window slots; a caller
    /// being told "no" repeatedly does not dig itself a deeper hole.
    pub fn try_admit(&self, owner: &str) -> Result<Permit, AdmitError> {
        let shared = &self.shared;
        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.active_total >= shared.max_active {
            return Err(AdmitError::GlobalCapacity {
                active: state.active_total,
                limit: shared.max_active,
            });
        }
        let user_active = state.active_per_user.get(owner).copied().unwrap_or(0);
        if user_active >= shared.max_active_per_user {
            return Err(AdmitError::PerUserCapacity {
                active: user_active,
                limit: shared.max_active_per_user,
            });
        }

        let now = Instant::now();
        state.prune_admitted(now, shared.window);
        let recent = state.admitted_at.entry(owner.to_string()).or_default();
        if recent.len() >= shared.max_per_window {
            return Err(AdmitError::Frequency {
                limit: shared.max_per_window,
                window_secs: shared.window.as_secs(),
            });
        }
        recent.push_back(now);

        state.active_total += 1;
        *state.active_per_user.entry(owner.to_string()).or_insert(0) += 1;
        drop(state);
        Ok(Permit::new(Arc::clone(shared), owner))
    }

    /// Rebuild the permit for a job that was already admitted before a
    /// restart. Capacity accounting only: caps and the frequency window are
    /// not re-checked, since the job is already in the durable queue.
    pub fn readmit(&self, owner: &str) -> Permit {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active_total += 1;
        *state.active_per_user.entry(owner.to_string()).or_insert(0) += 1;
        drop(state);
        Permit::new(Arc::clone(&self.shared), owner)
    }

    /// Owners with submissions still inside the frequency window.
    #[cfg(test)]
    fn tracked_owners(&self) -> usize {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .admitted_at
            .len()
    }

    /// Currently active (admitted, not yet terminal) jobs.
    pub fn active(&self) -> usize {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_total
    }
}

/// Single-use admission token. Consumed exactly once by [`Permit::release`];
/// dropping it unreleased releases the slot as a backstop.
pub struct Permit {
    shared: Option<Arc<LimiterShared>>,
    owner: String,
}

impl Permit {
    fn new(shared: Arc<LimiterShared>, owner: &str) -> Self {
        Self {
            shared: Some(shared),
            owner: owner.to_string(),
        }
    }

    /// Return the slot. Idempotence is structural: the token is consumed.
    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release(&self.owner);
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("owner", &self.owner)
            .field("held", &self.shared.is_some())
            .finish()
    }
}

/// Table of live permits keyed by job id, owned by the service.
///
/// `release` removes and consumes; a second call for the same job finds
/// nothing and is a no-op, which is what makes the worker's finalize
/// sequence safely re-runnable.
#[derive(Default)]
pub struct PermitTable {
    permits: Mutex<HashMap<JobId, Permit>>,
}

impl PermitTable {
    pub fn insert(&self, id: JobId, permit: Permit) {
        self.permits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, permit);
    }

    pub fn release(&self, id: JobId) {
        let permit = self
            .permits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        if let Some(permit) = permit {
            permit.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(g: usize, u: usize, f: usize) -> RateLimiter {
        RateLimiter::new(g, u, f, Duration::from_secs(60))
    }

    #[test]
    fn per_user_bound_enforced() {
        let l = limiter(10, 1, 100);
        let p = l.try_admit("u1").unwrap();
        assert!(matches!(
            l.try_admit("u1"),
            Err(AdmitError::PerUserCapacity { active: 1, limit: 1 })
        ));
        // Other users are unaffected.
        let _q = l.try_admit("u2").unwrap();
        // After release the user gets a slot again.
        p.release();
        assert!(l.try_admit("u1").is_ok());
    }

    #[test]
    fn global_bound_enforced() {
        let l = limiter(2, 5, 100);
        let _a = l.try_admit("u1").unwrap();
        let _b = l.try_admit("u2").unwrap();
        assert!(matches!(
            l.try_admit("u3"),
            Err(AdmitError::GlobalCapacity { active: 2, limit: 2 })
        ));
    }

    #[test]
    fn frequency_window_counts_admitted_only() {
        let l = limiter(100, 100, 2);
        let a = l.try_admit("u1").unwrap();
        let b = l.try_admit("u1").unwrap();
        assert!(matches!(l.try_admit("u1"), Err(AdmitError::Frequency { .. })));
        // Releasing capacity does not reset the rolling window.
        a.release();
        b.release();
        assert!(matches!(l.try_admit("u1"), Err(AdmitError::Frequency { .. })));
        // Rejections never consumed window slots for anyone else.
        assert!(l.try_admit("u2").is_ok());
    }

    #[test]
    fn drop_releases_exactly_once() {
        let l = limiter(1, 1, 100);
        {
            let _p = l.try_admit("u1").unwrap();
            assert_eq!(l.active(), 1);
        }
        assert_eq!(l.active(), 0);
        // Slot is usable again, and active never went negative.
        let p = l.try_admit("u1").unwrap();
        p.release();
        assert_eq!(l.active(), 0);
    }

    #[test]
    fn permit_table_release_is_idempotent() {
        let l = limiter(4, 4, 100);
        let table = PermitTable::default();
        table.insert(1, l.try_admit("u1").unwrap());
        assert_eq!(l.active(), 1);
        table.release(1);
        table.release(1);
        assert_eq!(l.active(), 0);
    }

    #[test]
    fn expired_window_entries_are_swept() {
        let l = RateLimiter::new(10, 1, 2, Duration::from_millis(10));
        let p = l.try_admit("u1").unwrap();
        p.release();
        assert_eq!(l.tracked_owners(), 1);

        std::thread::sleep(Duration::from_millis(20));
        // u1's window has expired; the next admission sweeps its entry out.
        let _q = l.try_admit("u2").unwrap();
        assert_eq!(l.tracked_owners(), 1);
    }

    #[test]
    fn readmit_bypasses_frequency_window() {
        let l = limiter(10, 1, 1);
        let p = l.try_admit("u1").unwrap();
        p.release();
        // Window is exhausted for u1, but restart readmission still counts
        // the job against capacity.
        let p = l.readmit("u1");
        assert_eq!(l.active(), 1);
        assert!(matches!(
            l.try_admit("u1"),
            Err(AdmitError::PerUserCapacity { .. })
        ));
        p.release();
    }
}
