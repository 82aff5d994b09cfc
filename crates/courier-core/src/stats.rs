//! Read-only usage counters derived from the profile table.
//!
//! Served from the incrementally maintained profiles, never by rescanning
//! the job log, so a stats call costs one bounded lock and never blocks a
//! worker for long.

use std::sync::Arc;

use serde::Serialize;

use crate::store::{JobStore, UserProfile};

/// Aggregate counters across all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub total_users: u64,
    pub total_downloads: u64,
    pub total_bytes: u64,
    /// Users with at least one completed download.
    pub active_users: u64,
}

/// Read-only view over the store's profile table.
pub struct StatsAggregator {
    store: Arc<JobStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    pub async fn global_stats(&self) -> GlobalStats {
        let profiles = self.store.profiles().await;
        let mut stats = GlobalStats {
            total_users: profiles.len() as u64,
            total_downloads: 0,
            total_bytes: 0,
            active_users: 0,
        };
        for profile in &profiles {
            stats.total_downloads += profile.downloads_completed;
            stats.total_bytes += profile.bytes_delivered;
            if profile.last_download_at.is_some() {
                stats.active_users += 1;
            }
        }
        stats
    }

    pub async fn user_stats(&self, owner_id: &str) -> Option<UserProfile> {
        self.store.profile(owner_id).await
    }
}
