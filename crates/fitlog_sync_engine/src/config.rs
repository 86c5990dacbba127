//! Configuration for the sync engine.

use std::time::Duration;
use uuid::Uuid;

/// Configuration for sync passes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The user this engine syncs for; supplied by the auth collaborator.
    pub user_id: Uuid,
    /// Maximum ledger entries fetched per push batch.
    pub push_batch_size: usize,
    /// Maximum records requested per pull page.
    pub pull_batch_size: u32,
    /// Timeout applied to each remote transport call.
    pub call_timeout: Duration,
    /// Coarse automatic sync interval while online.
    pub sync_interval: Duration,
}

impl SyncConfig {
    /// Creates a configuration for the given user.
    #[must_use]
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            push_batch_size: 100,
            pull_batch_size: 100,
            call_timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(5 * 60),
        }
    }

    /// Sets the push batch size.
    #[must_use]
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the pull page size.
    #[must_use]
    pub fn with_pull_batch_size(mut self, size: u32) -> Self {
        self.pull_batch_size = size;
        self
    }

    /// Sets the per-call transport timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the automatic sync interval.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}

/// Configuration for the connectivity monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the background driver probes reachability.
    pub probe_interval: Duration,
    /// Consecutive probe failures before the state flips offline.
    ///
    /// Debounces marginal connectivity; a single success always flips back
    /// online.
    pub offline_after: u32,
}

impl MonitorConfig {
    /// Sets the probe interval.
    #[must_use]
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the offline debounce threshold.
    #[must_use]
    pub fn with_offline_after(mut self, failures: u32) -> Self {
        self.offline_after = failures.max(1);
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(12),
            offline_after: 2,
        }
    }
}
