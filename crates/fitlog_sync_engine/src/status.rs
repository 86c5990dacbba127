//! Status surface for UI observers.

use crate::connectivity::ConnectivityMonitor;
use fitlog_ledger::ChangeLedger;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A point-in-time snapshot of the engine's observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    /// Last-known connectivity.
    pub is_online: bool,
    /// Whether a sync pass is currently running.
    pub is_syncing: bool,
    /// Ledger entries awaiting push.
    pub pending_count: usize,
    /// Ledger entries excluded from automatic retry.
    pub stuck_count: usize,
}

type StatusListener = Box<dyn Fn(SyncStatus) + Send + Sync>;

/// Publishes engine state to observers.
///
/// Purely observational: reads are computed on demand from the ledger and
/// monitor, and nothing here blocks the coordinator. Listeners fire only
/// when the snapshot actually changed.
pub struct StatusPublisher {
    ledger: Arc<ChangeLedger>,
    monitor: Arc<ConnectivityMonitor>,
    is_syncing: AtomicBool,
    listeners: Mutex<Vec<StatusListener>>,
    last_published: Mutex<Option<SyncStatus>>,
}

impl StatusPublisher {
    /// Creates a publisher over the given ledger and monitor.
    pub fn new(ledger: Arc<ChangeLedger>, monitor: Arc<ConnectivityMonitor>) -> Self {
        Self {
            ledger,
            monitor,
            is_syncing: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            last_published: Mutex::new(None),
        }
    }

    /// Last-known connectivity.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Whether a sync pass is currently running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::SeqCst)
    }

    /// Ledger entries awaiting push.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ledger.pending_count()
    }

    /// Ledger entries excluded from automatic retry.
    #[must_use]
    pub fn stuck_count(&self) -> usize {
        self.ledger.stuck_count()
    }

    /// Computes the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SyncStatus {
        SyncStatus {
            is_online: self.is_online(),
            is_syncing: self.is_syncing(),
            pending_count: self.pending_count(),
            stuck_count: self.stuck_count(),
        }
    }

    /// Registers a listener invoked when the published snapshot changes.
    pub fn on_change(&self, listener: impl Fn(SyncStatus) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Recomputes the snapshot and notifies listeners if it changed.
    pub fn publish(&self) {
        let snapshot = self.snapshot();
        {
            let mut last = self.last_published.lock();
            if *last == Some(snapshot) {
                return;
            }
            *last = Some(snapshot);
        }
        for listener in self.listeners.lock().iter() {
            listener(snapshot);
        }
    }

    pub(crate) fn set_syncing(&self, syncing: bool) {
        self.is_syncing.store(syncing, Ordering::SeqCst);
    }
}
