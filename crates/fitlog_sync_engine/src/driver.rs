//! Background sync scheduling.

use crate::connectivity::ConnectivityMonitor;
use crate::coordinator::SyncCoordinator;
use crate::error::SyncError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Owns the probe/timer thread that triggers automatic sync passes.
///
/// A pass is requested on every offline→online transition and on the coarse
/// `sync_interval` while online. Manual `full_sync` calls coexist freely;
/// the coordinator's single-flight guard coalesces overlap.
pub struct SyncDriver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SyncDriver {
    /// Spawns the driver thread.
    ///
    /// `poll_interval` is how often the thread wakes to probe and check the
    /// timer; the monitor's own `probe_interval` configuration is the
    /// recommended value.
    pub fn spawn(
        coordinator: Arc<SyncCoordinator>,
        monitor: Arc<ConnectivityMonitor>,
        poll_interval: Duration,
        sync_interval: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let sync_requested = Arc::new(AtomicBool::new(false));
        {
            let requested = sync_requested.clone();
            monitor.on_change(move |online| {
                if online {
                    requested.store(true, Ordering::Release);
                }
            });
        }

        let handle = std::thread::spawn(move || {
            info!("sync driver started");
            let mut last_pass: Option<Instant> = None;

            while !stop_flag.load(Ordering::Acquire) {
                monitor.check_now();

                let interval_due =
                    last_pass.is_none_or(|at| at.elapsed() >= sync_interval);
                let requested = sync_requested.swap(false, Ordering::AcqRel);

                if monitor.is_online() && (requested || interval_due) {
                    match coordinator.full_sync(coordinator.user_id()) {
                        Ok(summary) => {
                            debug!(
                                pushed = summary.pushed,
                                pulled = summary.pulled,
                                "scheduled sync pass completed"
                            );
                        }
                        Err(SyncError::Offline) => {
                            debug!("scheduled sync pass skipped; went offline");
                        }
                        Err(e) => {
                            warn!(error = %e, "scheduled sync pass failed");
                        }
                    }
                    last_pass = Some(Instant::now());
                }

                std::thread::sleep(poll_interval);
            }
            info!("sync driver stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signals the thread to stop and joins it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitorConfig, SyncConfig};
    use crate::connectivity::ScriptedProbe;
    use crate::status::StatusPublisher;
    use crate::transport::MockTransport;
    use fitlog_core::{ManualClock, MemoryStore, Timestamp};
    use fitlog_ledger::{ChangeLedger, CursorTable, LedgerConfig};
    use uuid::Uuid;

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn spawn_driver() -> (SyncDriver, Arc<SyncCoordinator>, Arc<ScriptedProbe>) {
        let user_id = Uuid::new_v4();
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let ledger = Arc::new(ChangeLedger::in_memory(LedgerConfig::default(), clock.clone()));
        let probe = Arc::new(ScriptedProbe::new(false));
        let monitor = Arc::new(ConnectivityMonitor::new(
            probe.clone(),
            MonitorConfig::default().with_offline_after(1),
            clock.clone(),
        ));
        let status = Arc::new(StatusPublisher::new(ledger.clone(), monitor.clone()));

        let coordinator = Arc::new(SyncCoordinator::new(
            SyncConfig::new(user_id),
            Arc::new(MemoryStore::new()),
            ledger,
            Arc::new(CursorTable::in_memory()),
            Arc::new(MockTransport::new()),
            monitor.clone(),
            status,
            clock,
        ));

        let driver = SyncDriver::spawn(
            coordinator.clone(),
            monitor,
            Duration::from_millis(5),
            Duration::from_millis(50),
        );
        (driver, coordinator, probe)
    }

    #[test]
    fn online_transition_triggers_a_pass() {
        let (mut driver, coordinator, probe) = spawn_driver();

        assert_eq!(coordinator.stats().passes_completed, 0);

        probe.set_online(true);
        assert!(wait_until(Duration::from_secs(2), || {
            coordinator.stats().passes_completed >= 1
        }));

        driver.stop();
    }

    #[test]
    fn interval_triggers_repeat_passes_while_online() {
        let (mut driver, coordinator, probe) = spawn_driver();

        probe.set_online(true);
        assert!(wait_until(Duration::from_secs(2), || {
            coordinator.stats().passes_completed >= 2
        }));

        driver.stop();
    }

    #[test]
    fn stop_joins_the_thread() {
        let (mut driver, _, _) = spawn_driver();
        driver.stop();
        assert!(driver.handle.is_none());
        // Idempotent.
        driver.stop();
    }
}
