//! Connectivity monitoring.
//!
//! The monitor never raises: any uncertainty degrades to "assume offline",
//! which only gates whether sync attempts occur, never whether local writes
//! succeed. State is transient and starts offline until the first probe.

use crate::config::MonitorConfig;
use fitlog_core::{Clock, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// A reachability check against the backend.
///
/// Implementations must return `false` on timeout or any uncertainty rather
/// than raising.
pub trait ReachabilityProbe: Send + Sync {
    /// Returns true if the backend is currently reachable.
    fn check(&self) -> bool;
}

/// A probe whose result tests control directly.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    online: AtomicBool,
}

impl ScriptedProbe {
    /// Creates a probe reporting `online`.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Sets the probe result.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ReachabilityProbe for ScriptedProbe {
    fn check(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

struct MonitorState {
    is_online: bool,
    last_checked_at: Option<Timestamp>,
    consecutive_failures: u32,
}

type ChangeListener = Box<dyn Fn(bool) + Send + Sync>;

/// Tracks online/offline state via reachability probing.
///
/// `is_online` is a non-blocking read of the last-known state. Listeners
/// registered with `on_change` fire at most once per transition. Flipping
/// offline is debounced behind `offline_after` consecutive failures; a
/// single success flips back online.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor; assumed offline until the first probe.
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        config: MonitorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probe,
            config,
            clock,
            state: Mutex::new(MonitorState {
                is_online: false,
                last_checked_at: None,
                consecutive_failures: 0,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the last-known online state without probing.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state.lock().is_online
    }

    /// Returns when the last probe ran, if any.
    #[must_use]
    pub fn last_checked_at(&self) -> Option<Timestamp> {
        self.state.lock().last_checked_at
    }

    /// Registers a listener invoked at most once per transition.
    pub fn on_change(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Runs one probe and returns the resulting online state.
    ///
    /// Called by the background driver on its interval, and immediately on
    /// startup. Listeners fire outside the state lock.
    pub fn check_now(&self) -> bool {
        let reachable = self.probe.check();
        let now = self.clock.now();

        let transition = {
            let mut state = self.state.lock();
            state.last_checked_at = Some(now);

            if reachable {
                state.consecutive_failures = 0;
                if !state.is_online {
                    state.is_online = true;
                    Some(true)
                } else {
                    None
                }
            } else {
                state.consecutive_failures += 1;
                if state.is_online && state.consecutive_failures >= self.config.offline_after {
                    state.is_online = false;
                    Some(false)
                } else {
                    None
                }
            }
        };

        if let Some(online) = transition {
            info!(online, "connectivity transition");
            for listener in self.listeners.lock().iter() {
                listener(online);
            }
        }

        self.state.lock().is_online
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitlog_core::ManualClock;
    use std::sync::atomic::AtomicUsize;

    fn monitor(probe: Arc<ScriptedProbe>, offline_after: u32) -> ConnectivityMonitor {
        ConnectivityMonitor::new(
            probe,
            MonitorConfig::default().with_offline_after(offline_after),
            Arc::new(ManualClock::new(Timestamp::from_millis(1_000))),
        )
    }

    #[test]
    fn starts_offline_until_first_probe() {
        let probe = Arc::new(ScriptedProbe::new(true));
        let monitor = monitor(probe, 2);

        assert!(!monitor.is_online());
        assert!(monitor.last_checked_at().is_none());

        assert!(monitor.check_now());
        assert!(monitor.is_online());
        assert_eq!(
            monitor.last_checked_at(),
            Some(Timestamp::from_millis(1_000))
        );
    }

    #[test]
    fn offline_flip_is_debounced() {
        let probe = Arc::new(ScriptedProbe::new(true));
        let monitor = monitor(probe.clone(), 2);
        monitor.check_now();
        assert!(monitor.is_online());

        probe.set_online(false);
        assert!(monitor.check_now());
        assert!(monitor.is_online());

        assert!(!monitor.check_now());
        assert!(!monitor.is_online());
    }

    #[test]
    fn single_success_flips_back_online() {
        let probe = Arc::new(ScriptedProbe::new(false));
        let monitor = monitor(probe.clone(), 1);

        monitor.check_now();
        assert!(!monitor.is_online());

        probe.set_online(true);
        assert!(monitor.check_now());
        assert!(monitor.is_online());
    }

    #[test]
    fn listeners_fire_once_per_transition() {
        let probe = Arc::new(ScriptedProbe::new(true));
        let monitor = monitor(probe.clone(), 1);

        let transitions = Arc::new(Mutex::new(Vec::new()));
        let seen = transitions.clone();
        monitor.on_change(move |online| seen.lock().push(online));

        monitor.check_now();
        monitor.check_now();
        probe.set_online(false);
        monitor.check_now();
        monitor.check_now();
        probe.set_online(true);
        monitor.check_now();

        assert_eq!(&*transitions.lock(), &[true, false, true]);
    }

    #[test]
    fn repeated_failures_while_offline_stay_quiet() {
        let probe = Arc::new(ScriptedProbe::new(false));
        let monitor = monitor(probe, 1);

        let fired = Arc::new(AtomicUsize::new(0));
        let count = fired.clone();
        monitor.on_change(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        monitor.check_now();
        monitor.check_now();
        monitor.check_now();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
