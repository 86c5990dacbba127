//! Sync pass orchestration.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::status::StatusPublisher;
use crate::transport::RemoteTransport;
use fitlog_core::{resolve, Clock, EntityKind, LocalStore, MergeDecision, Timestamp};
use fitlog_ledger::{ChangeLedger, CursorTable, EntryId, LedgerEntry, LedgerOp};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The phase a sync pass is currently in.
///
/// Each phase's effects (pushes acknowledged, records merged, ledger
/// compacted) are committed only at that phase's end, so an abort at a phase
/// boundary never leaves a phase half-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No pass is running.
    Idle,
    /// Draining ledger entries to the remote.
    Pushing,
    /// Pulling and merging remote changes.
    Pulling,
    /// Removing confirmed ledger entries.
    Compacting,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Pushing => "pushing",
            SyncPhase::Pulling => "pulling",
            SyncPhase::Compacting => "compacting",
        };
        f.write_str(name)
    }
}

/// Result of one `full_sync` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Ledger entries the remote acknowledged this pass.
    pub pushed: u64,
    /// Remote records applied locally this pass.
    pub pulled: u64,
    /// Ledger entries removed during compaction.
    pub confirmed: u64,
    /// Entries that failed transiently and will retry next pass.
    pub failed: u64,
    /// Entries newly excluded from automatic retry.
    pub stuck: u64,
    /// True if this request coalesced into an already-running pass.
    pub coalesced: bool,
    /// Wall time spent in the pass.
    pub duration: Duration,
}

impl SyncSummary {
    fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::default()
        }
    }

    fn absorb(&mut self, other: SyncSummary) {
        self.pushed += other.pushed;
        self.pulled += other.pulled;
        self.confirmed += other.confirmed;
        self.failed += other.failed;
        self.stuck += other.stuck;
        self.duration += other.duration;
    }
}

/// Cumulative statistics across passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes completed successfully.
    pub passes_completed: u64,
    /// Total ledger entries pushed.
    pub records_pushed: u64,
    /// Total remote records applied locally.
    pub records_pulled: u64,
    /// When the last successful pass finished.
    pub last_pass_at: Option<Timestamp>,
    /// The last pass-fatal error, cleared on the next success.
    pub last_error: Option<String>,
}

struct PushOutcome {
    /// `(entry id, pushed updated_at)` pairs for compaction; the timestamp
    /// guards against compacting an entry superseded mid-pass.
    confirmed: Vec<(EntryId, Timestamp)>,
}

/// Orchestrates sync passes over the store, ledger, cursors, and transport.
///
/// Exactly one pass runs at a time. A `full_sync` arriving mid-pass sets a
/// run-again flag and returns immediately; the running invocation re-runs
/// only if new local work arrived, so duplicate "sync now" requests collapse
/// into a single transport round.
pub struct SyncCoordinator {
    config: SyncConfig,
    store: Arc<dyn LocalStore>,
    ledger: Arc<ChangeLedger>,
    cursors: Arc<CursorTable>,
    transport: Arc<dyn RemoteTransport>,
    monitor: Arc<ConnectivityMonitor>,
    status: Arc<StatusPublisher>,
    clock: Arc<dyn Clock>,
    pass_lock: Mutex<()>,
    run_again: std::sync::atomic::AtomicBool,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
}

impl SyncCoordinator {
    /// Creates a coordinator; also wires status republishing to
    /// connectivity transitions.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        ledger: Arc<ChangeLedger>,
        cursors: Arc<CursorTable>,
        transport: Arc<dyn RemoteTransport>,
        monitor: Arc<ConnectivityMonitor>,
        status: Arc<StatusPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let publisher = status.clone();
        monitor.on_change(move |_| publisher.publish());

        Self {
            config,
            store,
            ledger,
            cursors,
            transport,
            monitor,
            status,
            clock,
            pass_lock: Mutex::new(()),
            run_again: std::sync::atomic::AtomicBool::new(false),
            phase: RwLock::new(SyncPhase::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// The user this engine is scoped to.
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.config.user_id
    }

    /// The current pass phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Cumulative statistics.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Clears every pull watermark so the next pass re-pulls from the epoch.
    pub fn reset_cursors(&self) -> SyncResult<()> {
        self.cursors.reset()?;
        Ok(())
    }

    /// Runs a synchronization pass for `user_id`.
    ///
    /// The only externally triggerable operation. Returns a coalesced
    /// summary if a pass is already running.
    pub fn full_sync(&self, user_id: Uuid) -> SyncResult<SyncSummary> {
        use std::sync::atomic::Ordering;

        if user_id != self.config.user_id {
            return Err(SyncError::UserScopeMismatch {
                requested: user_id,
                configured: self.config.user_id,
            });
        }

        let Some(_guard) = self.pass_lock.try_lock() else {
            self.run_again.store(true, Ordering::SeqCst);
            debug!("sync pass already running; request coalesced");
            return Ok(SyncSummary::coalesced());
        };

        let mut total = SyncSummary::default();
        loop {
            total.absorb(self.run_pass()?);

            // A request that raced in mid-pass only warrants another round
            // if it brought new local work with it.
            if self.run_again.swap(false, Ordering::SeqCst) && self.ledger.pending_count() > 0 {
                debug!("re-running pass for work appended mid-pass");
                continue;
            }
            return Ok(total);
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    fn check_phase_boundary(&self) -> SyncResult<()> {
        if self.monitor.is_online() {
            Ok(())
        } else {
            Err(SyncError::Offline)
        }
    }

    fn run_pass(&self) -> SyncResult<SyncSummary> {
        let start = Instant::now();

        if !self.monitor.is_online() {
            return Err(SyncError::Offline);
        }

        info!(user_id = %self.config.user_id, "sync pass started");
        self.status.set_syncing(true);
        self.status.publish();

        let mut summary = SyncSummary::default();
        let outcome = self.run_phases(&mut summary);

        self.set_phase(SyncPhase::Idle);
        self.status.set_syncing(false);
        self.status.publish();

        summary.duration = start.elapsed();
        match outcome {
            Ok(()) => {
                let mut stats = self.stats.write();
                stats.passes_completed += 1;
                stats.records_pushed += summary.pushed;
                stats.records_pulled += summary.pulled;
                stats.last_pass_at = Some(self.clock.now());
                stats.last_error = None;
                drop(stats);

                info!(
                    pushed = summary.pushed,
                    pulled = summary.pulled,
                    confirmed = summary.confirmed,
                    "sync pass finished"
                );
                Ok(summary)
            }
            Err(e) => {
                self.stats.write().last_error = Some(e.to_string());
                warn!(error = %e, "sync pass aborted");
                Err(e)
            }
        }
    }

    fn run_phases(&self, summary: &mut SyncSummary) -> SyncResult<()> {
        self.set_phase(SyncPhase::Pushing);
        let push = self.push_pending(summary)?;

        self.check_phase_boundary()?;
        self.set_phase(SyncPhase::Pulling);
        self.pull_remote(summary)?;

        self.check_phase_boundary()?;
        self.set_phase(SyncPhase::Compacting);
        self.ledger.mark_confirmed(&push.confirmed)?;
        summary.confirmed = push.confirmed.len() as u64;

        Ok(())
    }

    /// Pushes every eligible ledger entry, oldest first.
    ///
    /// Entry-scoped failures increment the entry's attempt count (or mark it
    /// stuck) and never abort the pass; one poisoned entry never blocks the
    /// rest. Acknowledged ids are held for the compacting phase.
    fn push_pending(&self, summary: &mut SyncSummary) -> SyncResult<PushOutcome> {
        let mut confirmed: Vec<(EntryId, Timestamp)> = Vec::new();
        let mut settled: HashSet<EntryId> = HashSet::new();

        loop {
            // Already-settled entries stay in the ledger until compaction,
            // so widen the window by their count to reach the next chunk.
            let batch: Vec<LedgerEntry> = self
                .ledger
                .list_pending(settled.len() + self.config.push_batch_size)
                .into_iter()
                .filter(|entry| !settled.contains(&entry.entry_id))
                .take(self.config.push_batch_size)
                .collect();
            if batch.is_empty() {
                break;
            }

            for entry in batch {
                settled.insert(entry.entry_id);
                match self.push_entry(&entry) {
                    Ok(()) => {
                        debug!(
                            entry_id = entry.entry_id,
                            kind = %entry.kind(),
                            op = %entry.op,
                            "entry pushed"
                        );
                        confirmed.push((entry.entry_id, entry.record.updated_at));
                        summary.pushed += 1;
                    }
                    Err(e) if e.is_pass_fatal() => return Err(e),
                    Err(SyncError::RemoteValidationRejected { message, .. }) => {
                        warn!(
                            entry_id = entry.entry_id,
                            kind = %entry.kind(),
                            reason = %message,
                            "remote rejected entry; marking stuck"
                        );
                        self.ledger.mark_stuck(entry.entry_id)?;
                        summary.stuck += 1;
                    }
                    Err(e) => {
                        warn!(entry_id = entry.entry_id, error = %e, "push failed; will retry");
                        if self.ledger.increment_attempt(entry.entry_id)? {
                            summary.stuck += 1;
                        } else {
                            summary.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(PushOutcome { confirmed })
    }

    fn push_entry(&self, entry: &LedgerEntry) -> SyncResult<()> {
        match entry.op {
            LedgerOp::Delete => {
                self.transport
                    .delete(entry.kind(), entry.entity_id(), entry.record.updated_at)?;
            }
            LedgerOp::Create | LedgerOp::Update => {
                self.transport.upsert(entry.kind(), &entry.record)?;
            }
        }
        Ok(())
    }

    /// Pulls changed records for every kind and merges them locally.
    ///
    /// A network failure on one kind skips that kind's remaining pages and
    /// continues with the others; local store failures abort the pass. The
    /// watermark advances only after a page has been fully applied, so a
    /// partial-page failure re-pulls the page next pass.
    fn pull_remote(&self, summary: &mut SyncSummary) -> SyncResult<()> {
        for kind in EntityKind::ALL {
            match self.pull_kind(kind, summary) {
                Ok(()) => {}
                Err(e) if e.is_pass_fatal() => return Err(e),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "pull failed; continuing with other kinds");
                }
            }
        }
        Ok(())
    }

    fn pull_kind(&self, kind: EntityKind, summary: &mut SyncSummary) -> SyncResult<()> {
        let since = self.cursors.get(kind);
        let mut page_token: Option<String> = None;

        loop {
            let page =
                self.transport
                    .fetch_changed_since(kind, since, page_token.as_deref())?;

            let mut max_seen = Timestamp::ZERO;
            for remote in &page.records {
                let local = self.store.get_record(kind, remote.id)?;
                match resolve(local.as_ref(), remote) {
                    MergeDecision::ApplyRemote => {
                        self.store.put_record(kind, remote.clone())?;
                        summary.pulled += 1;
                        debug!(kind = %kind, id = %remote.id, "remote record applied");
                    }
                    MergeDecision::KeepLocal => {
                        debug!(kind = %kind, id = %remote.id, "stale remote record ignored");
                    }
                }
                max_seen = max_seen.max(remote.updated_at);
            }

            // The whole page is applied; now it is safe to move the cursor.
            // The candidate is taken from what actually landed in the store,
            // capped at the newest remote timestamp observed: local edits
            // still waiting in the ledger must not drag the pull watermark
            // past data the remote has not sent yet.
            if max_seen > Timestamp::ZERO {
                let landed = self
                    .store
                    .list_changed_since(kind, since)?
                    .into_iter()
                    .map(|record| record.updated_at)
                    .max()
                    .unwrap_or(max_seen);
                self.cursors.advance(kind, landed.min(max_seen))?;
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(())
    }
}
