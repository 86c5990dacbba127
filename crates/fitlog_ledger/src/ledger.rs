//! The change ledger.

use crate::entry::{EntryId, LedgerEntry, LedgerOp};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{Journal, JournalRecord};
use fitlog_core::{Clock, EntityKind, EntityRecord, Timestamp};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Configuration for ledger retry and checkpoint behavior.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Attempts after which an entry is flagged stuck.
    pub retry_ceiling: u32,
    /// Base delay for per-entry exponential backoff.
    pub backoff_base: Duration,
    /// Upper bound on the per-entry backoff delay.
    pub backoff_max: Duration,
    /// Journal records between checkpoints.
    pub checkpoint_every: u64,
}

impl LedgerConfig {
    /// Sets the retry ceiling.
    #[must_use]
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Sets the maximum backoff delay.
    #[must_use]
    pub fn with_backoff_max(mut self, max: Duration) -> Self {
        self.backoff_max = max;
        self
    }

    /// Sets the checkpoint interval.
    #[must_use]
    pub fn with_checkpoint_every(mut self, every: u64) -> Self {
        self.checkpoint_every = every;
        self
    }

    /// Delay before the next push attempt, given failures so far.
    #[must_use]
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempts - 1).min(16);
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.backoff_max)
    }

    fn is_eligible(&self, entry: &LedgerEntry, now: Timestamp) -> bool {
        match entry.last_attempt_at {
            None => true,
            Some(last) => {
                let delay = self.delay_for_attempt(entry.attempt_count);
                now.as_millis() >= last.as_millis().saturating_add(delay.as_millis() as u64)
            }
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 8,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(15 * 60),
            checkpoint_every: 64,
        }
    }
}

struct Inner {
    entries: BTreeMap<EntryId, LedgerEntry>,
    by_entity: HashMap<(EntityKind, Uuid), EntryId>,
    next_entry_id: EntryId,
    journal: Option<Journal>,
    records_since_checkpoint: u64,
}

impl Inner {
    fn journal_append(&mut self, record: &JournalRecord) -> LedgerResult<()> {
        if let Some(journal) = &self.journal {
            journal.append(record)?;
            self.records_since_checkpoint += 1;
        }
        Ok(())
    }

    fn maybe_checkpoint(&mut self, every: u64) -> LedgerResult<()> {
        if let Some(journal) = &self.journal {
            if self.records_since_checkpoint >= every {
                journal.checkpoint(self.next_entry_id, self.entries.values().cloned().collect())?;
                self.records_since_checkpoint = 0;
            }
        }
        Ok(())
    }
}

/// The append-only record of local mutations awaiting remote confirmation.
///
/// All operations serialize on one internal lock: a UI-triggered append and
/// a coordinator-triggered compaction may race, and both must observe a
/// consistent ledger. Entries are exclusively owned by the sync coordinator;
/// nothing else reads them.
pub struct ChangeLedger {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl ChangeLedger {
    /// Opens a durable ledger rooted at `dir`, replaying any journal found.
    pub fn open(
        dir: &Path,
        config: LedgerConfig,
        clock: Arc<dyn Clock>,
    ) -> LedgerResult<Self> {
        let (journal, records) = Journal::open(dir)?;

        let mut entries = BTreeMap::new();
        let mut by_entity = HashMap::new();
        let mut next_entry_id: EntryId = 1;

        for record in records {
            match record {
                JournalRecord::Append(entry) | JournalRecord::Replace(entry) => {
                    next_entry_id = next_entry_id.max(entry.entry_id + 1);
                    by_entity.insert((entry.kind(), entry.entity_id()), entry.entry_id);
                    entries.insert(entry.entry_id, entry);
                }
                JournalRecord::Confirm(ids) => {
                    for id in ids {
                        if let Some(entry) = entries.remove(&id) {
                            by_entity.remove(&(entry.kind(), entry.entity_id()));
                        }
                    }
                }
                JournalRecord::Attempt {
                    entry_id,
                    attempt_count,
                    last_attempt_at,
                    stuck,
                } => {
                    if let Some(entry) = entries.get_mut(&entry_id) {
                        entry.attempt_count = attempt_count;
                        entry.last_attempt_at = last_attempt_at;
                        entry.stuck = stuck;
                    }
                }
                JournalRecord::Checkpoint {
                    next_entry_id: next,
                    entries: live,
                } => {
                    entries.clear();
                    by_entity.clear();
                    next_entry_id = next;
                    for entry in live {
                        by_entity.insert((entry.kind(), entry.entity_id()), entry.entry_id);
                        entries.insert(entry.entry_id, entry);
                    }
                }
            }
        }

        debug!(pending = entries.len(), "ledger opened");

        Ok(Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                entries,
                by_entity,
                next_entry_id,
                journal: Some(journal),
                records_since_checkpoint: 0,
            }),
        })
    }

    /// Creates a ledger with no backing journal, for tests.
    #[must_use]
    pub fn in_memory(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                by_entity: HashMap::new(),
                next_entry_id: 1,
                journal: None,
                records_since_checkpoint: 0,
            }),
        }
    }

    /// Appends a mutation, compacting against any live entry for the same id.
    ///
    /// Compaction rules:
    /// - a later update replaces an earlier entry's payload but keeps the
    ///   earliest `created_at`, and a pending create stays a create
    /// - a delete collapses every prior entry for the id into one delete
    /// - a create or update after a local delete is rejected with
    ///   [`LedgerError::TombstonedEntity`]
    ///
    /// Superseding resets the entry's retry state: an edited payload is a
    /// new mutation with a fresh attempt budget.
    pub fn append(&self, op: LedgerOp, record: EntityRecord) -> LedgerResult<EntryId> {
        let mut inner = self.inner.lock();
        let key = (record.kind(), record.id);

        let existing_id = inner.by_entity.get(&key).copied();
        if let Some(existing_id) = existing_id {
            let (existing_op, created_at) = match inner.entries.get(&existing_id) {
                Some(existing) => (existing.op, existing.created_at),
                None => return Err(LedgerError::corruption("entity index out of sync")),
            };

            if existing_op == LedgerOp::Delete && op != LedgerOp::Delete {
                return Err(LedgerError::TombstonedEntity {
                    kind: key.0,
                    id: key.1,
                });
            }

            let merged_op = match (existing_op, op) {
                (_, LedgerOp::Delete) => LedgerOp::Delete,
                (LedgerOp::Create, _) => LedgerOp::Create,
                _ => LedgerOp::Update,
            };

            let entry = LedgerEntry::new(existing_id, merged_op, record, created_at);
            inner.journal_append(&JournalRecord::Replace(entry.clone()))?;
            inner.entries.insert(existing_id, entry);

            debug!(entry_id = existing_id, op = %merged_op, "ledger entry superseded");
            Ok(existing_id)
        } else {
            let entry_id = inner.next_entry_id;
            let entry = LedgerEntry::new(entry_id, op, record, self.clock.now());
            inner.journal_append(&JournalRecord::Append(entry.clone()))?;
            inner.next_entry_id += 1;
            inner.by_entity.insert(key, entry_id);
            inner.entries.insert(entry_id, entry);

            debug!(entry_id, op = %op, "ledger entry appended");
            Ok(entry_id)
        }
    }

    /// Returns the oldest-first batch of entries ready to push.
    ///
    /// Excludes stuck entries and entries still inside their backoff window.
    /// Ordering preserves within-entity causality; across entities it is
    /// fairness only.
    #[must_use]
    pub fn list_pending(&self, limit: usize) -> Vec<LedgerEntry> {
        let now = self.clock.now();
        let inner = self.inner.lock();

        let mut pending: Vec<LedgerEntry> = inner
            .entries
            .values()
            .filter(|entry| !entry.stuck && self.config.is_eligible(entry, now))
            .cloned()
            .collect();
        pending.sort_by_key(|entry| (entry.created_at, entry.entry_id));
        pending.truncate(limit);
        pending
    }

    /// Atomically removes entries whose push the remote acknowledged.
    ///
    /// Each confirmation carries the `updated_at` that was pushed. An entry
    /// superseded after its push (a caller appended while the pass was in
    /// flight) no longer matches and is kept: only the exact mutation the
    /// remote confirmed is ever removed.
    pub fn mark_confirmed(&self, confirmations: &[(EntryId, Timestamp)]) -> LedgerResult<()> {
        if confirmations.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();

        let removable: Vec<EntryId> = confirmations
            .iter()
            .filter(|(id, pushed_at)| {
                inner
                    .entries
                    .get(id)
                    .is_some_and(|entry| entry.record.updated_at == *pushed_at)
            })
            .map(|(id, _)| *id)
            .collect();
        if removable.is_empty() {
            return Ok(());
        }

        inner.journal_append(&JournalRecord::Confirm(removable.clone()))?;
        for id in &removable {
            if let Some(entry) = inner.entries.remove(id) {
                inner.by_entity.remove(&(entry.kind(), entry.entity_id()));
            }
        }
        inner.maybe_checkpoint(self.config.checkpoint_every)?;

        debug!(confirmed = removable.len(), "ledger entries confirmed");
        Ok(())
    }

    /// Records a failed push attempt; returns true if the entry is now stuck.
    pub fn increment_attempt(&self, entry_id: EntryId) -> LedgerResult<bool> {
        let now = self.clock.now();
        let retry_ceiling = self.config.retry_ceiling;
        let mut inner = self.inner.lock();

        let entry = inner
            .entries
            .get(&entry_id)
            .ok_or(LedgerError::UnknownEntry { entry_id })?;

        let attempt_count = entry.attempt_count + 1;
        let stuck = attempt_count >= retry_ceiling;
        inner.journal_append(&JournalRecord::Attempt {
            entry_id,
            attempt_count,
            last_attempt_at: Some(now),
            stuck,
        })?;

        // Re-borrow mutably after the journal write.
        if let Some(entry) = inner.entries.get_mut(&entry_id) {
            entry.attempt_count = attempt_count;
            entry.last_attempt_at = Some(now);
            entry.stuck = stuck;
        }

        if stuck {
            warn!(entry_id, attempt_count, "ledger entry exceeded retry ceiling");
        }
        Ok(stuck)
    }

    /// Excludes an entry from automatic retry (e.g. the remote rejected it).
    pub fn mark_stuck(&self, entry_id: EntryId) -> LedgerResult<()> {
        let mut inner = self.inner.lock();

        let entry = inner
            .entries
            .get(&entry_id)
            .ok_or(LedgerError::UnknownEntry { entry_id })?;

        let (attempt_count, last_attempt_at) = (entry.attempt_count, entry.last_attempt_at);
        inner.journal_append(&JournalRecord::Attempt {
            entry_id,
            attempt_count,
            last_attempt_at,
            stuck: true,
        })?;

        if let Some(entry) = inner.entries.get_mut(&entry_id) {
            entry.stuck = true;
        }
        warn!(entry_id, "ledger entry marked stuck");
        Ok(())
    }

    /// Number of entries awaiting push, excluding stuck ones.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|entry| !entry.stuck)
            .count()
    }

    /// Number of entries excluded from automatic retry.
    #[must_use]
    pub fn stuck_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|entry| entry.stuck)
            .count()
    }

    /// Total live entries, stuck included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if no entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitlog_core::{EntityPayload, ManualClock, WorkoutPayload, WorkoutSet};

    fn workout(id: Uuid, updated_at: u64, title: &str) -> EntityRecord {
        EntityRecord::new(
            id,
            Timestamp::from_millis(updated_at),
            EntityPayload::Workout(WorkoutPayload {
                title: title.into(),
                started_at: Timestamp::from_millis(updated_at),
                duration_secs: 2700,
                sets: vec![WorkoutSet {
                    exercise: "squat".into(),
                    weight_kg: 100.0,
                    reps: 5,
                }],
                notes: None,
            }),
        )
    }

    fn test_ledger() -> (ChangeLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let ledger = ChangeLedger::in_memory(LedgerConfig::default(), clock.clone());
        (ledger, clock)
    }

    #[test]
    fn append_assigns_sequential_ids() {
        let (ledger, _) = test_ledger();

        let a = ledger
            .append(LedgerOp::Create, workout(Uuid::new_v4(), 10, "a"))
            .unwrap();
        let b = ledger
            .append(LedgerOp::Create, workout(Uuid::new_v4(), 20, "b"))
            .unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(ledger.pending_count(), 2);
    }

    #[test]
    fn update_supersedes_update_keeping_earliest_created_at() {
        let (ledger, clock) = test_ledger();
        let id = Uuid::new_v4();

        ledger.append(LedgerOp::Update, workout(id, 10, "v1")).unwrap();
        clock.advance(500);
        let second = ledger.append(LedgerOp::Update, workout(id, 20, "v2")).unwrap();

        assert_eq!(ledger.len(), 1);
        let pending = ledger.list_pending(10);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry_id, second);
        assert_eq!(pending[0].created_at, Timestamp::from_millis(1_000));
        assert_eq!(pending[0].record.updated_at, Timestamp::from_millis(20));
    }

    #[test]
    fn create_then_update_stays_a_create() {
        let (ledger, _) = test_ledger();
        let id = Uuid::new_v4();

        ledger.append(LedgerOp::Create, workout(id, 10, "v1")).unwrap();
        ledger.append(LedgerOp::Update, workout(id, 20, "v2")).unwrap();

        let pending = ledger.list_pending(10);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op, LedgerOp::Create);
    }

    #[test]
    fn delete_collapses_prior_entries() {
        let (ledger, _) = test_ledger();
        let id = Uuid::new_v4();

        ledger.append(LedgerOp::Update, workout(id, 10, "a")).unwrap();
        ledger.append(LedgerOp::Update, workout(id, 20, "b")).unwrap();
        ledger
            .append(LedgerOp::Delete, workout(id, 30, "b").into_tombstone(Timestamp::from_millis(30)))
            .unwrap();

        assert_eq!(ledger.len(), 1);
        let pending = ledger.list_pending(10);
        assert_eq!(pending[0].op, LedgerOp::Delete);
        assert!(pending[0].record.deleted);
    }

    #[test]
    fn update_after_delete_is_rejected() {
        let (ledger, _) = test_ledger();
        let id = Uuid::new_v4();

        ledger
            .append(LedgerOp::Delete, workout(id, 10, "a").into_tombstone(Timestamp::from_millis(10)))
            .unwrap();

        let err = ledger.append(LedgerOp::Update, workout(id, 20, "b")).unwrap_err();
        assert!(matches!(err, LedgerError::TombstonedEntity { .. }));

        let err = ledger.append(LedgerOp::Create, workout(id, 30, "c")).unwrap_err();
        assert!(matches!(err, LedgerError::TombstonedEntity { .. }));

        // The tombstone itself is untouched.
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn supersede_resets_retry_state() {
        let (ledger, _) = test_ledger();
        let id = Uuid::new_v4();

        let entry_id = ledger.append(LedgerOp::Update, workout(id, 10, "a")).unwrap();
        ledger.increment_attempt(entry_id).unwrap();
        ledger.mark_stuck(entry_id).unwrap();
        assert_eq!(ledger.stuck_count(), 1);

        ledger.append(LedgerOp::Update, workout(id, 20, "b")).unwrap();
        assert_eq!(ledger.stuck_count(), 0);
        let pending = ledger.list_pending(10);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempt_count, 0);
    }

    #[test]
    fn list_pending_is_oldest_first_and_bounded() {
        let (ledger, clock) = test_ledger();

        for i in 0..5 {
            clock.advance(10);
            ledger
                .append(LedgerOp::Create, workout(Uuid::new_v4(), i, "w"))
                .unwrap();
        }

        let batch = ledger.list_pending(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].entry_id, 1);
        assert_eq!(batch[2].entry_id, 3);
    }

    #[test]
    fn backoff_hides_entry_until_window_elapses() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let config = LedgerConfig::default().with_backoff_base(Duration::from_millis(100));
        let ledger = ChangeLedger::in_memory(config, clock.clone());

        let entry_id = ledger
            .append(LedgerOp::Create, workout(Uuid::new_v4(), 10, "w"))
            .unwrap();
        ledger.increment_attempt(entry_id).unwrap();

        assert!(ledger.list_pending(10).is_empty());

        clock.advance(99);
        assert!(ledger.list_pending(10).is_empty());

        clock.advance(1);
        assert_eq!(ledger.list_pending(10).len(), 1);
    }

    #[test]
    fn backoff_grows_exponentially() {
        let config = LedgerConfig::default()
            .with_backoff_base(Duration::from_millis(100))
            .with_backoff_max(Duration::from_millis(350));

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(350));
    }

    #[test]
    fn retry_ceiling_marks_stuck() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let config = LedgerConfig::default()
            .with_retry_ceiling(2)
            .with_backoff_base(Duration::from_millis(1));
        let ledger = ChangeLedger::in_memory(config, clock.clone());

        let entry_id = ledger
            .append(LedgerOp::Create, workout(Uuid::new_v4(), 10, "w"))
            .unwrap();

        assert!(!ledger.increment_attempt(entry_id).unwrap());
        clock.advance(1_000);
        assert!(ledger.increment_attempt(entry_id).unwrap());

        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(ledger.stuck_count(), 1);
        clock.advance(100_000);
        assert!(ledger.list_pending(10).is_empty());
    }

    #[test]
    fn mark_confirmed_removes_entries() {
        let (ledger, _) = test_ledger();
        let keep = Uuid::new_v4();

        let a = ledger.append(LedgerOp::Create, workout(Uuid::new_v4(), 10, "a")).unwrap();
        let b = ledger.append(LedgerOp::Create, workout(keep, 20, "b")).unwrap();

        ledger
            .mark_confirmed(&[(a, Timestamp::from_millis(10)), (999, Timestamp::ZERO)])
            .unwrap();

        assert_eq!(ledger.pending_count(), 1);
        assert_eq!(ledger.list_pending(10)[0].entry_id, b);

        // A new mutation for a confirmed entity starts a fresh entry.
        ledger
            .mark_confirmed(&[(b, Timestamp::from_millis(20))])
            .unwrap();
        let c = ledger.append(LedgerOp::Update, workout(keep, 30, "b2")).unwrap();
        assert_eq!(c, 3);
        assert_eq!(ledger.pending_count(), 1);
    }

    #[test]
    fn confirmation_skips_entries_superseded_after_push() {
        let (ledger, _) = test_ledger();
        let id = Uuid::new_v4();

        let entry_id = ledger.append(LedgerOp::Update, workout(id, 10, "v1")).unwrap();

        // A caller edits while the push is in flight.
        ledger.append(LedgerOp::Update, workout(id, 20, "v2")).unwrap();

        ledger
            .mark_confirmed(&[(entry_id, Timestamp::from_millis(10))])
            .unwrap();

        // The superseded mutation is still pending.
        assert_eq!(ledger.pending_count(), 1);
        assert_eq!(
            ledger.list_pending(10)[0].record.updated_at,
            Timestamp::from_millis(20)
        );
    }

    #[test]
    fn unknown_entry_errors() {
        let (ledger, _) = test_ledger();
        assert!(matches!(
            ledger.increment_attempt(42),
            Err(LedgerError::UnknownEntry { entry_id: 42 })
        ));
        assert!(matches!(
            ledger.mark_stuck(42),
            Err(LedgerError::UnknownEntry { entry_id: 42 })
        ));
    }

    #[test]
    fn durable_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let id = Uuid::new_v4();

        {
            let ledger =
                ChangeLedger::open(dir.path(), LedgerConfig::default(), clock.clone()).unwrap();
            ledger.append(LedgerOp::Create, workout(id, 10, "a")).unwrap();
            ledger.append(LedgerOp::Update, workout(id, 20, "b")).unwrap();
            let other = ledger
                .append(LedgerOp::Create, workout(Uuid::new_v4(), 30, "c"))
                .unwrap();
            ledger.increment_attempt(other).unwrap();
        }

        let ledger = ChangeLedger::open(dir.path(), LedgerConfig::default(), clock).unwrap();
        assert_eq!(ledger.len(), 2);

        let pending = ledger.list_pending(10);
        let compacted = pending.iter().find(|e| e.entity_id() == id).unwrap();
        assert_eq!(compacted.op, LedgerOp::Create);
        assert_eq!(compacted.record.updated_at, Timestamp::from_millis(20));
    }

    #[test]
    fn confirmation_survives_reopen_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let config = LedgerConfig::default().with_checkpoint_every(2);

        {
            let ledger = ChangeLedger::open(dir.path(), config.clone(), clock.clone()).unwrap();
            let a = ledger
                .append(LedgerOp::Create, workout(Uuid::new_v4(), 10, "a"))
                .unwrap();
            ledger
                .append(LedgerOp::Create, workout(Uuid::new_v4(), 20, "b"))
                .unwrap();
            ledger
                .mark_confirmed(&[(a, Timestamp::from_millis(10))])
                .unwrap();
        }

        let ledger = ChangeLedger::open(dir.path(), config, clock).unwrap();
        assert_eq!(ledger.len(), 1);

        // Fresh appends continue after the replayed id space.
        let next = ledger
            .append(LedgerOp::Create, workout(Uuid::new_v4(), 30, "c"))
            .unwrap();
        assert_eq!(next, 3);
    }
}
