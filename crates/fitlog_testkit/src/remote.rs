//! An in-memory remote backend for integration tests.

use fitlog_core::{EntityKind, EntityRecord, Timestamp};
use fitlog_sync_engine::{Ack, ChangePage, RemoteTransport, SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
struct RemoteState {
    records: BTreeMap<(EntityKind, Uuid), EntityRecord>,
    upsert_log: Vec<(EntityKind, EntityRecord)>,
    delete_log: Vec<(EntityKind, Uuid, Timestamp)>,
    fetch_log: Vec<(EntityKind, Timestamp)>,
    noop_acks: usize,
    unreachable: bool,
    auth_expired: bool,
    fetch_unreachable: bool,
    fetch_auth_expired: bool,
    reject_ids: HashSet<Uuid>,
    call_delay: Option<std::time::Duration>,
}

/// A fake backend driven through the real [`RemoteTransport`] trait.
///
/// Mutations are idempotent keyed by `(id, updated_at)`: re-sending an
/// already-applied mutation acknowledges as a no-op and is counted in
/// [`InMemoryRemote::noop_ack_count`], which crash-recovery tests use to
/// prove a re-sent push did not change remote state. Fault injection covers
/// unreachability, expired credentials, and per-id validation rejections.
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    page_size: usize,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    /// Creates an empty remote with a large page size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            page_size: 100,
        }
    }

    /// Creates a remote that paginates changed-since results by `page_size`.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            page_size: page_size.max(1),
        }
    }

    /// Inserts a record directly, bypassing the transport log.
    pub fn seed(&self, record: EntityRecord) {
        let mut state = self.state.lock();
        state.records.insert((record.kind(), record.id), record);
    }

    /// Returns the stored record for `id`, tombstones included.
    #[must_use]
    pub fn record(&self, kind: EntityKind, id: Uuid) -> Option<EntityRecord> {
        self.state.lock().records.get(&(kind, id)).cloned()
    }

    /// Returns every stored record of `kind`.
    #[must_use]
    pub fn records(&self, kind: EntityKind) -> Vec<EntityRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// All upsert calls received, in order.
    #[must_use]
    pub fn upsert_log(&self) -> Vec<(EntityKind, EntityRecord)> {
        self.state.lock().upsert_log.clone()
    }

    /// All delete calls received, in order.
    #[must_use]
    pub fn delete_log(&self) -> Vec<(EntityKind, Uuid, Timestamp)> {
        self.state.lock().delete_log.clone()
    }

    /// All changed-since calls received, in order.
    #[must_use]
    pub fn fetch_log(&self) -> Vec<(EntityKind, Timestamp)> {
        self.state.lock().fetch_log.clone()
    }

    /// Mutations acknowledged as no-ops because `(id, updated_at)` matched.
    #[must_use]
    pub fn noop_ack_count(&self) -> usize {
        self.state.lock().noop_acks
    }

    /// Makes every call fail as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Makes every call fail with an expired credential.
    pub fn set_auth_expired(&self, expired: bool) {
        self.state.lock().auth_expired = expired;
    }

    /// Makes only changed-since calls fail as unreachable.
    pub fn set_fetch_unreachable(&self, unreachable: bool) {
        self.state.lock().fetch_unreachable = unreachable;
    }

    /// Makes only changed-since calls fail with an expired credential.
    ///
    /// Lets tests run a pass whose pushes succeed but which aborts before
    /// ledger compaction, the shape of a crash between push and confirm.
    pub fn set_fetch_auth_expired(&self, expired: bool) {
        self.state.lock().fetch_auth_expired = expired;
    }

    /// Rejects future mutations of `id` with a validation error.
    pub fn reject(&self, id: Uuid) {
        self.state.lock().reject_ids.insert(id);
    }

    /// Sleeps every call by `delay`, for concurrency tests.
    pub fn set_call_delay(&self, delay: std::time::Duration) {
        self.state.lock().call_delay = Some(delay);
    }

    fn apply_delay(&self) {
        let delay = self.state.lock().call_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
    }

    fn check_faults(state: &RemoteState, kind: EntityKind, id: Uuid) -> SyncResult<()> {
        if state.unreachable {
            return Err(SyncError::unreachable("remote unreachable (injected)"));
        }
        if state.auth_expired {
            return Err(SyncError::AuthExpired);
        }
        if state.reject_ids.contains(&id) {
            return Err(SyncError::RemoteValidationRejected {
                kind,
                id,
                message: "rejected (injected)".into(),
            });
        }
        Ok(())
    }
}

impl RemoteTransport for InMemoryRemote {
    fn upsert(&self, kind: EntityKind, record: &EntityRecord) -> SyncResult<Ack> {
        self.apply_delay();
        let mut state = self.state.lock();
        Self::check_faults(&state, kind, record.id)?;

        state.upsert_log.push((kind, record.clone()));

        let key = (kind, record.id);
        let noop = state
            .records
            .get(&key)
            .is_some_and(|existing| existing.updated_at == record.updated_at);
        if noop {
            state.noop_acks += 1;
        } else {
            state.records.insert(key, record.clone());
        }

        Ok(Ack {
            id: record.id,
            updated_at: record.updated_at,
        })
    }

    fn delete(&self, kind: EntityKind, id: Uuid, updated_at: Timestamp) -> SyncResult<Ack> {
        self.apply_delay();
        let mut state = self.state.lock();
        Self::check_faults(&state, kind, id)?;

        state.delete_log.push((kind, id, updated_at));

        let key = (kind, id);
        let existing = state.records.get(&key).cloned();
        match existing {
            Some(existing) if existing.deleted && existing.updated_at == updated_at => {
                state.noop_acks += 1;
            }
            Some(existing) => {
                state
                    .records
                    .insert(key, existing.into_tombstone(updated_at));
            }
            None => {
                // Deleting an id the remote never saw is an idempotent no-op
                // (a locally compacted create+delete lands here).
                state.noop_acks += 1;
            }
        }

        Ok(Ack { id, updated_at })
    }

    fn fetch_changed_since(
        &self,
        kind: EntityKind,
        since: Timestamp,
        page_token: Option<&str>,
    ) -> SyncResult<ChangePage> {
        self.apply_delay();
        let mut state = self.state.lock();
        Self::check_faults(&state, kind, Uuid::nil())?;
        if state.fetch_unreachable {
            return Err(SyncError::unreachable("remote unreachable (injected)"));
        }
        if state.fetch_auth_expired {
            return Err(SyncError::AuthExpired);
        }

        state.fetch_log.push((kind, since));

        let mut changed: Vec<EntityRecord> = state
            .records
            .iter()
            .filter(|((k, _), record)| *k == kind && record.updated_at > since)
            .map(|(_, record)| record.clone())
            .collect();
        changed.sort_by_key(|record| (record.updated_at, record.id));

        let offset: usize = page_token
            .map(str::parse)
            .transpose()
            .map_err(|_| SyncError::Protocol("bad page token".into()))?
            .unwrap_or(0);

        let page: Vec<EntityRecord> = changed
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        let next_offset = offset + page.len();
        let next_page_token = if next_offset < changed.len() {
            Some(next_offset.to_string())
        } else {
            None
        };

        Ok(ChangePage {
            records: page,
            next_page_token,
        })
    }
}
