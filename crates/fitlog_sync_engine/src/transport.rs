//! Remote transport abstraction.

use crate::error::{SyncError, SyncResult};
use fitlog_core::{EntityKind, EntityRecord, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Remote acknowledgment of an applied mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// The entity id the mutation targeted.
    pub id: Uuid,
    /// The `updated_at` the remote now holds for the id.
    pub updated_at: Timestamp,
}

/// One page of a "changed since" query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangePage {
    /// Records changed since the requested watermark.
    pub records: Vec<EntityRecord>,
    /// Continuation token, if more pages remain.
    pub next_page_token: Option<String>,
}

impl ChangePage {
    /// Creates a page with no continuation.
    #[must_use]
    pub fn last(records: Vec<EntityRecord>) -> Self {
        Self {
            records,
            next_page_token: None,
        }
    }

    /// Creates a page continued by `token`.
    #[must_use]
    pub fn continued(records: Vec<EntityRecord>, token: impl Into<String>) -> Self {
        Self {
            records,
            next_page_token: Some(token.into()),
        }
    }
}

/// Supplies the bearer credential for remote calls.
///
/// Session management is external; the engine only asks for the current
/// token immediately before each call.
pub trait TokenProvider: Send + Sync {
    /// Returns the current bearer token.
    fn bearer_token(&self) -> SyncResult<String>;
}

/// A fixed token, for tests and long-lived API keys.
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    /// Creates a provider that always returns `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> SyncResult<String> {
        Ok(self.0.clone())
    }
}

/// The backend API consumed by the sync coordinator.
///
/// All calls must be idempotent keyed by `(id, updated_at)`: re-sending an
/// already-applied mutation (for example after a crash before ledger
/// compaction) acknowledges as a no-op, never an error.
pub trait RemoteTransport: Send + Sync {
    /// Inserts or replaces a record remotely.
    fn upsert(&self, kind: EntityKind, record: &EntityRecord) -> SyncResult<Ack>;

    /// Deletes a record remotely; `updated_at` stamps the remote tombstone.
    fn delete(&self, kind: EntityKind, id: Uuid, updated_at: Timestamp) -> SyncResult<Ack>;

    /// Returns records of `kind` changed strictly after `since`.
    fn fetch_changed_since(
        &self,
        kind: EntityKind,
        since: Timestamp,
        page_token: Option<&str>,
    ) -> SyncResult<ChangePage>;
}

/// Failure a [`MockTransport`] can be scripted to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Transient network failure.
    Unreachable,
    /// Call timeout.
    Timeout,
    /// Expired credential.
    AuthExpired,
    /// The remote refuses the record.
    ValidationRejected,
}

impl ScriptedFailure {
    fn into_error(self, kind: EntityKind, id: Uuid) -> SyncError {
        match self {
            ScriptedFailure::Unreachable => SyncError::unreachable("scripted failure"),
            ScriptedFailure::Timeout => SyncError::Timeout,
            ScriptedFailure::AuthExpired => SyncError::AuthExpired,
            ScriptedFailure::ValidationRejected => SyncError::RemoteValidationRejected {
                kind,
                id,
                message: "scripted rejection".into(),
            },
        }
    }
}

#[derive(Default)]
struct MockState {
    upserts: Vec<(EntityKind, EntityRecord)>,
    deletes: Vec<(EntityKind, Uuid, Timestamp)>,
    fetches: Vec<(EntityKind, Timestamp)>,
    pull_pages: HashMap<EntityKind, VecDeque<ChangePage>>,
    push_failure: Option<ScriptedFailure>,
    push_failures_by_id: HashMap<Uuid, ScriptedFailure>,
    fetch_failure: Option<ScriptedFailure>,
}

/// A mock transport for unit tests.
///
/// Records every call and serves scripted pull pages and failures. Pages are
/// consumed in order per kind; once exhausted, fetches return an empty page.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a pull page for `kind`.
    pub fn push_pull_page(&self, kind: EntityKind, page: ChangePage) {
        self.state
            .lock()
            .pull_pages
            .entry(kind)
            .or_default()
            .push_back(page);
    }

    /// Makes every push call fail with `failure`.
    pub fn fail_pushes(&self, failure: ScriptedFailure) {
        self.state.lock().push_failure = Some(failure);
    }

    /// Makes push calls for `id` fail with `failure`.
    pub fn fail_pushes_for(&self, id: Uuid, failure: ScriptedFailure) {
        self.state.lock().push_failures_by_id.insert(id, failure);
    }

    /// Clears scripted push failures.
    pub fn clear_push_failures(&self) {
        let mut state = self.state.lock();
        state.push_failure = None;
        state.push_failures_by_id.clear();
    }

    /// Makes every fetch call fail with `failure`.
    pub fn fail_fetches(&self, failure: ScriptedFailure) {
        self.state.lock().fetch_failure = Some(failure);
    }

    /// Returns all recorded upsert calls.
    #[must_use]
    pub fn upsert_calls(&self) -> Vec<(EntityKind, EntityRecord)> {
        self.state.lock().upserts.clone()
    }

    /// Returns all recorded delete calls.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<(EntityKind, Uuid, Timestamp)> {
        self.state.lock().deletes.clone()
    }

    /// Returns all recorded fetch calls.
    #[must_use]
    pub fn fetch_calls(&self) -> Vec<(EntityKind, Timestamp)> {
        self.state.lock().fetches.clone()
    }

    fn push_failure_for(&self, id: Uuid) -> Option<ScriptedFailure> {
        let state = self.state.lock();
        state
            .push_failures_by_id
            .get(&id)
            .copied()
            .or(state.push_failure)
    }
}

impl RemoteTransport for MockTransport {
    fn upsert(&self, kind: EntityKind, record: &EntityRecord) -> SyncResult<Ack> {
        if let Some(failure) = self.push_failure_for(record.id) {
            return Err(failure.into_error(kind, record.id));
        }
        let mut state = self.state.lock();
        state.upserts.push((kind, record.clone()));
        Ok(Ack {
            id: record.id,
            updated_at: record.updated_at,
        })
    }

    fn delete(&self, kind: EntityKind, id: Uuid, updated_at: Timestamp) -> SyncResult<Ack> {
        if let Some(failure) = self.push_failure_for(id) {
            return Err(failure.into_error(kind, id));
        }
        let mut state = self.state.lock();
        state.deletes.push((kind, id, updated_at));
        Ok(Ack { id, updated_at })
    }

    fn fetch_changed_since(
        &self,
        kind: EntityKind,
        since: Timestamp,
        _page_token: Option<&str>,
    ) -> SyncResult<ChangePage> {
        let mut state = self.state.lock();
        if let Some(failure) = state.fetch_failure {
            return Err(failure.into_error(kind, Uuid::nil()));
        }
        state.fetches.push((kind, since));
        Ok(state
            .pull_pages
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }
}
