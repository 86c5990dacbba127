//! Error types for the sync engine.

use fitlog_core::{CoreError, EntityKind};
use fitlog_ledger::LedgerError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote could not be reached; transient, retried next pass.
    #[error("transport unreachable: {message}")]
    TransportUnreachable {
        /// Error message.
        message: String,
    },

    /// A transport call exceeded its timeout; counts as a per-entry failure.
    #[error("transport call timed out")]
    Timeout,

    /// The bearer credential expired; the whole pass aborts.
    #[error("authorization expired")]
    AuthExpired,

    /// The remote refused a specific record; the entry is marked stuck.
    #[error("remote rejected {id} in {kind}: {message}")]
    RemoteValidationRejected {
        /// The record's kind.
        kind: EntityKind,
        /// The rejected id.
        id: Uuid,
        /// Remote-provided reason.
        message: String,
    },

    /// A mutation targeted a locally-tombstoned id; rejected at append time.
    #[error("conflict policy violation: {id} in {kind} is tombstoned")]
    ConflictPolicyViolation {
        /// The entity's kind.
        kind: EntityKind,
        /// The tombstoned id.
        id: Uuid,
    },

    /// The local ledger failed; the pass aborts and the next pass retries.
    #[error("ledger corruption: {message}")]
    LedgerCorruption {
        /// Description of the failure.
        message: String,
    },

    /// The local store failed; the pass aborts.
    #[error("local store error: {0}")]
    Store(#[from] CoreError),

    /// The engine is offline; no sync attempt was made (or the pass aborted
    /// at a phase boundary after connectivity dropped).
    #[error("offline")]
    Offline,

    /// A malformed response from the remote.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `full_sync` was invoked for a user this engine is not scoped to.
    #[error("sync requested for user {requested} but engine is scoped to {configured}")]
    UserScopeMismatch {
        /// The id the caller passed.
        requested: Uuid,
        /// The id the engine was constructed with.
        configured: Uuid,
    },
}

impl SyncError {
    /// Creates a transport-unreachable error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::TransportUnreachable {
            message: message.into(),
        }
    }

    /// Returns true if this failure is scoped to a single entry or page.
    ///
    /// Entry-scoped failures never abort a pass; the entry's attempt count
    /// is incremented (or the entry is marked stuck) and the pass continues.
    #[must_use]
    pub fn is_entry_scoped(&self) -> bool {
        matches!(
            self,
            SyncError::TransportUnreachable { .. }
                | SyncError::Timeout
                | SyncError::RemoteValidationRejected { .. }
                | SyncError::Protocol(_)
        )
    }

    /// Returns true if this failure aborts the whole pass.
    #[must_use]
    pub fn is_pass_fatal(&self) -> bool {
        !self.is_entry_scoped()
    }
}

impl From<LedgerError> for SyncError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::TombstonedEntity { kind, id } => {
                SyncError::ConflictPolicyViolation { kind, id }
            }
            other => SyncError::LedgerCorruption {
                message: other.to_string(),
            },
        }
    }
}
