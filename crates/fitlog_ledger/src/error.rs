//! Error types for the change ledger.

use fitlog_core::EntityKind;
use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The journal on disk is corrupted or unreadable.
    #[error("ledger corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// I/O error while reading or writing the journal.
    #[error("ledger I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the ledger directory lock.
    #[error("ledger locked: another process has exclusive access")]
    Locked,

    /// A mutation targeted an id that is already tombstoned locally.
    ///
    /// Rejected synchronously at append time so the caller can decide to
    /// ignore or warn; a locally-deleted record is never resurrected by a
    /// later local write.
    #[error("entity {id} in {kind} is tombstoned; mutation rejected")]
    TombstonedEntity {
        /// The entity's kind.
        kind: EntityKind,
        /// The tombstoned id.
        id: Uuid,
    },

    /// The referenced ledger entry does not exist.
    #[error("unknown ledger entry: {entry_id}")]
    UnknownEntry {
        /// The missing entry id.
        entry_id: u64,
    },
}

impl LedgerError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LedgerError::corruption("bad frame at offset 12");
        assert!(err.to_string().contains("bad frame"));

        let err = LedgerError::TombstonedEntity {
            kind: EntityKind::Meal,
            id: Uuid::nil(),
        };
        assert!(err.to_string().contains("tombstoned"));
    }
}
