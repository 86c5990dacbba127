//! Error types for Fitlog core.

use crate::entity::EntityKind;
use thiserror::Error;
use uuid::Uuid;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The store backend failed.
    #[error("store backend error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },

    /// A record's payload kind does not match the collection it was written to.
    #[error("payload kind {actual} does not match collection {expected}")]
    KindMismatch {
        /// The collection the caller named.
        expected: EntityKind,
        /// The kind the payload actually carries.
        actual: EntityKind,
    },

    /// The record does not exist.
    #[error("record not found: {id} in {kind}")]
    NotFound {
        /// The collection searched.
        kind: EntityKind,
        /// The missing id.
        id: Uuid,
    },
}

impl CoreError {
    /// Creates a store backend error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}
