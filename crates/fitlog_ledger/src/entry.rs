//! Ledger entry types.

use fitlog_core::{EntityKind, EntityRecord, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monotonically-assigned ledger entry identifier.
pub type EntryId = u64;

/// The kind of local mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOp {
    /// The entity was created locally and the remote has never seen it.
    Create,
    /// The entity was updated locally.
    Update,
    /// The entity was soft-deleted locally.
    Delete,
}

impl LedgerOp {
    /// Returns the stable wire name for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LedgerOp::Create => "create",
            LedgerOp::Update => "update",
            LedgerOp::Delete => "delete",
        }
    }
}

impl std::fmt::Display for LedgerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uncompacted local mutation.
///
/// One row per mutation, not per entity; compaction keeps at most one live
/// entry per `(kind, entity id)`. The `record` field is the payload snapshot
/// pushed to the remote; for deletes it is the tombstoned record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Ledger-assigned identifier.
    pub entry_id: EntryId,
    /// The mutation kind.
    pub op: LedgerOp,
    /// Snapshot of the record as it should reach the remote.
    pub record: EntityRecord,
    /// When the earliest superseded mutation for this id was appended.
    pub created_at: Timestamp,
    /// Failed push attempts so far.
    pub attempt_count: u32,
    /// When the last push attempt failed, if any.
    pub last_attempt_at: Option<Timestamp>,
    /// Excluded from automatic retry; surfaced via `stuck_count`.
    pub stuck: bool,
}

impl LedgerEntry {
    /// Creates a fresh entry for a new mutation.
    #[must_use]
    pub fn new(entry_id: EntryId, op: LedgerOp, record: EntityRecord, created_at: Timestamp) -> Self {
        Self {
            entry_id,
            op,
            record,
            created_at,
            attempt_count: 0,
            last_attempt_at: None,
            stuck: false,
        }
    }

    /// The entity kind this entry targets.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.record.kind()
    }

    /// The entity id this entry targets.
    #[must_use]
    pub fn entity_id(&self) -> Uuid {
        self.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitlog_core::{EntityPayload, ProfilePayload};

    #[test]
    fn entry_accessors() {
        let record = EntityRecord::new(
            Uuid::new_v4(),
            Timestamp::from_millis(10),
            EntityPayload::Profile(ProfilePayload {
                display_name: "sam".into(),
                height_cm: None,
                body_weight_kg: None,
                daily_calorie_target: None,
            }),
        );
        let id = record.id;

        let entry = LedgerEntry::new(7, LedgerOp::Create, record, Timestamp::from_millis(10));
        assert_eq!(entry.entry_id, 7);
        assert_eq!(entry.kind(), EntityKind::Profile);
        assert_eq!(entry.entity_id(), id);
        assert_eq!(entry.attempt_count, 0);
        assert!(!entry.stuck);
    }

    #[test]
    fn op_wire_names() {
        assert_eq!(LedgerOp::Create.as_str(), "create");
        assert_eq!(LedgerOp::Update.as_str(), "update");
        assert_eq!(LedgerOp::Delete.as_str(), "delete");
    }
}
