//! The local-store contract and an in-memory reference implementation.

use crate::entity::{EntityKind, EntityRecord, Timestamp};
use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The on-device record store consumed by the sync coordinator.
///
/// The store is owned by the host application; the engine only reads and
/// writes through this narrow interface. Implementations must serialize
/// their own writes internally — callers on the UI thread and the background
/// sync pass interleave freely.
pub trait LocalStore: Send + Sync {
    /// Returns the record with the given id, tombstones included.
    fn get_record(&self, kind: EntityKind, id: Uuid) -> CoreResult<Option<EntityRecord>>;

    /// Inserts or replaces a record.
    fn put_record(&self, kind: EntityKind, record: EntityRecord) -> CoreResult<()>;

    /// Soft-deletes a record, stamping the tombstone at `at`.
    fn soft_delete_record(&self, kind: EntityKind, id: Uuid, at: Timestamp) -> CoreResult<()>;

    /// Returns records whose `updated_at` is strictly greater than `since`.
    fn list_changed_since(&self, kind: EntityKind, since: Timestamp)
        -> CoreResult<Vec<EntityRecord>>;
}

/// An in-memory store, used in tests and as the reference implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(EntityKind, Uuid), EntityRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn get_record(&self, kind: EntityKind, id: Uuid) -> CoreResult<Option<EntityRecord>> {
        Ok(self.records.read().get(&(kind, id)).cloned())
    }

    fn put_record(&self, kind: EntityKind, record: EntityRecord) -> CoreResult<()> {
        if record.kind() != kind {
            return Err(CoreError::KindMismatch {
                expected: kind,
                actual: record.kind(),
            });
        }
        self.records.write().insert((kind, record.id), record);
        Ok(())
    }

    fn soft_delete_record(&self, kind: EntityKind, id: Uuid, at: Timestamp) -> CoreResult<()> {
        let mut records = self.records.write();
        match records.get_mut(&(kind, id)) {
            Some(record) => {
                record.deleted = true;
                record.updated_at = at;
                Ok(())
            }
            None => Err(CoreError::NotFound { kind, id }),
        }
    }

    fn list_changed_since(
        &self,
        kind: EntityKind,
        since: Timestamp,
    ) -> CoreResult<Vec<EntityRecord>> {
        Ok(self
            .records
            .read()
            .range((kind, Uuid::nil())..=(kind, Uuid::max()))
            .filter(|(_, record)| record.updated_at > since)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{EntityPayload, PresetPayload, ProfilePayload};

    fn preset(id: Uuid, updated_at: u64) -> EntityRecord {
        EntityRecord::new(
            id,
            Timestamp::from_millis(updated_at),
            EntityPayload::Preset(PresetPayload {
                name: "push day".into(),
                exercises: vec!["bench press".into(), "overhead press".into()],
                rest_secs: 120,
            }),
        )
    }

    #[test]
    fn put_and_get() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        store.put_record(EntityKind::Preset, preset(id, 100)).unwrap();

        let fetched = store.get_record(EntityKind::Preset, id).unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.updated_at, Timestamp::from_millis(100));
        assert!(store.get_record(EntityKind::Meal, id).unwrap().is_none());
    }

    #[test]
    fn put_rejects_kind_mismatch() {
        let store = MemoryStore::new();
        let record = preset(Uuid::new_v4(), 100);

        let err = store.put_record(EntityKind::Meal, record).unwrap_err();
        assert!(matches!(err, CoreError::KindMismatch { .. }));
    }

    #[test]
    fn soft_delete_stamps_tombstone() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.put_record(EntityKind::Preset, preset(id, 100)).unwrap();

        store
            .soft_delete_record(EntityKind::Preset, id, Timestamp::from_millis(200))
            .unwrap();

        let fetched = store.get_record(EntityKind::Preset, id).unwrap().unwrap();
        assert!(fetched.deleted);
        assert_eq!(fetched.updated_at, Timestamp::from_millis(200));
    }

    #[test]
    fn soft_delete_missing_record_errors() {
        let store = MemoryStore::new();
        let err = store
            .soft_delete_record(EntityKind::Preset, Uuid::new_v4(), Timestamp::ZERO)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn list_changed_since_is_strict_and_kind_scoped() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.put_record(EntityKind::Preset, preset(a, 100)).unwrap();
        store.put_record(EntityKind::Preset, preset(b, 200)).unwrap();
        store
            .put_record(
                EntityKind::Profile,
                EntityRecord::new(
                    Uuid::new_v4(),
                    Timestamp::from_millis(300),
                    EntityPayload::Profile(ProfilePayload {
                        display_name: "sam".into(),
                        height_cm: None,
                        body_weight_kg: None,
                        daily_calorie_target: None,
                    }),
                ),
            )
            .unwrap();

        let changed = store
            .list_changed_since(EntityKind::Preset, Timestamp::from_millis(100))
            .unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, b);
    }
}
