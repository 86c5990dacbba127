//! Entity kinds, timestamps, and the synced record envelope.

use crate::payload::EntityPayload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of entities that participate in synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A logged workout session.
    Workout,
    /// A logged meal.
    Meal,
    /// A reusable workout preset.
    Preset,
    /// A personal record for an exercise.
    PersonalRecord,
    /// The user profile singleton.
    Profile,
}

impl EntityKind {
    /// All entity kinds, in pull order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Workout,
        EntityKind::Meal,
        EntityKind::Preset,
        EntityKind::PersonalRecord,
        EntityKind::Profile,
    ];

    /// Returns the stable wire name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Workout => "workout",
            EntityKind::Meal => "meal",
            EntityKind::Preset => "preset",
            EntityKind::PersonalRecord => "personal_record",
            EntityKind::Profile => "profile",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A millisecond-precision timestamp used for last-writer-wins ordering.
///
/// Timestamps are assigned by whichever side (local or remote) last wrote a
/// record and are the sole conflict tie-breaker. They are totally ordered and
/// never compared across clock domains except through the strict-newer rule
/// in [`crate::resolve`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp (epoch); the initial pull watermark.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Returns milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns the later of two timestamps.
    #[must_use]
    pub fn max(self, other: Timestamp) -> Timestamp {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Anything that carries the sync-invariant fields.
///
/// Compaction and conflict resolution are written once against this trait
/// rather than per entity kind.
pub trait Syncable {
    /// Globally unique, client-generated identifier.
    fn id(&self) -> Uuid;
    /// Timestamp of the last write, local or remote.
    fn updated_at(&self) -> Timestamp;
    /// Tombstone flag; deletions are soft until compaction.
    fn deleted(&self) -> bool;
}

/// A synchronizable domain record.
///
/// The envelope every entity kind shares: a client-generated `id` (stable
/// before the first remote round-trip), the `updated_at` tie-breaker, the
/// tombstone flag, and the typed payload. Tombstoned records keep their last
/// payload so a delete can be pushed, pulled, and conflict-resolved like any
/// other mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Client-generated identifier.
    pub id: Uuid,
    /// Last-write timestamp.
    pub updated_at: Timestamp,
    /// Soft-delete marker.
    pub deleted: bool,
    /// The typed domain payload.
    pub payload: EntityPayload,
}

impl EntityRecord {
    /// Creates a live (non-deleted) record.
    #[must_use]
    pub fn new(id: Uuid, updated_at: Timestamp, payload: EntityPayload) -> Self {
        Self {
            id,
            updated_at,
            deleted: false,
            payload,
        }
    }

    /// Returns the entity kind, derived from the payload.
    #[must_use]
    pub fn kind(&self) -> crate::EntityKind {
        self.payload.kind()
    }

    /// Returns a tombstoned copy of this record, stamped at `at`.
    #[must_use]
    pub fn into_tombstone(mut self, at: Timestamp) -> Self {
        self.deleted = true;
        self.updated_at = at;
        self
    }
}

impl Syncable for EntityRecord {
    fn id(&self) -> Uuid {
        self.id
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn deleted(&self) -> bool {
        self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::MealPayload;

    fn meal_record(updated_at: u64) -> EntityRecord {
        EntityRecord::new(
            Uuid::new_v4(),
            Timestamp::from_millis(updated_at),
            EntityPayload::Meal(MealPayload {
                name: "oats".into(),
                eaten_at: Timestamp::from_millis(updated_at),
                calories: 410,
                protein_g: 14.0,
                carbs_g: 62.0,
                fat_g: 9.0,
            }),
        )
    }

    #[test]
    fn kind_wire_names_are_stable() {
        assert_eq!(EntityKind::Workout.as_str(), "workout");
        assert_eq!(EntityKind::PersonalRecord.as_str(), "personal_record");
        assert_eq!(EntityKind::ALL.len(), 5);
    }

    #[test]
    fn timestamp_ordering() {
        let a = Timestamp::from_millis(100);
        let b = Timestamp::from_millis(200);
        assert!(a < b);
        assert_eq!(a.max(b), b);
        assert_eq!(b.max(a), b);
        assert_eq!(Timestamp::ZERO.as_millis(), 0);
    }

    #[test]
    fn record_kind_follows_payload() {
        let record = meal_record(100);
        assert_eq!(record.kind(), EntityKind::Meal);
        assert!(!record.deleted);
    }

    #[test]
    fn tombstone_keeps_payload() {
        let record = meal_record(100);
        let id = record.id;
        let tomb = record.into_tombstone(Timestamp::from_millis(250));

        assert!(tomb.deleted);
        assert_eq!(tomb.id, id);
        assert_eq!(tomb.updated_at, Timestamp::from_millis(250));
        assert_eq!(tomb.kind(), EntityKind::Meal);
    }

    #[test]
    fn record_cbor_roundtrip() {
        let record = meal_record(123);

        let mut bytes = Vec::new();
        ciborium::into_writer(&record, &mut bytes).unwrap();
        let decoded: EntityRecord = ciborium::from_reader(bytes.as_slice()).unwrap();

        assert_eq!(decoded, record);
    }
}
