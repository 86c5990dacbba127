//! Property-based test generators using proptest.

use fitlog_core::{
    EntityKind, EntityPayload, EntityRecord, MealPayload, PersonalRecordPayload, PresetPayload,
    ProfilePayload, Timestamp, WorkoutPayload, WorkoutSet,
};
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for valid entity ids.
pub fn entity_id_strategy() -> impl Strategy<Value = Uuid> {
    prop::array::uniform16(any::<u8>()).prop_map(Uuid::from_bytes)
}

/// Strategy for timestamps within a realistic millisecond range.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (0u64..4_102_444_800_000).prop_map(Timestamp::from_millis)
}

/// Strategy for entity kinds.
pub fn entity_kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z ]{0,23}").expect("Invalid regex")
}

/// Strategy for workout payloads.
pub fn workout_payload_strategy() -> impl Strategy<Value = EntityPayload> {
    (
        name_strategy(),
        timestamp_strategy(),
        0u32..14_400,
        prop::collection::vec(
            (name_strategy(), 0.0f64..500.0, 1u32..50).prop_map(|(exercise, weight_kg, reps)| {
                WorkoutSet {
                    exercise,
                    weight_kg,
                    reps,
                }
            }),
            0..8,
        ),
    )
        .prop_map(|(title, started_at, duration_secs, sets)| {
            EntityPayload::Workout(WorkoutPayload {
                title,
                started_at,
                duration_secs,
                sets,
                notes: None,
            })
        })
}

/// Strategy for meal payloads.
pub fn meal_payload_strategy() -> impl Strategy<Value = EntityPayload> {
    (
        name_strategy(),
        timestamp_strategy(),
        0u32..5_000,
        0.0f64..300.0,
        0.0f64..500.0,
        0.0f64..200.0,
    )
        .prop_map(|(name, eaten_at, calories, protein_g, carbs_g, fat_g)| {
            EntityPayload::Meal(MealPayload {
                name,
                eaten_at,
                calories,
                protein_g,
                carbs_g,
                fat_g,
            })
        })
}

/// Strategy for payloads of the given kind.
pub fn payload_strategy(kind: EntityKind) -> BoxedStrategy<EntityPayload> {
    match kind {
        EntityKind::Workout => workout_payload_strategy().boxed(),
        EntityKind::Meal => meal_payload_strategy().boxed(),
        EntityKind::Preset => (name_strategy(), 0u32..600)
            .prop_map(|(name, rest_secs)| {
                EntityPayload::Preset(PresetPayload {
                    name,
                    exercises: vec!["squat".into()],
                    rest_secs,
                })
            })
            .boxed(),
        EntityKind::PersonalRecord => (name_strategy(), 0.0f64..500.0, 1u32..20, timestamp_strategy())
            .prop_map(|(exercise, weight_kg, reps, achieved_at)| {
                EntityPayload::PersonalRecord(PersonalRecordPayload {
                    exercise,
                    weight_kg,
                    reps,
                    achieved_at,
                })
            })
            .boxed(),
        EntityKind::Profile => name_strategy()
            .prop_map(|display_name| {
                EntityPayload::Profile(ProfilePayload {
                    display_name,
                    height_cm: None,
                    body_weight_kg: None,
                    daily_calorie_target: None,
                })
            })
            .boxed(),
    }
}

/// Strategy for complete records of any kind.
pub fn record_strategy() -> impl Strategy<Value = EntityRecord> {
    (entity_kind_strategy(), entity_id_strategy(), timestamp_strategy())
        .prop_flat_map(|(kind, id, updated_at)| {
            payload_strategy(kind)
                .prop_map(move |payload| EntityRecord::new(id, updated_at, payload))
        })
}
