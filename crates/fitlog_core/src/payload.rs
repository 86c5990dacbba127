//! Typed payloads for each synchronizable entity kind.

use crate::entity::{EntityKind, Timestamp};
use serde::{Deserialize, Serialize};

/// One set within a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
    /// Exercise name, from the external catalog.
    pub exercise: String,
    /// Weight moved, in kilograms.
    pub weight_kg: f64,
    /// Repetitions completed.
    pub reps: u32,
}

/// A logged workout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPayload {
    /// User-facing title.
    pub title: String,
    /// When the session started.
    pub started_at: Timestamp,
    /// Session length in seconds.
    pub duration_secs: u32,
    /// The sets performed, in order.
    pub sets: Vec<WorkoutSet>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// A logged meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPayload {
    /// User-facing name.
    pub name: String,
    /// When the meal was eaten.
    pub eaten_at: Timestamp,
    /// Total calories.
    pub calories: u32,
    /// Protein in grams.
    pub protein_g: f64,
    /// Carbohydrates in grams.
    pub carbs_g: f64,
    /// Fat in grams.
    pub fat_g: f64,
}

/// A reusable workout preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetPayload {
    /// Preset name.
    pub name: String,
    /// Exercises in execution order.
    pub exercises: Vec<String>,
    /// Rest between sets, in seconds.
    pub rest_secs: u32,
}

/// A personal record for an exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecordPayload {
    /// Exercise name.
    pub exercise: String,
    /// Weight lifted, in kilograms.
    pub weight_kg: f64,
    /// Repetitions at that weight.
    pub reps: u32,
    /// When the record was achieved.
    pub achieved_at: Timestamp,
}

/// The user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePayload {
    /// Display name.
    pub display_name: String,
    /// Height in centimeters, if set.
    pub height_cm: Option<f64>,
    /// Body weight in kilograms, if set.
    pub body_weight_kg: Option<f64>,
    /// Daily calorie target, if set.
    pub daily_calorie_target: Option<u32>,
}

/// The tagged union over every entity kind's payload.
///
/// Carrying the kind in the payload tag (rather than JSON-shaped dynamic
/// data) lets compaction and conflict resolution stay generic over
/// [`crate::Syncable`] while each call site keeps its concrete type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityPayload {
    /// A workout session.
    Workout(WorkoutPayload),
    /// A meal.
    Meal(MealPayload),
    /// A workout preset.
    Preset(PresetPayload),
    /// A personal record.
    PersonalRecord(PersonalRecordPayload),
    /// The user profile.
    Profile(ProfilePayload),
}

impl EntityPayload {
    /// Returns the entity kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Workout(_) => EntityKind::Workout,
            EntityPayload::Meal(_) => EntityKind::Meal,
            EntityPayload::Preset(_) => EntityKind::Preset,
            EntityPayload::PersonalRecord(_) => EntityKind::PersonalRecord,
            EntityPayload::Profile(_) => EntityKind::Profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_mapping() {
        let workout = EntityPayload::Workout(WorkoutPayload {
            title: "push day".into(),
            started_at: Timestamp::from_millis(1),
            duration_secs: 3600,
            sets: vec![WorkoutSet {
                exercise: "bench press".into(),
                weight_kg: 80.0,
                reps: 5,
            }],
            notes: None,
        });
        assert_eq!(workout.kind(), EntityKind::Workout);

        let profile = EntityPayload::Profile(ProfilePayload {
            display_name: "sam".into(),
            height_cm: Some(180.0),
            body_weight_kg: None,
            daily_calorie_target: Some(2600),
        });
        assert_eq!(profile.kind(), EntityKind::Profile);
    }

    #[test]
    fn payload_serde_tag_is_snake_case() {
        let pr = EntityPayload::PersonalRecord(PersonalRecordPayload {
            exercise: "deadlift".into(),
            weight_kg: 180.0,
            reps: 1,
            achieved_at: Timestamp::from_millis(9),
        });

        let mut bytes = Vec::new();
        ciborium::into_writer(&pr, &mut bytes).unwrap();
        let value: ciborium::Value = ciborium::from_reader(bytes.as_slice()).unwrap();

        let map = value.as_map().unwrap();
        let tag = map
            .iter()
            .find(|(k, _)| k.as_text() == Some("kind"))
            .map(|(_, v)| v.as_text().unwrap())
            .unwrap();
        assert_eq!(tag, "personal_record");
    }
}
