//! Test fixtures and harness wiring.
//!
//! Provides a fully wired sync engine over in-memory or durable components,
//! plus sample records for each entity kind. The harness's mutation helpers
//! play the role of the host application's write path: store write first,
//! ledger append second.

use crate::remote::InMemoryRemote;
use fitlog_core::{
    Clock, CoreError, EntityKind, EntityPayload, EntityRecord, LocalStore, ManualClock, MealPayload,
    MemoryStore, PersonalRecordPayload, PresetPayload, ProfilePayload, Timestamp, WorkoutPayload,
    WorkoutSet,
};
use fitlog_ledger::{ChangeLedger, CursorTable, EntryId, LedgerConfig, LedgerOp};
use fitlog_sync_engine::{
    ConnectivityMonitor, MonitorConfig, ScriptedProbe, StatusPublisher, SyncConfig,
    SyncCoordinator, SyncResult, SyncSummary,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Initializes test logging once; respects `RUST_LOG`.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder for [`SyncHarness`].
pub struct HarnessBuilder {
    user_id: Uuid,
    remote: Option<Arc<InMemoryRemote>>,
    ledger_dir: Option<PathBuf>,
    ledger_config: LedgerConfig,
    online: bool,
    start_millis: u64,
}

impl HarnessBuilder {
    /// Reuses an existing fake remote (e.g. across a simulated restart).
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<InMemoryRemote>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Fixes the user id (e.g. across a simulated restart).
    #[must_use]
    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = user_id;
        self
    }

    /// Backs the ledger and cursors with files under `dir`.
    #[must_use]
    pub fn with_ledger_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ledger_dir = Some(dir.into());
        self
    }

    /// Overrides the ledger configuration.
    #[must_use]
    pub fn with_ledger_config(mut self, config: LedgerConfig) -> Self {
        self.ledger_config = config;
        self
    }

    /// Starts the harness offline.
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    /// Sets the manual clock's starting time.
    #[must_use]
    pub fn with_start_millis(mut self, millis: u64) -> Self {
        self.start_millis = millis;
        self
    }

    /// Wires everything together.
    #[must_use]
    pub fn build(self) -> SyncHarness {
        let clock: Arc<ManualClock> =
            Arc::new(ManualClock::new(Timestamp::from_millis(self.start_millis)));
        let store = Arc::new(MemoryStore::new());

        let (ledger, cursors) = match &self.ledger_dir {
            Some(dir) => (
                ChangeLedger::open(dir, self.ledger_config, clock.clone())
                    .expect("Failed to open ledger"),
                CursorTable::open(dir).expect("Failed to open cursor table"),
            ),
            None => (
                ChangeLedger::in_memory(self.ledger_config, clock.clone()),
                CursorTable::in_memory(),
            ),
        };
        let ledger = Arc::new(ledger);
        let cursors = Arc::new(cursors);

        let remote = self
            .remote
            .unwrap_or_else(|| Arc::new(InMemoryRemote::new()));
        let probe = Arc::new(ScriptedProbe::new(self.online));
        let monitor = Arc::new(ConnectivityMonitor::new(
            probe.clone(),
            MonitorConfig::default().with_offline_after(1),
            clock.clone(),
        ));
        monitor.check_now();

        let status = Arc::new(StatusPublisher::new(ledger.clone(), monitor.clone()));
        let coordinator = Arc::new(SyncCoordinator::new(
            SyncConfig::new(self.user_id),
            store.clone(),
            ledger.clone(),
            cursors.clone(),
            remote.clone(),
            monitor.clone(),
            status.clone(),
            clock.clone(),
        ));

        SyncHarness {
            user_id: self.user_id,
            clock,
            store,
            ledger,
            cursors,
            remote,
            probe,
            monitor,
            status,
            coordinator,
        }
    }
}

/// A fully wired sync engine for tests.
pub struct SyncHarness {
    /// The user the engine is scoped to.
    pub user_id: Uuid,
    /// Manually driven clock shared by every component.
    pub clock: Arc<ManualClock>,
    /// The local store.
    pub store: Arc<MemoryStore>,
    /// The change ledger.
    pub ledger: Arc<ChangeLedger>,
    /// The pull cursor table.
    pub cursors: Arc<CursorTable>,
    /// The fake backend.
    pub remote: Arc<InMemoryRemote>,
    /// The scripted reachability probe.
    pub probe: Arc<ScriptedProbe>,
    /// The connectivity monitor.
    pub monitor: Arc<ConnectivityMonitor>,
    /// The status publisher.
    pub status: Arc<StatusPublisher>,
    /// The coordinator under test.
    pub coordinator: Arc<SyncCoordinator>,
}

impl SyncHarness {
    /// Starts building a harness.
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            user_id: Uuid::new_v4(),
            remote: None,
            ledger_dir: None,
            ledger_config: LedgerConfig::default(),
            online: true,
            start_millis: 1_000,
        }
    }

    /// An online harness over in-memory components.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    /// An online harness whose ledger and cursors persist in a fresh
    /// temporary directory.
    ///
    /// Returns the directory guard; keep it alive for the harness lifetime
    /// (and reuse its path to simulate a restart).
    #[must_use]
    pub fn durable() -> (Self, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
        let harness = Self::builder().with_ledger_dir(dir.path()).build();
        (harness, dir)
    }

    /// Creates a record locally: store write plus ledger append.
    pub fn create_local(&self, record: EntityRecord) -> SyncResult<EntryId> {
        self.store.put_record(record.kind(), record.clone())?;
        Ok(self.ledger.append(LedgerOp::Create, record)?)
    }

    /// Updates a record locally: store write plus ledger append.
    pub fn update_local(&self, record: EntityRecord) -> SyncResult<EntryId> {
        self.store.put_record(record.kind(), record.clone())?;
        Ok(self.ledger.append(LedgerOp::Update, record)?)
    }

    /// Soft-deletes a record locally and ledgers the tombstone.
    pub fn delete_local(&self, kind: EntityKind, id: Uuid) -> SyncResult<EntryId> {
        let now = self.clock.now();
        let record = self
            .store
            .get_record(kind, id)?
            .ok_or(CoreError::NotFound { kind, id })?;
        self.store.soft_delete_record(kind, id, now)?;
        Ok(self
            .ledger
            .append(LedgerOp::Delete, record.into_tombstone(now))?)
    }

    /// Runs a sync pass as the engine's user.
    pub fn sync(&self) -> SyncResult<SyncSummary> {
        self.coordinator.full_sync(self.user_id)
    }

    /// Flips the probe online and observes the transition.
    pub fn go_online(&self) {
        self.probe.set_online(true);
        self.monitor.check_now();
    }

    /// Flips the probe offline and observes the transition.
    pub fn go_offline(&self) {
        self.probe.set_online(false);
        self.monitor.check_now();
    }
}

/// A workout record with the given id, stamped at `updated_at` millis.
#[must_use]
pub fn workout_with_id(id: Uuid, updated_at: u64) -> EntityRecord {
    EntityRecord::new(
        id,
        Timestamp::from_millis(updated_at),
        EntityPayload::Workout(WorkoutPayload {
            title: "push day".into(),
            started_at: Timestamp::from_millis(updated_at),
            duration_secs: 3_300,
            sets: vec![
                WorkoutSet {
                    exercise: "bench press".into(),
                    weight_kg: 82.5,
                    reps: 5,
                },
                WorkoutSet {
                    exercise: "overhead press".into(),
                    weight_kg: 50.0,
                    reps: 8,
                },
            ],
            notes: None,
        }),
    )
}

/// A meal record with the given id, stamped at `updated_at` millis.
#[must_use]
pub fn meal_with_id(id: Uuid, updated_at: u64) -> EntityRecord {
    EntityRecord::new(
        id,
        Timestamp::from_millis(updated_at),
        EntityPayload::Meal(MealPayload {
            name: "chicken and rice".into(),
            eaten_at: Timestamp::from_millis(updated_at),
            calories: 650,
            protein_g: 45.0,
            carbs_g: 70.0,
            fat_g: 14.0,
        }),
    )
}

/// A preset record with the given id, stamped at `updated_at` millis.
#[must_use]
pub fn preset_with_id(id: Uuid, updated_at: u64) -> EntityRecord {
    EntityRecord::new(
        id,
        Timestamp::from_millis(updated_at),
        EntityPayload::Preset(PresetPayload {
            name: "full body".into(),
            exercises: vec!["squat".into(), "bench press".into(), "row".into()],
            rest_secs: 150,
        }),
    )
}

/// A personal-record record with the given id, stamped at `updated_at` millis.
#[must_use]
pub fn personal_record_with_id(id: Uuid, updated_at: u64) -> EntityRecord {
    EntityRecord::new(
        id,
        Timestamp::from_millis(updated_at),
        EntityPayload::PersonalRecord(PersonalRecordPayload {
            exercise: "deadlift".into(),
            weight_kg: 180.0,
            reps: 1,
            achieved_at: Timestamp::from_millis(updated_at),
        }),
    )
}

/// A profile record with the given id, stamped at `updated_at` millis.
#[must_use]
pub fn profile_with_id(id: Uuid, updated_at: u64) -> EntityRecord {
    EntityRecord::new(
        id,
        Timestamp::from_millis(updated_at),
        EntityPayload::Profile(ProfilePayload {
            display_name: "sam".into(),
            height_cm: Some(178.0),
            body_weight_kg: Some(79.5),
            daily_calorie_target: Some(2_600),
        }),
    )
}

/// A workout record with a fresh id.
#[must_use]
pub fn sample_workout(updated_at: u64) -> EntityRecord {
    workout_with_id(Uuid::new_v4(), updated_at)
}

/// A meal record with a fresh id.
#[must_use]
pub fn sample_meal(updated_at: u64) -> EntityRecord {
    meal_with_id(Uuid::new_v4(), updated_at)
}

/// A preset record with a fresh id.
#[must_use]
pub fn sample_preset(updated_at: u64) -> EntityRecord {
    preset_with_id(Uuid::new_v4(), updated_at)
}

/// A personal-record record with a fresh id.
#[must_use]
pub fn sample_personal_record(updated_at: u64) -> EntityRecord {
    personal_record_with_id(Uuid::new_v4(), updated_at)
}

/// A profile record with a fresh id.
#[must_use]
pub fn sample_profile(updated_at: u64) -> EntityRecord {
    profile_with_id(Uuid::new_v4(), updated_at)
}
