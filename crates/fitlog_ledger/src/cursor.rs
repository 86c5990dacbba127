//! Per-kind pull watermarks.

use crate::error::{LedgerError, LedgerResult};
use fitlog_core::{EntityKind, Timestamp};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const CURSOR_FILE: &str = "cursors.cbor";

/// Per-entity-kind `last_pulled_at` watermarks.
///
/// Each watermark records the most recent remote `updated_at` successfully
/// merged locally, bounding the next "changed since" pull. Watermarks only
/// move forward; the single exception is [`CursorTable::reset`], the explicit
/// full-resync path.
pub struct CursorTable {
    path: Option<PathBuf>,
    cursors: Mutex<BTreeMap<EntityKind, Timestamp>>,
}

impl CursorTable {
    /// Opens the cursor table persisted in `dir`, or starts empty.
    pub fn open(dir: &Path) -> LedgerResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CURSOR_FILE);

        let cursors = match File::open(&path) {
            Ok(file) => ciborium::from_reader(file)
                .map_err(|e| LedgerError::corruption(format!("cursor decode failed: {e}")))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            cursors: Mutex::new(cursors),
        })
    }

    /// Creates a table with no backing file, for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cursors: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the watermark for `kind`; the epoch before the first pull.
    #[must_use]
    pub fn get(&self, kind: EntityKind) -> Timestamp {
        self.cursors
            .lock()
            .get(&kind)
            .copied()
            .unwrap_or(Timestamp::ZERO)
    }

    /// Advances the watermark for `kind` to `candidate` if it is newer.
    ///
    /// Returns true if the watermark moved. Never moves backwards.
    pub fn advance(&self, kind: EntityKind, candidate: Timestamp) -> LedgerResult<bool> {
        let mut cursors = self.cursors.lock();
        let current = cursors.get(&kind).copied().unwrap_or(Timestamp::ZERO);
        if candidate <= current {
            return Ok(false);
        }

        cursors.insert(kind, candidate);
        self.persist(&cursors)?;
        debug!(kind = %kind, cursor = %candidate, "pull cursor advanced");
        Ok(true)
    }

    /// Clears every watermark so the next pass re-pulls from the epoch.
    pub fn reset(&self) -> LedgerResult<()> {
        let mut cursors = self.cursors.lock();
        cursors.clear();
        self.persist(&cursors)
    }

    /// Returns a copy of all watermarks.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<EntityKind, Timestamp> {
        self.cursors.lock().clone()
    }

    fn persist(&self, cursors: &BTreeMap<EntityKind, Timestamp>) -> LedgerResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let tmp_path = path.with_extension("cbor.tmp");
        let mut tmp = File::create(&tmp_path)?;
        let mut bytes = Vec::new();
        ciborium::into_writer(cursors, &mut bytes)
            .map_err(|e| LedgerError::corruption(format!("cursor encode failed: {e}")))?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_starts_at_epoch() {
        let cursors = CursorTable::in_memory();
        assert_eq!(cursors.get(EntityKind::Meal), Timestamp::ZERO);
    }

    #[test]
    fn advance_is_monotonic() {
        let cursors = CursorTable::in_memory();

        assert!(cursors.advance(EntityKind::Meal, Timestamp::from_millis(100)).unwrap());
        assert!(!cursors.advance(EntityKind::Meal, Timestamp::from_millis(100)).unwrap());
        assert!(!cursors.advance(EntityKind::Meal, Timestamp::from_millis(50)).unwrap());
        assert_eq!(cursors.get(EntityKind::Meal), Timestamp::from_millis(100));

        assert!(cursors.advance(EntityKind::Meal, Timestamp::from_millis(101)).unwrap());
        assert_eq!(cursors.get(EntityKind::Meal), Timestamp::from_millis(101));
    }

    #[test]
    fn kinds_are_independent() {
        let cursors = CursorTable::in_memory();
        cursors.advance(EntityKind::Meal, Timestamp::from_millis(100)).unwrap();

        assert_eq!(cursors.get(EntityKind::Workout), Timestamp::ZERO);
        assert_eq!(cursors.snapshot().len(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let cursors = CursorTable::open(dir.path()).unwrap();
            cursors.advance(EntityKind::Meal, Timestamp::from_millis(100)).unwrap();
            cursors.advance(EntityKind::Profile, Timestamp::from_millis(7)).unwrap();
        }

        let cursors = CursorTable::open(dir.path()).unwrap();
        assert_eq!(cursors.get(EntityKind::Meal), Timestamp::from_millis(100));
        assert_eq!(cursors.get(EntityKind::Profile), Timestamp::from_millis(7));
    }

    #[test]
    fn reset_clears_watermarks() {
        let dir = tempfile::tempdir().unwrap();
        let cursors = CursorTable::open(dir.path()).unwrap();

        cursors.advance(EntityKind::Meal, Timestamp::from_millis(100)).unwrap();
        cursors.reset().unwrap();

        assert_eq!(cursors.get(EntityKind::Meal), Timestamp::ZERO);
        assert!(cursors.snapshot().is_empty());
    }
}
