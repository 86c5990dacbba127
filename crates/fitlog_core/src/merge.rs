//! Last-writer-wins merge decisions.

use crate::entity::Syncable;

/// Outcome of comparing a pulled remote record against local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// The remote record replaces the local one (or fills a gap).
    ApplyRemote,
    /// The local record stands; the pull is ignored for this id.
    KeepLocal,
}

/// Decides whether a pulled remote record should be applied locally.
///
/// The remote wins only if its `updated_at` is strictly newer than the local
/// record's. A tie keeps the local value, which guarantees a pull never
/// clobbers a local change still waiting in the ledger: the ledger's implied
/// local `updated_at` is always at least the last value sent.
///
/// Tombstones need no special casing here. A local tombstone survives an
/// older remote update (strictly-newer fails), and an undelete happens
/// exactly when the remote carries `deleted = false` with a strictly newer
/// timestamp.
pub fn resolve<R: Syncable>(local: Option<&R>, remote: &R) -> MergeDecision {
    match local {
        None => MergeDecision::ApplyRemote,
        Some(local) => {
            if remote.updated_at() > local.updated_at() {
                MergeDecision::ApplyRemote
            } else {
                MergeDecision::KeepLocal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Timestamp;
    use uuid::Uuid;

    struct Stub {
        id: Uuid,
        updated_at: Timestamp,
        deleted: bool,
    }

    impl Stub {
        fn at(millis: u64, deleted: bool) -> Self {
            Self {
                id: Uuid::nil(),
                updated_at: Timestamp::from_millis(millis),
                deleted,
            }
        }
    }

    impl Syncable for Stub {
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

    #[test]
    fn missing_local_applies_remote() {
        let remote = Stub::at(10, false);
        assert_eq!(resolve(None, &remote), MergeDecision::ApplyRemote);
    }

    #[test]
    fn strictly_newer_remote_wins() {
        let local = Stub::at(100, false);
        assert_eq!(
            resolve(Some(&local), &Stub::at(101, false)),
            MergeDecision::ApplyRemote
        );
    }

    #[test]
    fn equal_timestamps_keep_local() {
        let local = Stub::at(100, false);
        assert_eq!(
            resolve(Some(&local), &Stub::at(100, false)),
            MergeDecision::KeepLocal
        );
    }

    #[test]
    fn older_remote_is_ignored() {
        let local = Stub::at(500, false);
        assert_eq!(
            resolve(Some(&local), &Stub::at(400, false)),
            MergeDecision::KeepLocal
        );
    }

    #[test]
    fn tombstone_beats_older_remote_update() {
        let local = Stub::at(300, true);
        assert_eq!(
            resolve(Some(&local), &Stub::at(200, false)),
            MergeDecision::KeepLocal
        );
    }

    #[test]
    fn strictly_newer_remote_undeletes() {
        let local = Stub::at(300, true);
        assert_eq!(
            resolve(Some(&local), &Stub::at(301, false)),
            MergeDecision::ApplyRemote
        );
    }
}
