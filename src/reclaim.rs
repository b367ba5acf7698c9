//! Eviction of sentinels orphaned by crashed holders.
//!
//! A sentinel whose mtime is more than `dead_lock` in the past is presumed
//! dead and deleted by whichever contender notices first. This is the only
//! crash-recovery path: there is no heartbeat, so a live holder that keeps a
//! lock longer than `dead_lock` can lose it too.

use crate::clock::{Clock, elapsed_between};
use crate::error::Result;
use crate::scan::Conflict;
use crate::store::{DeleteOutcome, SentinelStore};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

pub struct StaleLockReclaimer<'a> {
    store: &'a dyn SentinelStore,
    clock: &'a dyn Clock,
    dead_lock: Duration,
}

impl<'a> StaleLockReclaimer<'a> {
    pub fn new(store: &'a dyn SentinelStore, clock: &'a dyn Clock, dead_lock: Duration) -> Self {
        Self {
            store,
            clock,
            dead_lock,
        }
    }

    /// Whether a sentinel last modified at `mtime` is older than the threshold.
    pub fn is_stale(&self, mtime: DateTime<Utc>) -> bool {
        elapsed_between(mtime, self.clock.now()) > self.dead_lock
    }

    /// Delete the stale conflicts and return the ones still held.
    ///
    /// A sentinel that disappears before it can be inspected or deleted
    /// counts as cleared. Any other store failure aborts.
    pub fn reclaim(&self, conflicts: Vec<Conflict>) -> Result<Vec<Conflict>> {
        let mut held = Vec::with_capacity(conflicts.len());

        for conflict in conflicts {
            let Some(mtime) = self.store.stat_mtime(&conflict.name)? else {
                debug!(path = %conflict.path, "conflicting sentinel vanished before stat");
                continue;
            };
            if !self.is_stale(mtime) {
                held.push(conflict);
                continue;
            }

            let age = elapsed_between(mtime, self.clock.now());
            match self.store.delete(&conflict.name)? {
                DeleteOutcome::Deleted => warn!(
                    path = %conflict.path,
                    age_secs = age.as_secs(),
                    "reclaimed stale lock"
                ),
                DeleteOutcome::AlreadyGone => debug!(
                    path = %conflict.path,
                    "stale lock already reclaimed by another contender"
                ),
            }
        }

        Ok(held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec;
    use crate::error::PathLockError;
    use crate::path::LockablePath;
    use crate::store::{MemorySentinelStore, StoreOp};
    use std::sync::Arc;

    const DEAD_LOCK: Duration = Duration::from_secs(3600);

    fn conflict(path: &str) -> Conflict {
        let path = LockablePath::new(path).unwrap();
        Conflict {
            name: codec::encode(&path).unwrap(),
            path,
        }
    }

    fn setup() -> (Arc<ManualClock>, MemorySentinelStore) {
        let clock = Arc::new(ManualClock::default());
        let store = MemorySentinelStore::new("/locks", clock.clone());
        (clock, store)
    }

    #[test]
    fn test_fresh_sentinel_is_kept() {
        let (clock, store) = setup();
        let c = conflict("/data/proj");
        store.insert(&c.name, "{}", clock.now() - chrono::Duration::seconds(10));

        let reclaimer = StaleLockReclaimer::new(&store, clock.as_ref(), DEAD_LOCK);
        let held = reclaimer.reclaim(vec![c.clone()]).unwrap();

        assert_eq!(held, vec![c.clone()]);
        assert!(store.contains(&c.name));
    }

    #[test]
    fn test_stale_sentinel_is_deleted() {
        let (clock, store) = setup();
        let c = conflict("/data/proj");
        store.insert(&c.name, "{}", clock.now() - chrono::Duration::seconds(3601));

        let reclaimer = StaleLockReclaimer::new(&store, clock.as_ref(), DEAD_LOCK);
        assert!(reclaimer.reclaim(vec![c.clone()]).unwrap().is_empty());
        assert!(!store.contains(&c.name));
    }

    #[test]
    fn test_exactly_at_threshold_is_not_stale() {
        let (clock, store) = setup();
        let reclaimer = StaleLockReclaimer::new(&store, clock.as_ref(), DEAD_LOCK);

        assert!(!reclaimer.is_stale(clock.now() - chrono::Duration::seconds(3600)));
        assert!(reclaimer.is_stale(clock.now() - chrono::Duration::seconds(3601)));
        // mtimes in the future are never stale
        assert!(!reclaimer.is_stale(clock.now() + chrono::Duration::hours(2)));
    }

    #[test]
    fn test_vanished_sentinel_counts_as_cleared() {
        let (clock, store) = setup();
        let reclaimer = StaleLockReclaimer::new(&store, clock.as_ref(), DEAD_LOCK);

        assert!(reclaimer.reclaim(vec![conflict("/gone")]).unwrap().is_empty());
    }

    #[test]
    fn test_delete_failure_aborts() {
        let (clock, store) = setup();
        let c = conflict("/data/proj");
        store.insert(&c.name, "{}", clock.now() - chrono::Duration::days(2));
        store.fail_next(StoreOp::Delete, std::io::ErrorKind::PermissionDenied);

        let reclaimer = StaleLockReclaimer::new(&store, clock.as_ref(), DEAD_LOCK);
        let err = reclaimer.reclaim(vec![c.clone()]).unwrap_err();

        assert!(matches!(err, PathLockError::StorageFault { .. }));
        assert!(store.contains(&c.name));
    }
}
