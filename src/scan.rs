//! Conflict detection against the lock directory.

use crate::codec;
use crate::error::Result;
use crate::path::LockablePath;
use crate::store::SentinelStore;
use std::collections::HashSet;
use tracing::debug;

/// A sentinel held by someone else that overlaps the requested paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Sentinel filename in the lock directory.
    pub name: String,
    /// The path that sentinel locks.
    pub path: LockablePath,
}

/// Lists foreign sentinels whose paths overlap a target set.
pub struct ConflictScanner<'a> {
    store: &'a dyn SentinelStore,
}

impl<'a> ConflictScanner<'a> {
    pub fn new(store: &'a dyn SentinelStore) -> Self {
        Self { store }
    }

    /// Every sentinel not in `owned` whose path overlaps one of `targets`.
    ///
    /// Entries that do not decode as sentinels are skipped.
    pub fn scan(&self, targets: &[LockablePath], owned: &HashSet<String>) -> Result<Vec<Conflict>> {
        let mut conflicts = Vec::new();

        for name in self.store.list()? {
            if owned.contains(&name) {
                continue;
            }
            let Some(path) = codec::decode(&name) else {
                debug!(entry = %name, "skipping non-sentinel entry in lock directory");
                continue;
            };
            if path.overlaps_any(targets) {
                conflicts.push(Conflict { name, path });
            }
        }

        Ok(conflicts)
    }
}
