//! Lock directory diagnostics.
//!
//! Lists the locks currently held on the host and force-clears a lock left
//! behind by a process that cannot be restarted to release it. Neither is
//! needed by the locking protocol itself.

use crate::clock::elapsed_between;
use crate::codec;
use crate::error::{PathLockError, Result};
use crate::locker::PathLocker;
use crate::metadata::SentinelMetadata;
use crate::path::LockablePath;
use crate::store::DeleteOutcome;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Information about a held lock.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The locked path.
    pub path: LockablePath,

    /// Sentinel filename in the lock directory.
    pub sentinel: String,

    /// Last-modified time of the sentinel.
    pub modified: DateTime<Utc>,

    /// Time since `modified`.
    pub age: Duration,

    /// Parsed marker content, if it could be read.
    pub metadata: Option<SentinelMetadata>,

    /// Whether the lock is old enough to be reclaimed.
    pub is_stale: bool,
}

impl LockInfo {
    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let secs = self.age.as_secs();
        let minutes = secs / 60;
        let hours = minutes / 60;
        let days = hours / 24;

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m", minutes)
        } else {
            format!("{}s", secs)
        }
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let owner = self
            .metadata
            .as_ref()
            .map(|meta| meta.owner.as_str())
            .unwrap_or("unknown");
        write!(
            f,
            "{} (owner: {}, age: {}{})",
            self.path,
            owner,
            self.age_string(),
            if self.is_stale { ", STALE" } else { "" }
        )
    }
}

/// List all held locks, sorted by path.
///
/// Staleness is judged against the configured `dead_lock_seconds`.
pub fn list_locks(locker: &PathLocker) -> Result<Vec<LockInfo>> {
    let store = locker.store();
    let now = locker.clock().now();
    let dead_lock = locker.config().dead_lock();
    let mut locks = Vec::new();

    for name in store.list()? {
        let Some(path) = codec::decode(&name) else {
            continue;
        };
        // Released between list and stat.
        let Some(modified) = store.stat_mtime(&name)? else {
            continue;
        };

        let metadata = match store.read(&name)? {
            Some(content) => match SentinelMetadata::from_json(&content) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!(sentinel = %name, error = %e, "unreadable sentinel metadata");
                    None
                }
            },
            None => None,
        };

        let age = elapsed_between(modified, now);
        locks.push(LockInfo {
            path,
            sentinel: name,
            modified,
            age,
            metadata,
            is_stale: age > dead_lock,
        });
    }

    locks.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(locks)
}

/// Clear the lock on exactly `path`.
///
/// This removes the sentinel regardless of who holds it. The caller is
/// responsible for verifying that clearing the lock is appropriate.
///
/// # Returns
///
/// * `Ok(LockInfo)` - Information about the cleared lock
/// * `Err(PathLockError::InvalidPath)` - No lock is held on `path`
pub fn clear_lock<P: AsRef<Path>>(locker: &PathLocker, path: P) -> Result<LockInfo> {
    let path = locker.normalizer().normalize(path.as_ref())?;
    let name = codec::encode(&path)?;

    let info = list_locks(locker)?
        .into_iter()
        .find(|info| info.sentinel == name)
        .ok_or_else(|| PathLockError::InvalidPath(format!("no lock is held on '{}'", path)))?;

    if locker.store().delete(&name)? == DeleteOutcome::AlreadyGone {
        return Err(PathLockError::InvalidPath(format!(
            "lock on '{}' was released while clearing it",
            path
        )));
    }
    warn!(path = %path, age_secs = info.age.as_secs(), "cleared lock");

    Ok(info)
}
