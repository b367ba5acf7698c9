//! Lock sessions: acquisition, re-entrancy and scoped release.
//!
//! A [`LockSession`] is the identity that owns locks. Locks taken through the
//! same session never conflict with each other: asking for a path the session
//! already covers returns a no-op handle immediately. Different sessions,
//! whether in the same thread, another thread or another process, exclude
//! each other through the lock directory.
//!
//! ```no_run
//! use pathlock::{LockConfig, LockRequest, PathLocker};
//! use std::time::Duration;
//!
//! let locker = PathLocker::new(LockConfig::default())?;
//! let session = locker.session();
//! let handle = session.acquire(
//!     LockRequest::new("/data/proj")
//!         .co_path("/data/archive")
//!         .timeout(Duration::from_secs(5)),
//! )?;
//! // ... critical section ...
//! drop(handle);
//! # Ok::<(), pathlock::PathLockError>(())
//! ```

mod handle;
mod machine;
mod request;


pub use handle::ScopedLockHandle;
pub use request::{CancelFlag, LockRequest};

use crate::codec;
use crate::error::Result;
use crate::locker::PathLocker;
use crate::path::LockablePath;
use machine::{Acquisition, Backoff};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Sentinels currently held by one session, keyed by name.
#[derive(Debug, Default)]
pub(crate) struct OwnedLocks {
    entries: BTreeMap<String, LockablePath>,
}

impl OwnedLocks {
    fn covers(&self, path: &LockablePath) -> bool {
        self.entries.values().any(|held| held.contains(path))
    }

    fn names(&self) -> HashSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }
}

/// An identity that owns locks.
#[derive(Debug)]
pub struct LockSession {
    locker: PathLocker,
    id: Uuid,
    owned: Arc<Mutex<OwnedLocks>>,
}

impl LockSession {
    pub(crate) fn new(locker: PathLocker) -> Self {
        Self {
            locker,
            id: Uuid::new_v4(),
            owned: Arc::new(Mutex::new(OwnedLocks::default())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Paths this session currently holds sentinels for.
    pub fn held_paths(&self) -> Vec<LockablePath> {
        self.owned().entries.values().cloned().collect()
    }

    fn owned(&self) -> MutexGuard<'_, OwnedLocks> {
        self.owned.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Acquire the request's paths, blocking until they are free, the
    /// timeout passes, or the cancel flag is raised.
    ///
    /// # Returns
    ///
    /// * `Ok(ScopedLockHandle)` - Lock held until the handle is dropped or released
    /// * `Err(PathLockError::Timeout)` - Another session kept an overlapping lock
    /// * `Err(PathLockError::Cancelled)` - The request's cancel flag was raised
    /// * `Err(PathLockError::StorageFault)` - The lock directory is unusable
    pub fn acquire(&self, request: LockRequest) -> Result<ScopedLockHandle> {
        let normalizer = self.locker.normalizer();
        let primary = normalizer.normalize(&request.primary)?;
        if self.locker.is_lock_directory_path(&primary) {
            debug!(path = %primary, "target is inside the lock directory, nothing to lock");
            return Ok(ScopedLockHandle::noop(vec![primary]));
        }

        let mut requested = vec![primary];
        for co_path in &request.co_paths {
            let co_path = normalizer.normalize(co_path)?;
            if self.locker.is_lock_directory_path(&co_path) {
                debug!(path = %co_path, "skipping co-path inside the lock directory");
                continue;
            }
            requested.push(co_path);
        }

        let (targets, owned_names) = {
            let owned = self.owned();
            (reduce_targets(&requested, &owned), owned.names())
        };
        if targets.is_empty() {
            debug!(session = %self.id, paths = ?requested, "already held by this session");
            return Ok(ScopedLockHandle::noop(requested));
        }

        let names = targets
            .iter()
            .map(codec::encode)
            .collect::<Result<Vec<_>>>()?;

        let config = self.locker.config();
        let acquired = Acquisition {
            store: self.locker.store().as_ref(),
            clock: self.locker.clock().as_ref(),
            session: self.id,
            primary: &requested[0],
            targets: &targets,
            names: &names,
            owned: &owned_names,
            timeout: request.timeout.unwrap_or_else(|| config.timeout()),
            dead_lock: request.dead_lock.unwrap_or_else(|| config.dead_lock()),
            cancel: request.cancel.as_ref(),
            backoff: Backoff::new(config.retry_min_ms, config.retry_max_ms),
        }
        .run()?;

        {
            let mut owned = self.owned();
            for (name, path) in acquired.names.iter().zip(&targets) {
                owned.entries.insert(name.clone(), path.clone());
            }
        }
        info!(
            session = %self.id,
            paths = ?targets,
            waited_ms = acquired.waited.as_millis() as u64,
            attempts = acquired.attempts,
            "acquired lock"
        );

        Ok(ScopedLockHandle::new(
            requested,
            acquired.names,
            self.id,
            self.locker.store().clone(),
            self.locker.clock().clone(),
            self.owned.clone(),
        ))
    }

    /// Run `f` while holding the lock. The lock is released afterwards, also
    /// when `f` panics.
    pub fn with_lock<T, F>(&self, request: LockRequest, f: F) -> Result<T>
    where
        F: FnOnce(&ScopedLockHandle) -> T,
    {
        let mut handle = self.acquire(request)?;
        let value = f(&handle);
        handle.release()?;
        Ok(value)
    }
}

/// The paths that still need sentinels: duplicates, paths inside another
/// requested path, and paths the session already covers are dropped.
fn reduce_targets(requested: &[LockablePath], owned: &OwnedLocks) -> Vec<LockablePath> {
    let mut targets: Vec<LockablePath> = Vec::new();
    for path in requested {
        if owned.covers(path) || targets.iter().any(|target| target.contains(path)) {
            continue;
        }
        targets.retain(|target| !path.contains(target));
        targets.push(path.clone());
    }
    targets
}
