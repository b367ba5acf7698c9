//! RAII handle for held locks.
//!
//! When dropped, the handle's sentinels are deleted and the owning session
//! forgets them. If deletion fails during drop, a warning is logged but no
//! panic occurs. Use [`ScopedLockHandle::release`] to release early and see
//! the error.
//!
//! A sentinel is only deleted or touched while its marker still names the
//! owning session. Once another session has reclaimed the path and written
//! its own sentinel under the same name, this handle leaves it alone.

use super::OwnedLocks;
use crate::clock::Clock;
use crate::error::Result;
use crate::metadata::SentinelMetadata;
use crate::path::LockablePath;
use crate::store::{DeleteOutcome, SentinelStore};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

struct Held {
    session: Uuid,
    store: Arc<dyn SentinelStore>,
    clock: Arc<dyn Clock>,
    owned: Arc<Mutex<OwnedLocks>>,
    names: Vec<String>,
}

/// A held lock, released when dropped.
#[must_use = "the lock is released as soon as the handle is dropped"]
pub struct ScopedLockHandle {
    paths: Vec<LockablePath>,
    held: Option<Held>,
}

impl std::fmt::Debug for ScopedLockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedLockHandle")
            .field("paths", &self.paths)
            .field("sentinels", &self.held.as_ref().map(|held| &held.names))
            .finish()
    }
}

impl ScopedLockHandle {
    pub(crate) fn new(
        paths: Vec<LockablePath>,
        names: Vec<String>,
        session: Uuid,
        store: Arc<dyn SentinelStore>,
        clock: Arc<dyn Clock>,
        owned: Arc<Mutex<OwnedLocks>>,
    ) -> Self {
        Self {
            paths,
            held: Some(Held {
                session,
                store,
                clock,
                owned,
                names,
            }),
        }
    }

    /// A handle that owns nothing: the request was already covered by the
    /// session, or targeted the lock directory itself.
    pub(crate) fn noop(paths: Vec<LockablePath>) -> Self {
        Self { paths, held: None }
    }

    /// Paths this handle was acquired for.
    pub fn paths(&self) -> &[LockablePath] {
        &self.paths
    }

    /// Sentinel names this handle owns (empty once released or for no-op handles).
    pub fn sentinels(&self) -> &[String] {
        self.held
            .as_ref()
            .map(|held| held.names.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_noop(&self) -> bool {
        self.held.is_none()
    }

    /// Refresh the mtime of the owned sentinels.
    ///
    /// Returns `false` if any of them has been reclaimed in the meantime.
    /// Sentinels now owned by another session are not touched.
    pub fn touch(&self) -> Result<bool> {
        let Some(held) = &self.held else {
            return Ok(true);
        };
        let now = held.clock.now();
        let mut all_present = true;
        for name in &held.names {
            all_present &= held.owns(name)? && held.store.touch(name, now)?;
        }
        Ok(all_present)
    }

    /// Release the lock now. Calling it again, or dropping afterwards, does nothing.
    pub fn release(&mut self) -> Result<()> {
        match self.held.take() {
            Some(held) => held.release(),
            None => Ok(()),
        }
    }
}

impl Held {
    /// Whether `name` still exists and carries this session's marker.
    fn owns(&self, name: &str) -> Result<bool> {
        let Some(content) = self.store.read(name)? else {
            return Ok(false);
        };
        Ok(SentinelMetadata::from_json(&content)
            .is_ok_and(|meta| meta.session == self.session))
    }

    fn release_one(&self, name: &str) -> Result<()> {
        if !self.owns(name)? {
            warn!(sentinel = %name, "lock was reclaimed by another session while held");
            return Ok(());
        }
        if self.store.delete(name)? == DeleteOutcome::AlreadyGone {
            warn!(sentinel = %name, "lock was reclaimed by another session while held");
        }
        Ok(())
    }

    fn release(self) -> Result<()> {
        {
            let mut owned = self.owned.lock().unwrap_or_else(|poison| poison.into_inner());
            for name in &self.names {
                owned.remove(name);
            }
        }

        let mut first_error = None;
        for name in &self.names {
            if let Err(e) = self.release_one(name) {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(sentinels = ?self.names, "released lock");
                Ok(())
            }
        }
    }
}

impl Drop for ScopedLockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(paths = ?self.paths, error = %e, "failed to release lock");
        }
    }
}
