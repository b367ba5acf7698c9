//! The acquisition retry loop as an explicit state machine.
//!
//! ```text
//! Scanning ──conflicts──> ConflictWait ──all stale──> Scanning
//!    │                         └──still held──> Backoff ──> Scanning
//!    └──clear──> Creating ──lost race──> Scanning
//!                   └──created──> Verifying ──clean──> Acquired
//!                                     └──foreign overlap──> Backoff
//! ```
//!
//! The deadline is checked every time the loop re-enters `Scanning`, and the
//! cancel flag on every step. Sentinels created by an attempt are held in a
//! [`PendingSentinels`] guard until verification passes, so every early exit
//! (error, timeout, cancellation) removes them.

use super::request::CancelFlag;
use crate::clock::{Clock, elapsed_between};
use crate::error::{PathLockError, Result};
use crate::metadata::SentinelMetadata;
use crate::path::LockablePath;
use crate::reclaim::StaleLockReclaimer;
use crate::scan::{Conflict, ConflictScanner};
use crate::store::{CreateOutcome, DeleteOutcome, SentinelStore};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Everything one acquisition needs.
pub(crate) struct Acquisition<'a> {
    pub store: &'a dyn SentinelStore,
    pub clock: &'a dyn Clock,
    pub session: Uuid,
    /// The path the caller asked for, named in `Timeout` and `Cancelled`.
    /// It may be absent from `targets` when a co-path contains it.
    pub primary: &'a LockablePath,
    /// Paths to lock, in request order.
    pub targets: &'a [LockablePath],
    /// Sentinel names of `targets`, same order.
    pub names: &'a [String],
    /// Sentinels the session already holds.
    pub owned: &'a HashSet<String>,
    pub timeout: Duration,
    pub dead_lock: Duration,
    pub cancel: Option<&'a CancelFlag>,
    pub backoff: Backoff,
}

/// Result of a successful run.
#[derive(Debug)]
pub(crate) struct Acquired {
    pub names: Vec<String>,
    pub waited: Duration,
    pub attempts: u32,
}

enum State<'a> {
    Scanning,
    ConflictWait(Vec<Conflict>),
    Creating,
    Verifying(PendingSentinels<'a>),
    Backoff,
}

impl State<'_> {
    fn label(&self) -> &'static str {
        match self {
            State::Scanning => "scanning",
            State::ConflictWait(_) => "conflict_wait",
            State::Creating => "creating",
            State::Verifying(_) => "verifying",
            State::Backoff => "backoff",
        }
    }
}

impl<'a> Acquisition<'a> {
    pub fn run(mut self) -> Result<Acquired> {
        let started = self.clock.now();
        let primary = self.primary;
        let mut contended = primary.clone();
        let mut attempts = 0u32;
        let mut state = State::Scanning;

        loop {
            if self.cancel.is_some_and(CancelFlag::is_cancelled) {
                debug!(path = %primary, state = state.label(), "acquisition cancelled");
                return Err(PathLockError::Cancelled {
                    path: primary.as_path().to_path_buf(),
                });
            }

            state = match state {
                State::Scanning => {
                    let waited = elapsed_between(started, self.clock.now());
                    if attempts > 0 && waited >= self.timeout {
                        debug!(path = %contended, ?waited, "acquisition timed out");
                        return Err(PathLockError::Timeout {
                            path: contended.as_path().to_path_buf(),
                            waited,
                        });
                    }
                    attempts += 1;

                    let conflicts = self.scanner().scan(self.targets, self.owned)?;
                    if conflicts.is_empty() {
                        State::Creating
                    } else {
                        State::ConflictWait(conflicts)
                    }
                }
                State::ConflictWait(conflicts) => {
                    let reclaimer = StaleLockReclaimer::new(self.store, self.clock, self.dead_lock);
                    let held = reclaimer.reclaim(conflicts)?;
                    match held.first() {
                        None => State::Scanning,
                        Some(conflict) => {
                            debug!(path = %primary, held_by = %conflict.path, "waiting on conflicting lock");
                            contended = conflict.path.clone();
                            State::Backoff
                        }
                    }
                }
                State::Creating => match self.create_all()? {
                    Some(pending) => State::Verifying(pending),
                    None => {
                        debug!(path = %primary, "lost create race");
                        State::Scanning
                    }
                },
                State::Verifying(pending) => {
                    if let Some(missing) = pending.first_missing()? {
                        return Err(PathLockError::IntegrityViolation(format!(
                            "sentinel '{}' disappeared right after it was created",
                            missing
                        )));
                    }

                    let mut owned = self.owned.clone();
                    owned.extend(pending.names.iter().cloned());
                    let conflicts = self.scanner().scan(self.targets, &owned)?;

                    match conflicts.first() {
                        None => {
                            return Ok(Acquired {
                                names: pending.disarm(),
                                waited: elapsed_between(started, self.clock.now()),
                                attempts,
                            });
                        }
                        Some(conflict) => {
                            debug!(path = %primary, racer = %conflict.path, "lost verify race, backing off");
                            contended = conflict.path.clone();
                            pending.release()?;
                            State::Backoff
                        }
                    }
                }
                State::Backoff => {
                    let remaining = self
                        .timeout
                        .saturating_sub(elapsed_between(started, self.clock.now()));
                    let delay = self.backoff.next_delay().min(remaining);
                    if !delay.is_zero() {
                        self.clock.sleep(delay);
                    }
                    State::Scanning
                }
            };
        }
    }

    fn scanner(&self) -> ConflictScanner<'a> {
        ConflictScanner::new(self.store)
    }

    /// Create one sentinel per target, in order. `None` if any of them already exists,
    /// in which case the ones created so far are removed again.
    fn create_all(&self) -> Result<Option<PendingSentinels<'a>>> {
        let mut pending = PendingSentinels::new(self.store);
        let created_at = self.clock.now();

        for (path, name) in self.targets.iter().zip(self.names) {
            let content = self.marker(path, created_at)?;
            match self.store.create_exclusive(name, &content)? {
                CreateOutcome::Created => pending.names.push(name.clone()),
                CreateOutcome::AlreadyExists => {
                    pending.release()?;
                    return Ok(None);
                }
            }
        }

        Ok(Some(pending))
    }

    fn marker(&self, path: &LockablePath, created_at: DateTime<Utc>) -> Result<String> {
        SentinelMetadata::new(self.session, path.as_path().to_path_buf(), created_at).to_json()
    }
}

/// Sentinels created by the current attempt but not yet verified.
///
/// Dropping the guard deletes them.
pub(crate) struct PendingSentinels<'a> {
    store: &'a dyn SentinelStore,
    names: Vec<String>,
}

impl<'a> PendingSentinels<'a> {
    fn new(store: &'a dyn SentinelStore) -> Self {
        Self {
            store,
            names: Vec::new(),
        }
    }

    fn first_missing(&self) -> Result<Option<&str>> {
        for name in &self.names {
            if self.store.stat_mtime(name)?.is_none() {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    /// Delete every pending sentinel. All deletes are attempted; the first
    /// failure is returned.
    fn release(mut self) -> Result<()> {
        let mut first_error = None;
        for name in std::mem::take(&mut self.names) {
            match self.store.delete(&name) {
                Ok(DeleteOutcome::Deleted) => {}
                Ok(DeleteOutcome::AlreadyGone) => {
                    debug!(sentinel = %name, "pending sentinel already gone")
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Keep the sentinels: ownership passes to the caller.
    fn disarm(mut self) -> Vec<String> {
        std::mem::take(&mut self.names)
    }
}

impl Drop for PendingSentinels<'_> {
    fn drop(&mut self) {
        for name in self.names.drain(..) {
            if let Err(e) = self.store.delete(&name) {
                warn!(sentinel = %name, error = %e, "failed to remove partially created sentinel");
            }
        }
    }
}

/// Randomized exponential backoff between retries.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    current_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        let min_ms = min_ms.max(1);
        Self {
            current_ms: min_ms,
            max_ms: max_ms.max(min_ms),
        }
    }

    /// A delay in `[current/2, current]`; `current` doubles up to the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let half = self.current_ms / 2;
        let jitter = rand::thread_rng().gen_range(0..=self.current_ms - half);
        let delay = Duration::from_millis(half + jitter);
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        delay
    }
}
