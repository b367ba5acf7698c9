//! In-memory sentinel store.
//!
//! Behaves like [`FsSentinelStore`](super::FsSentinelStore) for a single
//! process and adds hooks for tests: staging sentinels with arbitrary
//! mtimes, one-shot fault injection, and sentinels that appear or vanish
//! right after the next successful create (a contender winning the
//! create/verify race, or deleting what it should not).

use super::{CreateOutcome, DeleteOutcome, SentinelStore};
use crate::clock::Clock;
use crate::error::{PathLockError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Store operation targeted by an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Create,
    Delete,
    List,
    Stat,
}

#[derive(Debug, Clone)]
struct Entry {
    content: String,
    mtime: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    fault: Option<(StoreOp, io::ErrorKind)>,
    after_create: Vec<(String, String)>,
    remove_after_create: Vec<String>,
}

pub struct MemorySentinelStore {
    location: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl std::fmt::Debug for MemorySentinelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySentinelStore")
            .field("location", &self.location)
            .field("state", &self.state)
            .finish()
    }
}

impl MemorySentinelStore {
    /// `location` is the lock directory the store pretends to be; new
    /// sentinels are stamped with `clock`.
    pub fn new<P: Into<PathBuf>>(location: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            location: location.into(),
            clock,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Put a sentinel in place directly, as a crashed holder would have left it.
    pub fn insert(&self, name: &str, content: &str, mtime: DateTime<Utc>) {
        self.state().entries.insert(
            name.to_string(),
            Entry {
                content: content.to_string(),
                mtime,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state().entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next call of `op` fail with `kind`.
    pub fn fail_next(&self, op: StoreOp, kind: io::ErrorKind) {
        self.state().fault = Some((op, kind));
    }

    /// Insert `name` right after the next successful create.
    pub fn insert_after_next_create(&self, name: &str, content: &str) {
        self.state()
            .after_create
            .push((name.to_string(), content.to_string()));
    }

    /// Remove `name` right after the next successful create.
    pub fn remove_after_next_create(&self, name: &str) {
        self.state().remove_after_create.push(name.to_string());
    }

    fn take_fault(state: &mut State, op: StoreOp) -> Option<io::Error> {
        match state.fault {
            Some((target, kind)) if target == op => {
                state.fault = None;
                Some(io::Error::from(kind))
            }
            _ => None,
        }
    }
}

impl SentinelStore for MemorySentinelStore {
    fn location(&self) -> &Path {
        &self.location
    }

    fn create_exclusive(&self, name: &str, content: &str) -> Result<CreateOutcome> {
        let now = self.clock.now();
        let mut state = self.state();
        if let Some(e) = Self::take_fault(&mut state, StoreOp::Create) {
            return Err(PathLockError::storage("create sentinel", self.location.join(name), e));
        }
        if state.entries.contains_key(name) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        state.entries.insert(
            name.to_string(),
            Entry {
                content: content.to_string(),
                mtime: now,
            },
        );
        for (racer, racer_content) in std::mem::take(&mut state.after_create) {
            state.entries.insert(
                racer,
                Entry {
                    content: racer_content,
                    mtime: now,
                },
            );
        }
        for victim in std::mem::take(&mut state.remove_after_create) {
            state.entries.remove(&victim);
        }
        Ok(CreateOutcome::Created)
    }

    fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        let mut state = self.state();
        if let Some(e) = Self::take_fault(&mut state, StoreOp::Delete) {
            return Err(PathLockError::storage("delete sentinel", self.location.join(name), e));
        }
        Ok(match state.entries.remove(name) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::AlreadyGone,
        })
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut state = self.state();
        if let Some(e) = Self::take_fault(&mut state, StoreOp::List) {
            return Err(PathLockError::storage("read lock directory", &self.location, e));
        }
        Ok(state.entries.keys().cloned().collect())
    }

    fn stat_mtime(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let mut state = self.state();
        if let Some(e) = Self::take_fault(&mut state, StoreOp::Stat) {
            return Err(PathLockError::storage("stat sentinel", self.location.join(name), e));
        }
        Ok(state.entries.get(name).map(|entry| entry.mtime))
    }

    fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .state()
            .entries
            .get(name)
            .map(|entry| entry.content.clone()))
    }

    fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(match self.state().entries.get_mut(name) {
            Some(entry) => {
                entry.mtime = at;
                true
            }
            None => false,
        })
    }
}
