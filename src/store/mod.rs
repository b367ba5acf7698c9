//! Access to the shared lock directory.
//!
//! The locking protocol never touches the filesystem directly; it goes through
//! a [`SentinelStore`]. [`FsSentinelStore`] is the production implementation
//! backed by real files. [`MemorySentinelStore`] keeps sentinels in memory so
//! tests can stage crashed holders, backdate mtimes and inject faults.
//!
//! Two outcomes are races rather than errors and are reported as values:
//! creating a sentinel that already exists, and deleting one that is already
//! gone. Every other failure is a [`PathLockError::StorageFault`].
//!
//! [`PathLockError::StorageFault`]: crate::error::PathLockError::StorageFault

mod fs;
mod memory;

pub use fs::FsSentinelStore;
pub use memory::{MemorySentinelStore, StoreOp};

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Result of an exclusive create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Another contender holds a sentinel with this name.
    AlreadyExists,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Somebody else removed it first.
    AlreadyGone,
}

/// Shared-state capability over the lock directory.
pub trait SentinelStore: Send + Sync {
    /// The lock directory this store manages.
    fn location(&self) -> &Path;

    /// Create `name` with `content` only if it does not exist yet.
    fn create_exclusive(&self, name: &str, content: &str) -> Result<CreateOutcome>;

    fn delete(&self, name: &str) -> Result<DeleteOutcome>;

    /// Names of every entry currently in the lock directory.
    fn list(&self) -> Result<Vec<String>>;

    /// Last-modified time, `None` if the sentinel no longer exists.
    fn stat_mtime(&self, name: &str) -> Result<Option<DateTime<Utc>>>;

    /// Marker content, `None` if the sentinel no longer exists.
    fn read(&self, name: &str) -> Result<Option<String>>;

    /// Set the mtime of an existing sentinel. Returns `false` if it is gone.
    fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<bool>;
}
