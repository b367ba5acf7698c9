//! Error types for pathlock.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Lost races against other contenders never surface here: the store reports
//! them as [`CreateOutcome::AlreadyExists`](crate::store::CreateOutcome) and
//! [`DeleteOutcome::AlreadyGone`](crate::store::DeleteOutcome) and the
//! acquisition loop absorbs them.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for pathlock operations.
#[derive(Error, Debug)]
pub enum PathLockError {
    /// The wall-clock budget ran out while another session held an overlapping lock.
    #[error("timed out after {waited:?} waiting for lock on '{}'", path.display())]
    Timeout { path: PathBuf, waited: Duration },

    /// The caller's cancel flag was raised while waiting.
    #[error("lock acquisition for '{}' was cancelled", path.display())]
    Cancelled { path: PathBuf },

    /// Post-create verification found the lock directory in a state that the
    /// protocol cannot explain.
    #[error("lock integrity violation: {0}")]
    IntegrityViolation(String),

    /// The lock directory rejected an operation for a reason other than a lost race.
    #[error("failed to {action} '{}': {source}", target.display())]
    StorageFault {
        action: &'static str,
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The path cannot be used as a lock target.
    #[error("invalid lock path: {0}")]
    InvalidPath(String),

    /// The encoded sentinel name would not fit in a single filename.
    #[error("sentinel name for '{}' is {len} bytes, exceeding the {max} byte filename limit", path.display())]
    NameTooLong { path: PathBuf, len: usize, max: usize },

    /// Configuration could not be read or failed validation.
    #[error("{0}")]
    Config(String),

    /// A sentinel's marker content could not be parsed or produced.
    #[error("invalid sentinel metadata: {0}")]
    Metadata(String),
}

impl PathLockError {
    /// Whether retrying the same request later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PathLockError::Timeout { .. } | PathLockError::Cancelled { .. }
        )
    }

    pub(crate) fn storage(action: &'static str, target: impl Into<PathBuf>, source: io::Error) -> Self {
        PathLockError::StorageFault {
            action,
            target: target.into(),
            source,
        }
    }
}

/// Result type alias for pathlock operations.
pub type Result<T> = std::result::Result<T, PathLockError>;
