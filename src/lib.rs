//! pathlock: advisory cross-process path locking.
//!
//! Locks are coordinated through a shared lock directory only: every held
//! lock is a sentinel file whose name encodes the locked path, created with
//! exclusive-create semantics. Locking a directory conflicts with locking
//! anything inside it. Sentinels left by crashed holders are reclaimed once
//! they are older than `dead_lock_seconds`, and held locks are released when
//! their [`ScopedLockHandle`] is dropped.
//!
//! ```no_run
//! use pathlock::{LockConfig, LockRequest, PathLocker};
//!
//! let locker = PathLocker::new(LockConfig::from_env()?)?;
//! let handle = locker.acquire(LockRequest::new("/data/proj"))?;
//! // ... work on /data/proj ...
//! drop(handle);
//! # Ok::<(), pathlock::PathLockError>(())
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod inspect;
mod locker;
pub mod metadata;
pub mod path;
pub mod reclaim;
pub mod scan;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::LockConfig;
pub use error::{PathLockError, Result};
pub use locker::PathLocker;
pub use path::{LexicalNormalizer, LockablePath, PathNormalizer};
pub use session::{CancelFlag, LockRequest, LockSession, ScopedLockHandle};
