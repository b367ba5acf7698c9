//! Configuration constants and defaults for pathlock.
//!
//! This module defines the environment variable names and default value
//! functions used by the LockConfig struct.

use std::path::PathBuf;

/// Environment variable overriding the lock directory.
pub const ENV_LOCK_DIR: &str = "PATHLOCK_DIR";

/// Environment variable overriding `timeout_seconds`.
pub const ENV_TIMEOUT_SECONDS: &str = "PATHLOCK_TIMEOUT_SECONDS";

/// Environment variable overriding `dead_lock_seconds`.
pub const ENV_DEAD_LOCK_SECONDS: &str = "PATHLOCK_DEAD_LOCK_SECONDS";

/// Name of the lock directory created under the system temp directory.
pub const DEFAULT_LOCK_DIR_NAME: &str = "pathlock";

/// Host-wide default lock directory (`<temp>/pathlock`).
pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_LOCK_DIR_NAME)
}

// Default value functions for serde
pub(crate) fn default_timeout_seconds() -> u64 {
    30
}
pub(crate) fn default_dead_lock_seconds() -> u64 {
    3600
}
pub(crate) fn default_retry_min_ms() -> u64 {
    25
}
pub(crate) fn default_retry_max_ms() -> u64 {
    500
}
