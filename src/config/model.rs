//! LockConfig struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the path-locking engine.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    // =========================================================================
    // Location
    // =========================================================================
    /// Lock directory override (default: `<temp>/pathlock`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,

    // =========================================================================
    // Acquisition budget
    // =========================================================================
    /// Maximum total wait for a single acquisition.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Age after which a sentinel is presumed orphaned and may be reclaimed.
    #[serde(default = "default_dead_lock_seconds")]
    pub dead_lock_seconds: u64,

    // =========================================================================
    // Retry backoff
    // =========================================================================
    /// Initial inter-retry sleep in milliseconds.
    #[serde(default = "default_retry_min_ms")]
    pub retry_min_ms: u64,

    /// Upper bound on the inter-retry sleep in milliseconds.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_dir: None,
            timeout_seconds: default_timeout_seconds(),
            dead_lock_seconds: default_dead_lock_seconds(),
            retry_min_ms: default_retry_min_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}
