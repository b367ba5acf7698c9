//! Marker content written into each sentinel.
//!
//! The locking protocol only looks at a sentinel's existence and mtime. The
//! JSON written inside it records who took the lock so that a stuck lock can
//! be traced back to a process:
//! - `owner`: `user@HOST`
//! - `pid`: process ID of the holder
//! - `session`: ID of the [`LockSession`](crate::session::LockSession) that created it
//! - `path`: the locked path
//! - `created_at`: RFC3339 timestamp

use crate::error::{PathLockError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Metadata stored in sentinel files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelMetadata {
    /// Owner of the lock (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the lock holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Session that created the sentinel.
    pub session: Uuid,

    /// The locked path.
    pub path: PathBuf,

    /// Timestamp when the lock was created (RFC3339).
    pub created_at: DateTime<Utc>,
}

impl SentinelMetadata {
    pub fn new(session: Uuid, path: PathBuf, created_at: DateTime<Utc>) -> Self {
        Self {
            owner: get_owner_string(),
            pid: Some(std::process::id()),
            session,
            path,
            created_at,
        }
    }

    /// Parse metadata from sentinel content.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| PathLockError::Metadata(e.to_string()))
    }

    /// Serialize metadata to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PathLockError::Metadata(e.to_string()))
    }
}

/// Get the owner string for sentinel metadata.
fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
