//! Configuration model for pathlock.
//!
//! This module defines the [`LockConfig`] struct that controls where sentinels
//! live and how long acquisition waits. It supports forward-compatible YAML
//! parsing (unknown fields are ignored), sensible defaults for optional fields,
//! environment overrides, and validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::LockConfig;
pub use types::{ENV_DEAD_LOCK_SECONDS, ENV_LOCK_DIR, ENV_TIMEOUT_SECONDS, default_lock_dir};
