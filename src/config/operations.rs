//! Config loading, validation, and override operations.

use super::model::LockConfig;
use super::types::{ENV_DEAD_LOCK_SECONDS, ENV_LOCK_DIR, ENV_TIMEOUT_SECONDS, default_lock_dir};
use crate::error::{PathLockError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

impl LockConfig {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML file
    ///
    /// # Returns
    ///
    /// * `Ok(LockConfig)` - Successfully loaded and validated config
    /// * `Err(PathLockError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            PathLockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LockConfig = serde_yaml::from_str(yaml)
            .map_err(|e| PathLockError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Default config with `PATHLOCK_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| PathLockError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Apply overrides from a key lookup (normally the process environment).
    ///
    /// Empty values are ignored. The result is re-validated.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_LOCK_DIR) {
            self.lock_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(value) = get(ENV_TIMEOUT_SECONDS) {
            self.timeout_seconds = parse_seconds(ENV_TIMEOUT_SECONDS, &value)?;
        }
        if let Some(value) = get(ENV_DEAD_LOCK_SECONDS) {
            self.dead_lock_seconds = parse_seconds(ENV_DEAD_LOCK_SECONDS, &value)?;
        }

        self.validate()
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `dead_lock_seconds` must be positive
    /// - `retry_min_ms` must be positive and not above `retry_max_ms`
    /// - `lock_dir`, when set, must be absolute
    pub fn validate(&self) -> Result<()> {
        if self.dead_lock_seconds == 0 {
            return Err(PathLockError::Config(
                "config validation failed: dead_lock_seconds must be greater than 0".to_string(),
            ));
        }

        if self.retry_min_ms == 0 {
            return Err(PathLockError::Config(
                "config validation failed: retry_min_ms must be greater than 0".to_string(),
            ));
        }

        if self.retry_min_ms > self.retry_max_ms {
            return Err(PathLockError::Config(format!(
                "config validation failed: retry_min_ms ({}) must not exceed retry_max_ms ({})",
                self.retry_min_ms, self.retry_max_ms
            )));
        }

        if let Some(dir) = &self.lock_dir
            && !dir.is_absolute()
        {
            return Err(PathLockError::Config(format!(
                "config validation failed: lock_dir must be an absolute path (found '{}')",
                dir.display()
            )));
        }

        Ok(())
    }

    /// The effective lock directory.
    pub fn resolved_lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(default_lock_dir)
    }

    /// `timeout_seconds` as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// `dead_lock_seconds` as a [`Duration`].
    pub fn dead_lock(&self) -> Duration {
        Duration::from_secs(self.dead_lock_seconds)
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        PathLockError::Config(format!(
            "invalid value for {}: expected whole seconds, found '{}'",
            key, value
        ))
    })
}
