use crate::config::LockConfig;
use crate::locker::PathLocker;
use std::path::Path;
use std::sync::{LazyLock, Mutex, MutexGuard};

static ENV_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Sets environment variables for the lifetime of the guard.
pub(crate) struct EnvGuard {
    original: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    pub(crate) fn new(vars: &[(&str, &str)]) -> Self {
        // The process environment is global and not thread-safe.
        // Lock it so tests don't race even if a #[serial] annotation is missed.
        let lock = ENV_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut original = Vec::with_capacity(vars.len());
        for (key, value) in vars {
            original.push((key.to_string(), std::env::var(key).ok()));
            unsafe { std::env::set_var(key, value) };
        }
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.original {
            match value {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
    }
}

/// A locker over `<dir>/locks` with short retry delays.
pub(crate) fn create_fs_locker(dir: &Path) -> PathLocker {
    let config = LockConfig {
        lock_dir: Some(dir.join("locks")),
        timeout_seconds: 5,
        retry_min_ms: 1,
        retry_max_ms: 10,
        ..LockConfig::default()
    };
    PathLocker::new(config).unwrap()
}
