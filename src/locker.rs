//! The locking engine.
//!
//! A [`PathLocker`] bundles the configuration with the three injected
//! collaborators: the [`SentinelStore`] holding the lock directory, the
//! [`Clock`] driving waits, and the [`PathNormalizer`] that turns caller
//! paths into [`LockablePath`] values. It is cheap to clone and can be
//! shared across threads.

use crate::clock::{Clock, SystemClock};
use crate::config::LockConfig;
use crate::error::Result;
use crate::path::{LexicalNormalizer, LockablePath, PathNormalizer};
use crate::session::{LockRequest, LockSession, ScopedLockHandle};
use crate::store::{FsSentinelStore, SentinelStore};
use std::path::Path;
use std::sync::Arc;

struct Inner {
    config: LockConfig,
    store: Arc<dyn SentinelStore>,
    clock: Arc<dyn Clock>,
    normalizer: Arc<dyn PathNormalizer>,
}

#[derive(Clone)]
pub struct PathLocker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PathLocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathLocker")
            .field("lock_dir", &self.inner.store.location())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl PathLocker {
    /// Engine over the configured lock directory with the real clock.
    pub fn new(config: LockConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(FsSentinelStore::new(config.resolved_lock_dir()));
        Ok(Self::with_parts(
            config,
            store,
            Arc::new(SystemClock),
            Arc::new(LexicalNormalizer),
        ))
    }

    /// Engine over explicit collaborators; `config.lock_dir` is ignored in
    /// favour of the store's location.
    pub fn with_parts(
        config: LockConfig,
        store: Arc<dyn SentinelStore>,
        clock: Arc<dyn Clock>,
        normalizer: Arc<dyn PathNormalizer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                clock,
                normalizer,
            }),
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn SentinelStore> {
        &self.inner.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn normalizer(&self) -> &dyn PathNormalizer {
        self.inner.normalizer.as_ref()
    }

    pub fn lock_dir(&self) -> &Path {
        self.inner.store.location()
    }

    /// Start a new session. Locks are re-entrant within a session only.
    pub fn session(&self) -> LockSession {
        LockSession::new(self.clone())
    }

    /// Acquire through a fresh one-shot session.
    ///
    /// Two calls on overlapping paths exclude each other even from the same
    /// thread; use [`PathLocker::session`] for re-entrant locking.
    pub fn acquire(&self, request: LockRequest) -> Result<ScopedLockHandle> {
        self.session().acquire(request)
    }

    /// Whether `path` is the lock directory or lies inside it.
    ///
    /// Paths that cannot be normalized are reported as outside.
    pub fn is_inside_lock_directory<P: AsRef<Path>>(&self, path: P) -> bool {
        match self.normalizer().normalize(path.as_ref()) {
            Ok(path) => self.is_lock_directory_path(&path),
            Err(_) => false,
        }
    }

    pub(crate) fn is_lock_directory_path(&self, path: &LockablePath) -> bool {
        match self.normalizer().normalize(self.lock_dir()) {
            Ok(lock_dir) => lock_dir.contains(path),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::PathLockError;
    use crate::session::CancelFlag;
    use crate::store::MemorySentinelStore;
    use crate::test_support::create_fs_locker;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn memory_locker() -> PathLocker {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemorySentinelStore::new("/var/lock/pathlock", clock.clone()));
        PathLocker::with_parts(LockConfig::default(), store, clock, Arc::new(LexicalNormalizer))
    }

    #[test]
    fn test_lock_directory_detection() {
        let locker = memory_locker();

        assert!(locker.is_inside_lock_directory("/var/lock/pathlock"));
        assert!(locker.is_inside_lock_directory("/var/lock/pathlock/@a.lock"));
        assert!(locker.is_inside_lock_directory("/var/lock/other/../pathlock/x"));
        assert!(!locker.is_inside_lock_directory("/var/lock/pathlock-old"));
        assert!(!locker.is_inside_lock_directory("/var/lock"));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = LockConfig {
            dead_lock_seconds: 0,
            ..LockConfig::default()
        };
        assert!(PathLocker::new(config).is_err());
    }

    #[test]
    fn test_new_uses_configured_lock_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = LockConfig {
            lock_dir: Some(temp_dir.path().join("locks")),
            ..LockConfig::default()
        };
        let locker = PathLocker::new(config).unwrap();
        assert_eq!(locker.lock_dir(), temp_dir.path().join("locks"));
    }

    #[test]
    fn test_fs_lock_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let locker = create_fs_locker(temp_dir.path());
        let sentinel = temp_dir.path().join("locks").join("@data@proj.lock");

        let handle = locker.acquire(LockRequest::new("/data/proj")).unwrap();
        assert!(sentinel.exists());

        let content = std::fs::read_to_string(&sentinel).unwrap();
        assert!(content.contains("\"path\": \"/data/proj\""));

        drop(handle);
        assert!(!sentinel.exists());
    }

    #[test]
    fn test_fs_overlapping_request_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let locker = create_fs_locker(temp_dir.path());
        let _held = locker.acquire(LockRequest::new("/data/proj")).unwrap();

        let err = locker
            .acquire(LockRequest::new("/data/proj/file.txt").timeout(Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, PathLockError::Timeout { .. }));

        let entries = std::fs::read_dir(temp_dir.path().join("locks")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_fs_stale_sentinel_is_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let locker = create_fs_locker(temp_dir.path());
        let lock_dir = temp_dir.path().join("locks");
        std::fs::create_dir_all(&lock_dir).unwrap();

        let stale = lock_dir.join("@data@proj.lock");
        let file = File::create(&stale).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(2 * 3600))
            .unwrap();
        drop(file);

        let handle = locker
            .acquire(LockRequest::new("/data/proj/file.txt").timeout(Duration::from_secs(1)))
            .unwrap();
        assert!(!stale.exists());
        assert!(lock_dir.join("@data@proj@file.txt.lock").exists());
        drop(handle);
    }

    #[test]
    fn test_fs_threads_exclude_each_other() {
        let temp_dir = TempDir::new().unwrap();
        let locker = create_fs_locker(temp_dir.path());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let locker = locker.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                // Alternate between a directory and a file inside it.
                let target = if i % 2 == 0 { "/shared" } else { "/shared/item" };
                thread::spawn(move || {
                    for _ in 0..5 {
                        let handle = locker
                            .acquire(LockRequest::new(target).timeout(Duration::from_secs(20)))
                            .unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        drop(handle);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        let leftover = std::fs::read_dir(temp_dir.path().join("locks")).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn test_fs_cancel_from_another_thread_stops_waiting() {
        let temp_dir = TempDir::new().unwrap();
        let locker = create_fs_locker(temp_dir.path());
        let _held = locker.acquire(LockRequest::new("/shared")).unwrap();
        let flag = CancelFlag::new();

        let waiter = {
            let locker = locker.clone();
            let flag = flag.clone();
            thread::spawn(move || {
                let started = std::time::Instant::now();
                let result = locker.acquire(
                    LockRequest::new("/shared/item")
                        .timeout(Duration::from_secs(30))
                        .cancel_on(flag),
                );
                (result, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        flag.cancel();
        let (result, waited) = waiter.join().unwrap();

        assert!(matches!(result, Err(PathLockError::Cancelled { .. })));
        assert!(waited < Duration::from_secs(10));
        let entries = std::fs::read_dir(temp_dir.path().join("locks")).unwrap().count();
        assert_eq!(entries, 1);
    }
}
