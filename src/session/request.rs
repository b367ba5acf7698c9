//! What a caller asks for when acquiring a lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A lock request: a primary path, optional co-paths locked together with
/// it, and per-request overrides of the configured budget.
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub(crate) primary: PathBuf,
    pub(crate) co_paths: Vec<PathBuf>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) dead_lock: Option<Duration>,
    pub(crate) cancel: Option<CancelFlag>,
}

impl LockRequest {
    pub fn new<P: Into<PathBuf>>(primary: P) -> Self {
        Self {
            primary: primary.into(),
            co_paths: Vec::new(),
            timeout: None,
            dead_lock: None,
            cancel: None,
        }
    }

    /// Also lock `path` as part of the same acquisition.
    pub fn co_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.co_paths.push(path.into());
        self
    }

    pub fn co_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.co_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Maximum total wait (default: `timeout_seconds` from config).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Staleness threshold (default: `dead_lock_seconds` from config).
    pub fn dead_lock(mut self, dead_lock: Duration) -> Self {
        self.dead_lock = Some(dead_lock);
        self
    }

    /// Abort waiting once `flag` is raised.
    pub fn cancel_on(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }
}

/// Shared flag used to abort an acquisition from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_co_paths() {
        let request = LockRequest::new("/x")
            .co_path("/y")
            .co_paths(["/z", "/w"])
            .timeout(Duration::from_secs(2));

        assert_eq!(request.primary(), Path::new("/x"));
        assert_eq!(request.co_paths.len(), 3);
        assert_eq!(request.timeout, Some(Duration::from_secs(2)));
        assert_eq!(request.dead_lock, None);
    }

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());

        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
