//! Sentinel store backed by a real directory.
//!
//! Sentinels are created using **create_new** semantics (exclusive create),
//! which is the only thing that decides who wins a contended lock. The
//! directory is created on the first write and never removed.

use super::{CreateOutcome, DeleteOutcome, SentinelStore};
use crate::error::{PathLockError, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct FsSentinelStore {
    dir: PathBuf,
}

impl FsSentinelStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn sentinel_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .map_err(|e| PathLockError::storage("create lock directory", &self.dir, e))?;
        }
        Ok(())
    }
}

impl SentinelStore for FsSentinelStore {
    fn location(&self) -> &Path {
        &self.dir
    }

    fn create_exclusive(&self, name: &str, content: &str) -> Result<CreateOutcome> {
        self.ensure_dir()?;
        let path = self.sentinel_path(name);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Ok(CreateOutcome::AlreadyExists);
            }
            Err(e) => return Err(PathLockError::storage("create sentinel", path, e)),
        };

        // A sentinel left without its marker would still hold the lock, so
        // clean it up on failure before surfacing the error.
        if let Err(e) = file.write_all(content.as_bytes()) {
            let _ = fs::remove_file(&path);
            return Err(PathLockError::storage("write sentinel", path, e));
        }
        if let Err(e) = file.sync_all() {
            let _ = fs::remove_file(&path);
            return Err(PathLockError::storage("sync sentinel", path, e));
        }

        Ok(CreateOutcome::Created)
    }

    fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        let path = self.sentinel_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(PathLockError::storage("delete sentinel", path, e)),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PathLockError::storage("read lock directory", &self.dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| PathLockError::storage("read lock directory", &self.dir, e))?;
            // Non-UTF-8 names can never be sentinels.
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn stat_mtime(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let path = self.sentinel_path(name);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PathLockError::storage("stat sentinel", path, e)),
        };
        let modified = metadata
            .modified()
            .map_err(|e| PathLockError::storage("read mtime of", &path, e))?;
        Ok(Some(DateTime::<Utc>::from(modified)))
    }

    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.sentinel_path(name);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PathLockError::storage("read sentinel", path, e)),
        }
    }

    fn touch(&self, name: &str, at: DateTime<Utc>) -> Result<bool> {
        let path = self.sentinel_path(name);
        let file = match OpenOptions::new().write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(PathLockError::storage("open sentinel", path, e)),
        };
        file.set_modified(SystemTime::from(at))
            .map_err(|e| PathLockError::storage("set mtime of", &path, e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, FsSentinelStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSentinelStore::new(temp_dir.path().join("locks"));
        (temp_dir, store)
    }

    #[test]
    fn test_lock_directory_is_created_lazily() {
        let (_temp_dir, store) = create_test_store();
        assert!(!store.location().exists());
        assert!(store.list().unwrap().is_empty());

        store.create_exclusive("@a.lock", "{}").unwrap();
        assert!(store.location().is_dir());
    }

    #[test]
    fn test_create_exclusive_reports_existing_sentinel() {
        let (_temp_dir, store) = create_test_store();

        assert_eq!(
            store.create_exclusive("@a.lock", "first").unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            store.create_exclusive("@a.lock", "second").unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(store.read("@a.lock").unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn test_delete_twice_is_a_race_not_an_error() {
        let (_temp_dir, store) = create_test_store();
        store.create_exclusive("@a.lock", "x").unwrap();

        assert_eq!(store.delete("@a.lock").unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.delete("@a.lock").unwrap(), DeleteOutcome::AlreadyGone);
        assert_eq!(store.stat_mtime("@a.lock").unwrap(), None);
        assert_eq!(store.read("@a.lock").unwrap(), None);
    }

    #[test]
    fn test_list_returns_sorted_names() {
        let (_temp_dir, store) = create_test_store();
        store.create_exclusive("@b.lock", "x").unwrap();
        store.create_exclusive("@a.lock", "x").unwrap();

        assert_eq!(store.list().unwrap(), vec!["@a.lock", "@b.lock"]);
    }

    #[test]
    fn test_touch_sets_mtime() {
        let (_temp_dir, store) = create_test_store();
        store.create_exclusive("@a.lock", "x").unwrap();

        let past = Utc::now() - chrono::Duration::hours(3);
        assert!(store.touch("@a.lock", past).unwrap());

        let mtime = store.stat_mtime("@a.lock").unwrap().unwrap();
        assert!((mtime - past).num_seconds().abs() <= 1);
        assert!(!store.touch("@missing.lock", past).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_create_in_unwritable_directory_is_a_storage_fault() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp_dir, store) = create_test_store();
        fs::create_dir_all(store.location()).unwrap();
        fs::set_permissions(store.location(), fs::Permissions::from_mode(0o500)).unwrap();

        let result = store.create_exclusive("@a.lock", "x");
        fs::set_permissions(store.location(), fs::Permissions::from_mode(0o700)).unwrap();

        // Root ignores directory permissions, so only check when it applied.
        if let Err(err) = result {
            assert!(matches!(err, PathLockError::StorageFault { .. }));
        }
    }
}
