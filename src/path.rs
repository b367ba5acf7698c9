//! Lockable path values and the normalization seam.
//!
//! A [`LockablePath`] is an absolute, lexically normalized path. Conflict
//! detection compares paths component by component, so `/ab` never overlaps
//! `/abc` even though one string is a prefix of the other.
//!
//! Turning caller input into a `LockablePath` goes through a
//! [`PathNormalizer`]. The bundled [`LexicalNormalizer`] resolves relative
//! paths against the current directory and folds `.`/`..` without touching
//! the filesystem; callers that need symlink resolution or existence checks
//! inject their own.

use crate::error::{PathLockError, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A normalized absolute path that can be the target of a lock.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockablePath(PathBuf);

impl LockablePath {
    /// Build from a path that is already absolute.
    ///
    /// `.` components are dropped, `..` pops the previous component (never
    /// above the root) and trailing separators disappear.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(PathLockError::InvalidPath(format!(
                "'{}' is not absolute",
                path.display()
            )));
        }
        if path.to_str().is_none() {
            return Err(PathLockError::InvalidPath(format!(
                "'{}' is not valid UTF-8",
                path.display()
            )));
        }

        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                    normalized.push(component.as_os_str())
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if normalized.parent().is_some() {
                        normalized.pop();
                    }
                }
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// The path as UTF-8; construction guarantees this succeeds.
    pub fn as_str(&self) -> &str {
        self.0.to_str().unwrap_or_default()
    }

    /// Whether `other` is this path or lies underneath it.
    pub fn contains(&self, other: &LockablePath) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether either path contains the other.
    pub fn overlaps(&self, other: &LockablePath) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Whether this path overlaps any path in `others`.
    pub fn overlaps_any<'a, I>(&self, others: I) -> bool
    where
        I: IntoIterator<Item = &'a LockablePath>,
    {
        others.into_iter().any(|other| self.overlaps(other))
    }
}

impl fmt::Display for LockablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for LockablePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<LockablePath> for PathBuf {
    fn from(path: LockablePath) -> Self {
        path.0
    }
}

/// Turns caller-supplied paths into [`LockablePath`] values.
pub trait PathNormalizer: Send + Sync {
    fn normalize(&self, path: &Path) -> Result<LockablePath>;
}

/// Lexical normalization, relative paths resolved against the current directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalNormalizer;

impl PathNormalizer for LexicalNormalizer {
    fn normalize(&self, path: &Path) -> Result<LockablePath> {
        if path.as_os_str().is_empty() {
            return Err(PathLockError::InvalidPath("empty path".to_string()));
        }
        if path.is_absolute() {
            return LockablePath::new(path);
        }

        let cwd = std::env::current_dir().map_err(|e| {
            PathLockError::InvalidPath(format!(
                "cannot resolve '{}' without a current directory: {}",
                path.display(),
                e
            ))
        })?;
        LockablePath::new(cwd.join(path))
    }
}
