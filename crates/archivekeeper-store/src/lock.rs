//! Single-writer lock for runs against one store.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};

use crate::error::LockError;

/// Advisory exclusive lock on `<database>.lock`.
///
/// The lock is released when the guard returned by
/// [`RunLock::try_acquire`] is dropped, or when the process exits.
pub struct RunLock {
    path: PathBuf,
    lock: RwLock<File>,
}

/// Proof that the current process holds the run lock.
pub struct RunLockGuard<'a> {
    _guard: RwLockWriteGuard<'a, File>,
}

impl RunLock {
    /// Open (creating if needed) the lock file that guards `database`.
    pub fn for_database(database: &Path) -> Result<Self, LockError> {
        Self::open(lock_path(database))
    }

    /// Open (creating if needed) a lock file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;
        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without waiting; fails with [`LockError::Held`] if
    /// another run has it.
    pub fn try_acquire(&mut self) -> Result<RunLockGuard<'_>, LockError> {
        match self.lock.try_write() {
            Ok(guard) => Ok(RunLockGuard { _guard: guard }),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Err(LockError::Held {
                path: self.path.clone(),
            }),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Lock file path for a database file.
pub fn lock_path(database: &Path) -> PathBuf {
    let mut name = OsString::from(database.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}
