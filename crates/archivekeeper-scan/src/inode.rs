//! Directory identity tracking for symlink loop detection.

use dashmap::DashSet;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

/// (device, inode) pair identifying a directory independent of the path used to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirKey {
    /// Device ID.
    pub device: u64,
    /// Inode number.
    pub inode: u64,
}

impl DirKey {
    /// Create a new key.
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    /// Key for the directory described by `metadata`.
    ///
    /// Returns `None` on platforms without stable inode numbers, where loop
    /// detection is unavailable.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Option<Self> {
        Some(Self::new(metadata.dev(), metadata.ino()))
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// Tracks directories already entered during a walk.
///
/// When symlinks are followed, a link pointing at an ancestor would send the
/// walker around in circles; visiting each (device, inode) once breaks that.
#[derive(Debug, Default)]
pub struct InodeTracker {
    seen: DashSet<DirKey>,
}

impl InodeTracker {
    /// Create a new tracker.
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Mark a directory as entered. Returns `true` if this is the first visit.
    pub fn track(&self, key: DirKey) -> bool {
        self.seen.insert(key)
    }
}
