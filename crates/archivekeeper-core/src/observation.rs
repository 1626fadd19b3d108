//! What a single run saw on disk.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ReadFailure;
use crate::hash::ContentHash;
use crate::record::{ArchivePath, Mtime};

/// A regular file that was listed and hashed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedFile {
    /// Relative path.
    pub path: ArchivePath,
    /// Size in bytes, from the handle that was hashed.
    pub size: u64,
    /// Modification time, from the handle that was hashed.
    pub mtime: Mtime,
    /// Content digest.
    pub content_hash: ContentHash,
}

/// Complete observation set for one run.
///
/// Built only after every file has been hashed; the classifier needs the
/// global view to pair moves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationSet {
    /// Hashed files keyed by path.
    pub files: BTreeMap<ArchivePath, ObservedFile>,
    /// Paths that could not be read, ordered by path.
    pub failures: Vec<ReadFailure>,
    /// Total bytes hashed.
    pub bytes_hashed: u64,
    /// Wall time spent walking and hashing.
    pub duration: Duration,
}

impl ObservationSet {
    /// Create an empty observation set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hashed file.
    pub fn record_file(&mut self, file: ObservedFile) {
        self.bytes_hashed += file.size;
        self.files.insert(file.path.clone(), file);
    }

    /// Record a read failure.
    pub fn record_failure(&mut self, failure: ReadFailure) {
        self.failures.push(failure);
    }

    /// Sort failures by path for reproducible output.
    pub fn finish(&mut self, duration: Duration) {
        self.failures.sort_by(|a, b| a.path.cmp(&b.path));
        self.duration = duration;
    }

    /// Number of files hashed.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Failure recorded for an exact file path.
    pub fn file_failure(&self, path: &str) -> Option<&ReadFailure> {
        self.failures.iter().find(|f| !f.is_dir && f.path == path)
    }

    /// Failed directory listing that hides `path`, if any.
    pub fn hidden_by(&self, path: &str) -> Option<&ReadFailure> {
        self.failures.iter().find(|f| f.covers(path))
    }
}
