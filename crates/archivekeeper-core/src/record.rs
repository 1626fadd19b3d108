//! Tracked file records and the snapshot that holds them.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::hash::ContentHash;

/// `/`-separated path relative to the archive root.
pub type ArchivePath = CompactString;

/// File modification time as nanoseconds since the Unix epoch.
///
/// Compared for exact equality; a content change that leaves this value and
/// the size untouched is treated as bit rot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mtime(pub i64);

impl Mtime {
    /// Convert a filesystem timestamp, saturating outside the i64 range.
    pub fn from_system_time(time: SystemTime) -> Self {
        let nanos = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
            Err(e) => i64::try_from(e.duration().as_nanos())
                .map(|n| -n)
                .unwrap_or(i64::MIN),
        };
        Self(nanos)
    }

    /// Nanoseconds since the epoch.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Calendar representation for display.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

/// Whether the path was present at the last run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileStatus {
    /// Present and verified.
    Active,
    /// Not found (or unreadable) at the last run; last known state retained.
    Missing,
}

/// Last known state of one path under the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Relative path, unique key.
    pub path: ArchivePath,
    /// Size in bytes at last observation.
    pub size: u64,
    /// Modification time at last observation.
    pub mtime: Mtime,
    /// Digest of the content at last observation.
    pub content_hash: ContentHash,
    /// Current status.
    pub status: FileStatus,
    /// When the path was first tracked.
    pub first_seen: DateTime<Utc>,
    /// When the content was last hashed and confirmed.
    pub last_verified: DateTime<Utc>,
}

impl FileRecord {
    /// Create a new active record observed at `now`.
    pub fn new_active(
        path: impl Into<ArchivePath>,
        size: u64,
        mtime: Mtime,
        content_hash: ContentHash,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
            content_hash,
            status: FileStatus::Active,
            first_seen: now,
            last_verified: now,
        }
    }

    /// Check if this record is active.
    pub fn is_active(&self) -> bool {
        self.status == FileStatus::Active
    }

    /// Check if this record is missing.
    pub fn is_missing(&self) -> bool {
        self.status == FileStatus::Missing
    }
}

/// The tracker's belief about the archive as of the last committed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    records: BTreeMap<ArchivePath, FileRecord>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for its path.
    pub fn insert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.records.insert(record.path.clone(), record)
    }

    /// Look up a record by path.
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(path)
    }

    /// All records, ordered by path.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Active records, ordered by path.
    pub fn active(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values().filter(|r| r.is_active())
    }

    /// Missing records, ordered by path.
    pub fn missing(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values().filter(|r| r.is_missing())
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no records are tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of active records.
    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}

impl FromIterator<FileRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}
