//! Audit events emitted by a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::hash::ContentHash;
use crate::record::ArchivePath;

/// Identifier of an entry in the audit log. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub i64);

/// Identifier of a committed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub i64);

/// What happened to a path.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    /// Path seen for the first time.
    Added,
    /// Content changed along with size or mtime.
    Modified,
    /// Content relocated to another path.
    Moved,
    /// Tracked path no longer present.
    Missing,
    /// Content changed while size and mtime did not (bit rot).
    Corrupted,
    /// Previously missing path reappeared with its old content.
    Recovered,
    /// Path could not be read during the run.
    ReadError,
    /// Missing record removed by an administrator.
    Forgotten,
}

impl EventKind {
    /// Whether this kind signals a problem an operator should look at.
    pub fn is_alarm(&self) -> bool {
        matches!(self, Self::Missing | Self::Corrupted | Self::ReadError)
    }
}

/// One entry for the audit log, before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// When the change was detected.
    pub timestamp: DateTime<Utc>,
    /// Affected path; the source path for moves.
    pub path: ArchivePath,
    /// Destination path for moves.
    pub to_path: Option<ArchivePath>,
    /// Kind of change.
    pub kind: EventKind,
    /// Digest before the change.
    pub old_hash: Option<ContentHash>,
    /// Digest after the change.
    pub new_hash: Option<ContentHash>,
    /// Human-readable detail (error messages).
    pub detail: Option<String>,
}

impl ChangeEvent {
    fn base(kind: EventKind, path: impl Into<ArchivePath>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            path: path.into(),
            to_path: None,
            kind,
            old_hash: None,
            new_hash: None,
            detail: None,
        }
    }

    /// A path seen for the first time.
    pub fn added(path: impl Into<ArchivePath>, hash: ContentHash, at: DateTime<Utc>) -> Self {
        Self {
            new_hash: Some(hash),
            ..Self::base(EventKind::Added, path, at)
        }
    }

    /// Content changed with corroborating metadata.
    pub fn modified(
        path: impl Into<ArchivePath>,
        old: ContentHash,
        new: ContentHash,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            old_hash: Some(old),
            new_hash: Some(new),
            ..Self::base(EventKind::Modified, path, at)
        }
    }

    /// Content changed silently.
    pub fn corrupted(
        path: impl Into<ArchivePath>,
        old: ContentHash,
        new: ContentHash,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            old_hash: Some(old),
            new_hash: Some(new),
            ..Self::base(EventKind::Corrupted, path, at)
        }
    }

    /// Content relocated from one path to another.
    pub fn moved(
        from: impl Into<ArchivePath>,
        to: impl Into<ArchivePath>,
        hash: ContentHash,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            to_path: Some(to.into()),
            old_hash: Some(hash),
            new_hash: Some(hash),
            ..Self::base(EventKind::Moved, from, at)
        }
    }

    /// Tracked path disappeared.
    pub fn missing(path: impl Into<ArchivePath>, last: ContentHash, at: DateTime<Utc>) -> Self {
        Self {
            old_hash: Some(last),
            ..Self::base(EventKind::Missing, path, at)
        }
    }

    /// Missing path came back with the same content.
    pub fn recovered(path: impl Into<ArchivePath>, hash: ContentHash, at: DateTime<Utc>) -> Self {
        Self {
            old_hash: Some(hash),
            new_hash: Some(hash),
            ..Self::base(EventKind::Recovered, path, at)
        }
    }

    /// Path could not be read.
    pub fn read_error(
        path: impl Into<ArchivePath>,
        last: Option<ContentHash>,
        detail: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            old_hash: last,
            detail: Some(detail.into()),
            ..Self::base(EventKind::ReadError, path, at)
        }
    }

    /// Missing record deliberately dropped.
    pub fn forgotten(path: impl Into<ArchivePath>, last: ContentHash, at: DateTime<Utc>) -> Self {
        Self {
            old_hash: Some(last),
            ..Self::base(EventKind::Forgotten, path, at)
        }
    }

    /// Set the previous digest.
    pub fn with_old_hash(mut self, hash: ContentHash) -> Self {
        self.old_hash = Some(hash);
        self
    }
}

/// A persisted audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Log sequence number.
    pub id: EventId,
    /// Run that produced the event, if any.
    pub run_id: Option<RunId>,
    /// The event itself.
    #[serde(flatten)]
    pub event: ChangeEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moved_carries_both_paths() {
        let hash = ContentHash::new([3; 32]);
        let event = ChangeEvent::moved("a.tiff", "sub/a.tiff", hash, Utc::now());
        assert_eq!(event.kind, EventKind::Moved);
        assert_eq!(event.path, "a.tiff");
        assert_eq!(event.to_path.as_deref(), Some("sub/a.tiff"));
        assert_eq!(event.old_hash, event.new_hash);
    }

    #[test]
    fn test_kind_names_round_trip_through_strum() {
        assert_eq!(EventKind::ReadError.as_ref(), "read_error");
        assert_eq!("corrupted".parse::<EventKind>().unwrap(), EventKind::Corrupted);
        assert!("exploded".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_alarm_kinds() {
        assert!(EventKind::Corrupted.is_alarm());
        assert!(EventKind::Missing.is_alarm());
        assert!(!EventKind::Moved.is_alarm());
        assert!(!EventKind::Added.is_alarm());
    }
}
