//! Error types for scanning and hashing.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::record::ArchivePath;

/// Errors that abort a scan as a whole.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Root path not found.
    #[error("Root path not found: {path}")]
    NotFound { path: PathBuf },

    /// Permission denied for the root.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error on the root.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid exclusion pattern.
    #[error("Invalid exclude pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Worker pool could not be started.
    #[error("Could not start hashing pool: {message}")]
    Pool { message: String },

    /// Operation was interrupted.
    #[error("Operation interrupted")]
    Interrupted,
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors computing a single file digest.
#[derive(Debug, Error)]
pub enum HashError {
    /// The file could not be opened or read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Hashing did not finish within the per-file deadline.
    #[error("Hashing {path} exceeded {timeout:?} after {attempts} attempt(s)")]
    TimedOut {
        path: PathBuf,
        timeout: Duration,
        attempts: u32,
    },

    /// The run was cancelled while hashing.
    #[error("Hashing cancelled")]
    Cancelled,
}

impl HashError {
    /// Whether retrying could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { source, .. } => !matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            Self::TimedOut { .. } => true,
            Self::Cancelled => false,
        }
    }

    /// Classify for reporting.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Io { source, .. } => FailureKind::from_io(source),
            Self::TimedOut { .. } => FailureKind::TimedOut,
            Self::Cancelled => FailureKind::Io,
        }
    }
}

/// Kind of per-path read failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Permission was denied.
    PermissionDenied,
    /// Path vanished between listing and reading.
    NotFound,
    /// Hashing exceeded the per-file deadline.
    TimedOut,
    /// Any other I/O error.
    Io,
}

impl FailureKind {
    /// Classify an I/O error.
    pub fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::TimedOut => Self::TimedOut,
            _ => Self::Io,
        }
    }
}

/// Non-fatal failure to read one path; the run continues past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFailure {
    /// Relative path that failed.
    pub path: ArchivePath,
    /// Kind of failure.
    pub kind: FailureKind,
    /// Whether the path is a directory whose listing failed.
    pub is_dir: bool,
    /// Human-readable message.
    pub message: String,
}

impl ReadFailure {
    /// Failure to read a file.
    pub fn file(
        path: impl Into<ArchivePath>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            is_dir: false,
            message: message.into(),
        }
    }

    /// Failure to list a directory.
    pub fn directory(path: impl Into<ArchivePath>, error: &std::io::Error) -> Self {
        Self {
            path: path.into(),
            kind: FailureKind::from_io(error),
            is_dir: true,
            message: format!("Cannot list directory: {error}"),
        }
    }

    /// Failure derived from an I/O error on a file.
    pub fn from_io(path: impl Into<ArchivePath>, error: &std::io::Error) -> Self {
        Self::file(path, FailureKind::from_io(error), format!("Read error: {error}"))
    }

    /// Failure derived from a hashing error.
    pub fn from_hash(path: impl Into<ArchivePath>, error: &HashError) -> Self {
        Self::file(path, error.failure_kind(), error.to_string())
    }

    /// Whether `other` lies beneath this failed directory.
    pub fn covers(&self, other: &str) -> bool {
        if !self.is_dir {
            return false;
        }
        if self.path.is_empty() {
            return true;
        }
        other
            .strip_prefix(self.path.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));
    }

    #[test]
    fn test_hash_error_transience() {
        let gone = HashError::Io {
            path: "/x".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(!gone.is_transient());
        assert_eq!(gone.failure_kind(), FailureKind::NotFound);

        let flaky = HashError::Io {
            path: "/x".into(),
            source: std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr"),
        };
        assert!(flaky.is_transient());
    }

    #[test]
    fn test_directory_failure_covers_children_only() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let failure = ReadFailure::directory("scans/1990", &err);
        assert!(failure.covers("scans/1990/a.tiff"));
        assert!(failure.covers("scans/1990/deep/b.tiff"));
        assert!(!failure.covers("scans/1990"));
        assert!(!failure.covers("scans/19900/a.tiff"));
        assert_eq!(failure.kind, FailureKind::PermissionDenied);
    }

    #[test]
    fn test_file_failure_covers_nothing() {
        let failure = ReadFailure::file("a.tiff", FailureKind::Io, "boom");
        assert!(!failure.covers("a.tiff/x"));
    }
}
