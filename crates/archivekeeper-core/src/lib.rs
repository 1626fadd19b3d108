//! Core types and traits for archivekeeper.
//!
//! This crate provides the data model shared by every other crate in the
//! workspace: tracked file records, audit events, content digests, per-run
//! observations, the error taxonomy and run configuration.

mod config;
mod error;
mod event;
mod hash;
mod observation;
mod record;

pub use config::{
    ConfigError, FileSettings, KeeperConfig, KeeperConfigBuilder, STORE_DIR_NAME,
    default_settings_path,
};
pub use error::{FailureKind, HashError, ReadFailure, ScanError};
pub use event::{AuditEntry, ChangeEvent, EventId, EventKind, RunId};
pub use hash::{ContentHash, HashAlgorithm, ParseHashError};
pub use observation::{ObservationSet, ObservedFile};
pub use record::{ArchivePath, FileRecord, FileStatus, Mtime, Snapshot};
