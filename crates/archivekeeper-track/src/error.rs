use std::path::PathBuf;

use thiserror::Error;

use archivekeeper_core::{ConfigError, ScanError};
use archivekeeper_store::{LockError, StoreError};

/// Errors that abort a run, a history query or a forget.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The root could not be walked at all.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Persistence failed; nothing was committed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another run holds the lock.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The run was cancelled before committing.
    #[error("Run cancelled; the previous snapshot is unchanged")]
    Cancelled,

    /// No store exists yet for the root.
    #[error("No snapshot store at {path}; run a scan first")]
    NoStore {
        /// Expected database path.
        path: PathBuf,
    },
}

impl TrackError {
    /// Whether the error means another run is active.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Lock(LockError::Held { .. }))
    }
}
