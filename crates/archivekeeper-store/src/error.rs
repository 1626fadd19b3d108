//! Error types for persistence and locking.

use std::path::PathBuf;

use thiserror::Error;

use archivekeeper_core::{ArchivePath, HashAlgorithm};

/// Errors returned by the snapshot store. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite query failed.
    #[error("Database query failed: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Database is locked or busy.
    #[error("Database is busy, please retry")]
    Busy,

    /// Failed to create the directory holding the database.
    #[error("Could not create {path}: {source}")]
    CreateDir {
        /// Path that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The database was created for a different archive root.
    #[error("Store tracks {expected}, refusing to use it for {actual}")]
    RootMismatch {
        /// Root recorded in the store.
        expected: PathBuf,
        /// Root requested for this run.
        actual: PathBuf,
    },

    /// The database was created with a different digest algorithm.
    #[error("Store uses {stored} digests but {requested} was requested")]
    AlgorithmMismatch {
        /// Algorithm recorded in the store.
        stored: HashAlgorithm,
        /// Algorithm requested for this run.
        requested: HashAlgorithm,
    },

    /// The database was written by a newer version of the tool.
    #[error("Store schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema {
        /// Version found in the file.
        found: i64,
        /// Highest version this build understands.
        supported: i64,
    },

    /// A stored value could not be decoded.
    #[error("Corrupt value in {table}.{column}: {message}")]
    CorruptRow {
        /// Table holding the value.
        table: &'static str,
        /// Column holding the value.
        column: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// No record exists for the path.
    #[error("Path is not tracked: {0}")]
    NotTracked(ArchivePath),

    /// Only missing records may be forgotten.
    #[error("Path is still present and cannot be forgotten: {0}")]
    StillActive(ArchivePath),
}

impl StoreError {
    pub(crate) fn corrupt(
        table: &'static str,
        column: &'static str,
        message: impl ToString,
    ) -> Self {
        Self::CorruptRow {
            table,
            column,
            message: message.to_string(),
        }
    }
}

/// Errors acquiring the single-writer run lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run currently holds the lock.
    #[error("Another run is already active (lock held on {path})")]
    Held {
        /// Lock file path.
        path: PathBuf,
    },

    /// The lock file could not be opened.
    #[error("Cannot open lock file {path}: {source}")]
    Io {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// Translate rusqlite errors into friendlier StoreError variants.
pub(crate) fn map_sql_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(sql_err, _)
            if sql_err.code == rusqlite::ErrorCode::DatabaseBusy =>
        {
            StoreError::Busy
        }
        other => StoreError::Sql(other),
    }
}
