use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, info};

use archivekeeper_core::{
    AuditEntry, ChangeEvent, EventId, FileRecord, HashAlgorithm, RunId, Snapshot,
};

use crate::error::{StoreError, map_sql_error};
use crate::rows::{self, FILE_COLUMNS, FileRow, encode_time};
use crate::schema;

const META_ROOT: &str = "root";
const META_ALGORITHM: &str = "hash_algorithm";

/// Totals recorded for a committed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// When hashing started.
    pub started_at: DateTime<Utc>,
    /// When classification finished.
    pub finished_at: DateTime<Utc>,
    /// Files hashed successfully.
    pub files_seen: u64,
    /// Bytes hashed.
    pub bytes_hashed: u64,
    /// Events appended by the run.
    pub event_count: u64,
}

/// A committed run as stored in the `runs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    /// Run identifier.
    pub id: RunId,
    /// Totals for the run.
    pub stats: RunStats,
}

/// SQLite-backed snapshot of the archive plus its audit log.
///
/// The store is the only place run state is persisted. Readers use the
/// connection directly; every mutation goes through a
/// [`SnapshotWriteBatch`] so a run either commits completely or not at all.
pub struct SnapshotStore {
    connection: Connection,
    path: Option<PathBuf>,
}

/// Groups the writes of one run into a single transaction.
///
/// Dropping the batch without calling [`SnapshotWriteBatch::commit`] rolls
/// everything back, so any early return leaves the previous snapshot intact.
pub struct SnapshotWriteBatch<'conn> {
    tx: Transaction<'conn>,
}

impl SnapshotStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let connection = Connection::open(path).map_err(map_sql_error)?;
        let store = Self {
            connection,
            path: Some(path.to_path_buf()),
        };
        store.apply_pragmas()?;
        schema::apply_schema(&store.connection)?;
        debug!(path = %path.display(), "opened snapshot store");
        Ok(store)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(map_sql_error)?;
        let store = Self {
            connection,
            path: None,
        };
        store.apply_pragmas()?;
        schema::apply_schema(&store.connection)?;
        Ok(store)
    }

    /// Database file, if not in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn apply_pragmas(&self) -> Result<(), StoreError> {
        self.connection
            .execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous = FULL;
                 PRAGMA foreign_keys=ON;
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(map_sql_error)
    }

    fn meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.connection
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_error)
    }

    /// Archive root the store is bound to, once a run has committed.
    pub fn root(&self) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.meta(META_ROOT)?.map(PathBuf::from))
    }

    /// Digest algorithm the store is bound to, once a run has committed.
    pub fn algorithm(&self) -> Result<Option<HashAlgorithm>, StoreError> {
        self.meta(META_ALGORITHM)?
            .map(|value| {
                HashAlgorithm::from_str(&value)
                    .map_err(|e| StoreError::corrupt("meta", "value", e))
            })
            .transpose()
    }

    /// Verify the store may be used for `root` with `algorithm`.
    ///
    /// An unbound store accepts anything; the binding itself is written by
    /// the first committed batch.
    pub fn check_binding(&self, root: &Path, algorithm: HashAlgorithm) -> Result<(), StoreError> {
        if let Some(expected) = self.root()? {
            if expected != root {
                return Err(StoreError::RootMismatch {
                    expected,
                    actual: root.to_path_buf(),
                });
            }
        }
        if let Some(stored) = self.algorithm()? {
            if stored != algorithm {
                return Err(StoreError::AlgorithmMismatch {
                    stored,
                    requested: algorithm,
                });
            }
        }
        Ok(())
    }

    /// Load every record, active and missing.
    pub fn load_snapshot(&self) -> Result<Snapshot, StoreError> {
        let mut stmt = self
            .connection
            .prepare(&format!("SELECT {FILE_COLUMNS} FROM files ORDER BY path"))
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], FileRow::from_row)
            .map_err(map_sql_error)?;
        let mut snapshot = Snapshot::new();
        for row in rows {
            snapshot.insert(row.map_err(map_sql_error)?.decode()?);
        }
        debug!(records = snapshot.len(), "loaded snapshot");
        Ok(snapshot)
    }

    /// Look up one record.
    pub fn record(&self, path: &str) -> Result<Option<FileRecord>, StoreError> {
        rows::read_record(&self.connection, path)
    }

    /// Start a write batch that wraps a run's mutations in one transaction.
    pub fn begin(&mut self) -> Result<SnapshotWriteBatch<'_>, StoreError> {
        let tx = self.connection.transaction().map_err(map_sql_error)?;
        Ok(SnapshotWriteBatch { tx })
    }

    /// Remove a missing record and log a `Forgotten` event.
    ///
    /// Active records are refused: deletion of a present file's history is
    /// never inferred, it has to be the file's absence first.
    pub fn forget(&mut self, path: &str, at: DateTime<Utc>) -> Result<AuditEntry, StoreError> {
        let tx = self.connection.transaction().map_err(map_sql_error)?;
        let record = rows::read_record(&tx, path)?
            .ok_or_else(|| StoreError::NotTracked(path.into()))?;
        if record.is_active() {
            return Err(StoreError::StillActive(record.path));
        }
        tx.execute("DELETE FROM files WHERE path = ?1", params![path])
            .map_err(map_sql_error)?;
        let event = ChangeEvent::forgotten(record.path, record.content_hash, at);
        let id = rows::insert_event(&tx, None, &event)?;
        tx.commit().map_err(map_sql_error)?;
        info!(path, "forgot missing record");
        Ok(AuditEntry {
            id,
            run_id: None,
            event,
        })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl<'conn> SnapshotWriteBatch<'conn> {
    /// Record the root and algorithm on first use; a no-op afterwards.
    pub fn bind(&mut self, root: &Path, algorithm: HashAlgorithm) -> Result<(), StoreError> {
        let mut stmt = self
            .tx
            .prepare_cached("INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)")
            .map_err(map_sql_error)?;
        stmt.execute(params![META_ROOT, root.to_string_lossy().as_ref()])
            .map_err(map_sql_error)?;
        stmt.execute(params![META_ALGORITHM, algorithm.to_string()])
            .map_err(map_sql_error)?;
        Ok(())
    }

    /// Record a run and return its id.
    pub fn record_run(&mut self, stats: &RunStats) -> Result<RunId, StoreError> {
        self.tx
            .execute(
                "INSERT INTO runs (started_at, finished_at, files_seen, bytes_hashed, event_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    encode_time(&stats.started_at),
                    encode_time(&stats.finished_at),
                    stats.files_seen as i64,
                    stats.bytes_hashed as i64,
                    stats.event_count as i64,
                ],
            )
            .map_err(map_sql_error)?;
        Ok(RunId(self.tx.last_insert_rowid()))
    }

    /// Replace the stored snapshot wholesale.
    pub fn replace_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.tx
            .execute("DELETE FROM files", [])
            .map_err(map_sql_error)?;
        for record in snapshot.records() {
            rows::insert_record(&self.tx, record)?;
        }
        Ok(())
    }

    /// Append events to the audit log, returning their ids in order.
    pub fn append_events(
        &mut self,
        run_id: Option<RunId>,
        events: &[ChangeEvent],
    ) -> Result<Vec<EventId>, StoreError> {
        events
            .iter()
            .map(|event| rows::insert_event(&self.tx, run_id, event))
            .collect()
    }

    /// Commit the batch atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().map_err(map_sql_error)
    }
}
