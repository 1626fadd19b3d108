//! Read access to the audit log and run table.

use rusqlite::params;

use archivekeeper_core::{AuditEntry, EventKind, RunId};

use crate::error::{StoreError, map_sql_error};
use crate::rows::{EVENT_COLUMNS, EventRow, decode_time};
use crate::store::{RunRecord, RunStats, SnapshotStore};

/// Filter for [`SnapshotStore::history`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Only events touching this path, as source or move destination.
    pub path: Option<String>,
    /// Only events of this kind.
    pub kind: Option<EventKind>,
    /// Return at most this many entries.
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Every event, newest first.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Restrict to one kind.
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Cap the number of entries.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl SnapshotStore {
    /// Query the audit log, newest entries first.
    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let limit = query
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        let mut stmt = self
            .connection()
            .prepare_cached(&format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE (?1 IS NULL OR path = ?1 OR to_path = ?1)
                   AND (?2 IS NULL OR kind = ?2)
                 ORDER BY id DESC
                 LIMIT ?3"
            ))
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map(
                params![
                    query.path.as_deref(),
                    query.kind.map(|k| k.to_string()),
                    limit
                ],
                EventRow::from_row,
            )
            .map_err(map_sql_error)?;
        rows.map(|row| row.map_err(map_sql_error)?.decode())
            .collect()
    }

    /// Total number of audit entries.
    pub fn event_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .map_err(map_sql_error)?;
        Ok(count as u64)
    }

    /// Most recent committed runs, newest first.
    pub fn runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let mut stmt = self
            .connection()
            .prepare_cached(
                "SELECT id, started_at, finished_at, files_seen, bytes_hashed, event_count
                 FROM runs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(map_sql_error)?;
        rows.map(|row| -> Result<RunRecord, StoreError> {
            let (id, started_at, finished_at, files_seen, bytes_hashed, event_count) =
                row.map_err(map_sql_error)?;
            Ok(RunRecord {
                id: RunId(id),
                stats: RunStats {
                    started_at: decode_time("runs", "started_at", &started_at)?,
                    finished_at: decode_time("runs", "finished_at", &finished_at)?,
                    files_seen: files_seen as u64,
                    bytes_hashed: bytes_hashed as u64,
                    event_count: event_count as u64,
                },
            })
        })
        .collect()
    }
}
