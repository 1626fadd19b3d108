//! Conversions between domain values and SQLite columns.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use archivekeeper_core::{
    AuditEntry, ChangeEvent, ContentHash, EventId, EventKind, FileRecord, FileStatus, Mtime,
    RunId,
};

use crate::error::{StoreError, map_sql_error};

pub(crate) const FILE_COLUMNS: &str =
    "path, size, mtime_ns, content_hash, status, first_seen, last_verified";

pub(crate) const EVENT_COLUMNS: &str =
    "id, run_id, timestamp, path, to_path, kind, old_hash, new_hash, detail";

pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_time(
    table: &'static str,
    column: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(table, column, e))
}

fn decode_hash(
    table: &'static str,
    column: &'static str,
    value: &str,
) -> Result<ContentHash, StoreError> {
    ContentHash::from_hex(value).map_err(|e| StoreError::corrupt(table, column, e))
}

/// Raw `files` row, decoded in a second step so parse errors keep context.
pub(crate) struct FileRow {
    path: String,
    size: i64,
    mtime_ns: i64,
    content_hash: String,
    status: String,
    first_seen: String,
    last_verified: String,
}

impl FileRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            size: row.get(1)?,
            mtime_ns: row.get(2)?,
            content_hash: row.get(3)?,
            status: row.get(4)?,
            first_seen: row.get(5)?,
            last_verified: row.get(6)?,
        })
    }

    pub(crate) fn decode(self) -> Result<FileRecord, StoreError> {
        Ok(FileRecord {
            path: self.path.into(),
            size: u64::try_from(self.size).map_err(|e| StoreError::corrupt("files", "size", e))?,
            mtime: Mtime(self.mtime_ns),
            content_hash: decode_hash("files", "content_hash", &self.content_hash)?,
            status: FileStatus::from_str(&self.status)
                .map_err(|e| StoreError::corrupt("files", "status", e))?,
            first_seen: decode_time("files", "first_seen", &self.first_seen)?,
            last_verified: decode_time("files", "last_verified", &self.last_verified)?,
        })
    }
}

/// Raw `events` row.
pub(crate) struct EventRow {
    id: i64,
    run_id: Option<i64>,
    timestamp: String,
    path: String,
    to_path: Option<String>,
    kind: String,
    old_hash: Option<String>,
    new_hash: Option<String>,
    detail: Option<String>,
}

impl EventRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            run_id: row.get(1)?,
            timestamp: row.get(2)?,
            path: row.get(3)?,
            to_path: row.get(4)?,
            kind: row.get(5)?,
            old_hash: row.get(6)?,
            new_hash: row.get(7)?,
            detail: row.get(8)?,
        })
    }

    pub(crate) fn decode(self) -> Result<AuditEntry, StoreError> {
        let old_hash = self
            .old_hash
            .as_deref()
            .map(|h| decode_hash("events", "old_hash", h))
            .transpose()?;
        let new_hash = self
            .new_hash
            .as_deref()
            .map(|h| decode_hash("events", "new_hash", h))
            .transpose()?;
        Ok(AuditEntry {
            id: EventId(self.id),
            run_id: self.run_id.map(RunId),
            event: ChangeEvent {
                timestamp: decode_time("events", "timestamp", &self.timestamp)?,
                path: self.path.into(),
                to_path: self.to_path.map(Into::into),
                kind: EventKind::from_str(&self.kind)
                    .map_err(|e| StoreError::corrupt("events", "kind", e))?,
                old_hash,
                new_hash,
                detail: self.detail,
            },
        })
    }
}

pub(crate) fn read_record(
    connection: &Connection,
    path: &str,
) -> Result<Option<FileRecord>, StoreError> {
    let row = connection
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"),
            params![path],
            FileRow::from_row,
        )
        .optional()
        .map_err(map_sql_error)?;
    row.map(FileRow::decode).transpose()
}

pub(crate) fn insert_record(
    connection: &Connection,
    record: &FileRecord,
) -> Result<(), StoreError> {
    connection
        .prepare_cached(
            "INSERT INTO files
                 (path, size, mtime_ns, content_hash, status, first_seen, last_verified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .map_err(map_sql_error)?
        .execute(params![
            record.path.as_str(),
            record.size as i64,
            record.mtime.as_nanos(),
            record.content_hash.to_hex(),
            record.status.to_string(),
            encode_time(&record.first_seen),
            encode_time(&record.last_verified),
        ])
        .map_err(map_sql_error)?;
    Ok(())
}

pub(crate) fn insert_event(
    connection: &Connection,
    run_id: Option<RunId>,
    event: &ChangeEvent,
) -> Result<EventId, StoreError> {
    connection
        .prepare_cached(
            "INSERT INTO events (run_id, timestamp, path, to_path, kind, old_hash, new_hash, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(map_sql_error)?
        .execute(params![
            run_id.map(|r| r.0),
            encode_time(&event.timestamp),
            event.path.as_str(),
            event.to_path.as_deref(),
            event.kind.to_string(),
            event.old_hash.map(|h| h.to_hex()),
            event.new_hash.map(|h| h.to_hex()),
            event.detail.as_deref(),
        ])
        .map_err(map_sql_error)?;
    Ok(EventId(connection.last_insert_rowid()))
}
