use rusqlite::Connection;

use crate::error::{StoreError, map_sql_error};

/// Schema version written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
     );
     CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        size INTEGER NOT NULL,
        mtime_ns INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('active', 'missing')),
        first_seen TEXT NOT NULL,
        last_verified TEXT NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_files_content_hash
        ON files (content_hash);
     CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        files_seen INTEGER NOT NULL,
        bytes_hashed INTEGER NOT NULL,
        event_count INTEGER NOT NULL
     );
     CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER REFERENCES runs (id),
        timestamp TEXT NOT NULL,
        path TEXT NOT NULL,
        to_path TEXT,
        kind TEXT NOT NULL,
        old_hash TEXT,
        new_hash TEXT,
        detail TEXT
     );
     CREATE INDEX IF NOT EXISTS idx_events_path ON events (path);
     CREATE INDEX IF NOT EXISTS idx_events_to_path ON events (to_path);
     CREATE INDEX IF NOT EXISTS idx_events_kind ON events (kind);
     CREATE TRIGGER IF NOT EXISTS events_append_only_update
        BEFORE UPDATE ON events
        BEGIN
            SELECT RAISE(ABORT, 'audit log is append-only');
        END;
     CREATE TRIGGER IF NOT EXISTS events_append_only_delete
        BEFORE DELETE ON events
        BEGIN
            SELECT RAISE(ABORT, 'audit log is append-only');
        END;";

pub(crate) fn apply_schema(connection: &Connection) -> Result<(), StoreError> {
    let found: i64 = connection
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(map_sql_error)?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    connection.execute_batch(SCHEMA).map_err(map_sql_error)?;
    if found < SCHEMA_VERSION {
        connection
            .pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(map_sql_error)?;
        tracing::debug!(from = found, to = SCHEMA_VERSION, "store schema initialised");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        assert!(matches!(
            apply_schema(&conn),
            Err(StoreError::UnsupportedSchema { .. })
        ));
    }
}
