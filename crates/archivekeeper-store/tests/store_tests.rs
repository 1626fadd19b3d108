use std::path::Path;

use chrono::Utc;
use tempfile::TempDir;

use archivekeeper_core::{
    ChangeEvent, ContentHash, EventKind, FileRecord, FileStatus, HashAlgorithm, Mtime, Snapshot,
};
use archivekeeper_store::{
    HistoryQuery, LockError, RunLock, RunStats, SCHEMA_VERSION, SnapshotStore, StoreError,
};

fn hash(byte: u8) -> ContentHash {
    ContentHash::new([byte; 32])
}

fn record(path: &str, byte: u8, status: FileStatus) -> FileRecord {
    let mut record = FileRecord::new_active(path, 100, Mtime(42), hash(byte), Utc::now());
    record.status = status;
    record
}

fn commit_run(store: &mut SnapshotStore, root: &Path, snapshot: &Snapshot, events: &[ChangeEvent]) {
    let mut batch = store.begin().unwrap();
    batch.bind(root, HashAlgorithm::Sha256).unwrap();
    let run = batch
        .record_run(&RunStats {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            files_seen: snapshot.active_count() as u64,
            bytes_hashed: 0,
            event_count: events.len() as u64,
        })
        .unwrap();
    batch.replace_snapshot(snapshot).unwrap();
    batch.append_events(Some(run), events).unwrap();
    batch.commit().unwrap();
}

#[test]
fn test_state_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join(".archivekeeper/state.db");
    let snapshot: Snapshot = [
        record("a.tiff", 1, FileStatus::Active),
        record("gone.tiff", 2, FileStatus::Missing),
    ]
    .into_iter()
    .collect();
    let events = vec![
        ChangeEvent::added("a.tiff", hash(1), Utc::now()),
        ChangeEvent::missing("gone.tiff", hash(2), Utc::now()),
    ];

    {
        let mut store = SnapshotStore::open(&db).unwrap();
        commit_run(&mut store, temp.path(), &snapshot, &events);
    }

    let store = SnapshotStore::open(&db).unwrap();
    assert_eq!(store.load_snapshot().unwrap(), snapshot);
    assert_eq!(store.root().unwrap().as_deref(), Some(temp.path()));
    assert_eq!(store.event_count().unwrap(), 2);
    assert_eq!(store.runs(5).unwrap().len(), 1);
}

#[test]
fn test_uncommitted_run_leaves_previous_snapshot() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("state.db");
    let before: Snapshot = [record("a.tiff", 1, FileStatus::Active)].into_iter().collect();

    let mut store = SnapshotStore::open(&db).unwrap();
    commit_run(&mut store, temp.path(), &before, &[]);

    {
        let mut batch = store.begin().unwrap();
        batch.replace_snapshot(&Snapshot::new()).unwrap();
        batch
            .append_events(None, &[ChangeEvent::missing("a.tiff", hash(1), Utc::now())])
            .unwrap();
        // Dropped without commit, as on a failed or interrupted run.
    }
    drop(store);

    let store = SnapshotStore::open(&db).unwrap();
    assert_eq!(store.load_snapshot().unwrap(), before);
    assert_eq!(store.event_count().unwrap(), 0);
}

#[test]
fn test_audit_log_is_append_only() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("state.db");
    {
        let mut store = SnapshotStore::open(&db).unwrap();
        commit_run(
            &mut store,
            temp.path(),
            &Snapshot::new(),
            &[ChangeEvent::added("a.tiff", hash(1), Utc::now())],
        );
    }

    let conn = rusqlite::Connection::open(&db).unwrap();
    assert!(conn.execute("UPDATE events SET kind = 'moved'", []).is_err());
    assert!(conn.execute("DELETE FROM events", []).is_err());

    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[test]
fn test_forget_removes_missing_record_and_logs_it() {
    let temp = TempDir::new().unwrap();
    let mut store = SnapshotStore::open(temp.path().join("state.db")).unwrap();
    let snapshot: Snapshot = [
        record("a.tiff", 1, FileStatus::Active),
        record("gone.tiff", 2, FileStatus::Missing),
    ]
    .into_iter()
    .collect();
    commit_run(&mut store, temp.path(), &snapshot, &[]);

    let entry = store.forget("gone.tiff", Utc::now()).unwrap();
    assert_eq!(entry.event.kind, EventKind::Forgotten);
    assert_eq!(entry.event.old_hash, Some(hash(2)));
    assert_eq!(entry.run_id, None);

    assert!(store.record("gone.tiff").unwrap().is_none());
    assert!(store.record("a.tiff").unwrap().is_some());

    let history = store
        .history(&HistoryQuery::all().path("gone.tiff"))
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, entry.id);

    assert!(matches!(
        store.forget("gone.tiff", Utc::now()),
        Err(StoreError::NotTracked(_))
    ));
}

#[test]
fn test_store_rejects_other_root() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("state.db");
    let mut store = SnapshotStore::open(&db).unwrap();
    commit_run(&mut store, temp.path(), &Snapshot::new(), &[]);

    let other = temp.path().join("elsewhere");
    let err = store
        .check_binding(&other, HashAlgorithm::Sha256)
        .unwrap_err();
    assert!(matches!(err, StoreError::RootMismatch { .. }));
}

#[test]
fn test_run_lock_is_exclusive() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("state.db");

    let mut holder = RunLock::for_database(&db).unwrap();
    let _guard = holder.try_acquire().unwrap();

    let mut contender = RunLock::for_database(&db).unwrap();
    assert!(matches!(
        contender.try_acquire(),
        Err(LockError::Held { .. })
    ));
}
