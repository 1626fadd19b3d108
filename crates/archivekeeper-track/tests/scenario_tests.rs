use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use archivekeeper_core::{HashAlgorithm, KeeperConfig};
use archivekeeper_store::{LockError, RunLock, SnapshotStore, StoreError};
use archivekeeper_track::{ChangeEvent, EventKind, HistoryQuery, TrackError, Tracker};

fn archive() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.tiff"), "alpha raw data").unwrap();
    fs::write(temp.path().join("b.tiff"), "bravo raw data").unwrap();
    fs::write(temp.path().join("c.tiff"), "charlie raw data").unwrap();
    temp
}

fn config(root: &Path) -> KeeperConfig {
    let mut config = KeeperConfig::new(root);
    config.threads = 2;
    config
}

fn tracker(root: &Path) -> Tracker {
    Tracker::new(config(root)).unwrap()
}

fn database(root: &Path) -> PathBuf {
    let root = root.canonicalize().unwrap();
    config(&root).database_path(&root)
}

fn find(events: &[ChangeEvent], kind: EventKind) -> Vec<&ChangeEvent> {
    events.iter().filter(|e| e.kind == kind).collect()
}

#[test]
fn test_first_run_adds_every_file() {
    let temp = archive();
    let report = tracker(temp.path()).run().unwrap();

    assert_eq!(report.events.len(), 3);
    assert_eq!(report.count(EventKind::Added), 3);
    assert_eq!(report.tracked, 3);
    assert_eq!(report.files_seen, 3);
    assert!(!report.has_alarms());

    let paths: Vec<&str> = report.events.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["a.tiff", "b.tiff", "c.tiff"]);

    let store = SnapshotStore::open(database(temp.path())).unwrap();
    let snapshot = store.load_snapshot().unwrap();
    assert_eq!(snapshot.active_count(), 3);
}

#[test]
fn test_second_run_on_unchanged_tree_is_silent() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    let report = tracker.run().unwrap();
    assert!(report.events.is_empty());
    assert_eq!(report.tracked, 3);
    assert!(report.render_text().contains("No changes."));
}

#[test]
fn test_rename_is_a_move() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    fs::create_dir(temp.path().join("sub")).unwrap();
    fs::rename(temp.path().join("a.tiff"), temp.path().join("sub/a.tiff")).unwrap();
    let report = tracker.run().unwrap();

    assert_eq!(report.events.len(), 1);
    let moved = &report.events[0];
    assert_eq!(moved.kind, EventKind::Moved);
    assert_eq!(moved.path, "a.tiff");
    assert_eq!(moved.to_path.as_deref(), Some("sub/a.tiff"));
    assert!(find(&report.events, EventKind::Missing).is_empty());
    assert!(find(&report.events, EventKind::Added).is_empty());

    let store = SnapshotStore::open(database(temp.path())).unwrap();
    assert!(store.record("a.tiff").unwrap().is_none());
    assert!(store.record("sub/a.tiff").unwrap().unwrap().is_active());
}

#[test]
fn test_rewrite_with_new_size_is_modified() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    fs::write(temp.path().join("b.tiff"), "bravo retouched, now longer").unwrap();
    let report = tracker.run().unwrap();

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::Modified);
    assert_eq!(report.events[0].path, "b.tiff");
    assert_ne!(report.events[0].old_hash, report.events[0].new_hash);
    assert!(!report.has_alarms());
}

#[test]
fn test_silent_rewrite_is_corruption() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    let path = temp.path().join("c.tiff");
    let mtime = fs::metadata(&path).unwrap().modified().unwrap();
    fs::write(&path, "charlie ROT data").unwrap();
    fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();

    let report = tracker.run().unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::Corrupted);
    assert_eq!(report.events[0].path, "c.tiff");
    assert!(report.has_alarms());
    assert!(report.render_text().contains("CORRUPTED"));

    // The new content becomes the baseline.
    assert!(tracker.run().unwrap().events.is_empty());
}

#[test]
fn test_delete_is_missing_and_kept_on_record() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    fs::remove_file(temp.path().join("a.tiff")).unwrap();
    let report = tracker.run().unwrap();

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::Missing);
    assert_eq!(report.events[0].path, "a.tiff");
    assert_eq!(report.tracked, 2);
    assert_eq!(report.missing_records, 1);

    let store = SnapshotStore::open(database(temp.path())).unwrap();
    let record = store.record("a.tiff").unwrap().unwrap();
    assert!(record.is_missing());

    // A missing file is reported once, not on every run.
    assert!(tracker.run().unwrap().events.is_empty());
}

#[test]
fn test_deleted_duplicate_is_not_paired_with_unrelated_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("one.tiff"), "same bytes").unwrap();
    fs::write(temp.path().join("two.tiff"), "same bytes").unwrap();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    fs::remove_file(temp.path().join("one.tiff")).unwrap();
    fs::create_dir(temp.path().join("new")).unwrap();
    fs::write(temp.path().join("new/other.tiff"), "different bytes").unwrap();
    let report = tracker.run().unwrap();

    assert!(find(&report.events, EventKind::Moved).is_empty());
    let missing = find(&report.events, EventKind::Missing);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].path, "one.tiff");
    let added = find(&report.events, EventKind::Added);
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].path, "new/other.tiff");
}

#[test]
fn test_restored_file_is_recovered() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    let path = temp.path().join("a.tiff");
    fs::remove_file(&path).unwrap();
    tracker.run().unwrap();

    fs::write(&path, "alpha raw data").unwrap();
    let report = tracker.run().unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::Recovered);
    assert_eq!(report.tracked, 3);
    assert_eq!(report.missing_records, 0);
}

#[test]
fn test_cancelled_run_leaves_snapshot_untouched() {
    let temp = archive();
    tracker(temp.path()).run().unwrap();

    fs::write(temp.path().join("b.tiff"), "bravo retouched, now longer").unwrap();
    let cancelled = tracker(temp.path());
    cancelled.cancel_token().cancel();
    let err = cancelled.run().unwrap_err();
    assert!(matches!(err, TrackError::Cancelled));

    let store = SnapshotStore::open(database(temp.path())).unwrap();
    assert_eq!(store.runs(10).unwrap().len(), 1);
    assert_eq!(store.event_count().unwrap(), 3);

    // The change is still pending against the committed snapshot.
    let report = tracker(temp.path()).run().unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::Modified);
}

#[test]
fn test_cancelled_first_run_does_not_bind_store() {
    let temp = archive();
    let cancelled = tracker(temp.path());
    cancelled.cancel_token().cancel();
    assert!(matches!(cancelled.run(), Err(TrackError::Cancelled)));

    let store = SnapshotStore::open(database(temp.path())).unwrap();
    assert!(store.root().unwrap().is_none());
    assert!(store.load_snapshot().unwrap().is_empty());
}

#[test]
fn test_same_tracker_runs_again_after_cancel() {
    let temp = archive();
    let tracker = tracker(temp.path());
    let first = tracker.cancel_token();
    first.cancel();
    assert!(matches!(tracker.run(), Err(TrackError::Cancelled)));

    let report = tracker.run().unwrap();
    assert_eq!(report.events.len(), 3);
    assert!(!tracker.cancel_token().is_cancelled());

    // A stale token no longer reaches the new run.
    first.cancel();
    assert!(tracker.run().unwrap().events.is_empty());
}

#[test]
fn test_concurrent_run_is_refused() {
    let temp = archive();
    let mut lock = RunLock::for_database(&database(temp.path())).unwrap();
    let _guard = lock.try_acquire().unwrap();

    let err = tracker(temp.path()).run().unwrap_err();
    assert!(err.is_concurrency());
    assert!(matches!(err, TrackError::Lock(LockError::Held { .. })));
}

#[test]
fn test_algorithm_switch_is_refused() {
    let temp = archive();
    tracker(temp.path()).run().unwrap();

    let mut config = config(temp.path());
    config.hash_algorithm = HashAlgorithm::Blake3;
    let err = Tracker::new(config).unwrap().run().unwrap_err();
    assert!(matches!(
        err,
        TrackError::Store(StoreError::AlgorithmMismatch { .. })
    ));
}

#[test]
fn test_blake3_store_round_trips() {
    let temp = archive();
    let mut config = config(temp.path());
    config.hash_algorithm = HashAlgorithm::Blake3;
    let tracker = Tracker::new(config).unwrap();

    assert_eq!(tracker.run().unwrap().count(EventKind::Added), 3);
    assert!(tracker.run().unwrap().events.is_empty());
}

#[test]
fn test_history_filters_by_path() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();
    fs::remove_file(temp.path().join("a.tiff")).unwrap();
    tracker.run().unwrap();

    let entries = tracker.history(&HistoryQuery::all().path("a.tiff")).unwrap();
    let kinds: Vec<EventKind> = entries.iter().map(|e| e.event.kind).collect();
    assert_eq!(kinds, [EventKind::Missing, EventKind::Added]);
    assert!(entries.iter().all(|e| e.run_id.is_some()));

    let all = tracker.history(&HistoryQuery::all()).unwrap();
    assert_eq!(all.len(), 4);
}

#[test]
fn test_history_without_store() {
    let temp = archive();
    let err = tracker(temp.path()).history(&HistoryQuery::all()).unwrap_err();
    assert!(matches!(err, TrackError::NoStore { .. }));
}

#[test]
fn test_forget_missing_file() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();
    fs::remove_file(temp.path().join("a.tiff")).unwrap();
    tracker.run().unwrap();

    let entry = tracker.forget("./a.tiff").unwrap();
    assert_eq!(entry.event.kind, EventKind::Forgotten);
    assert!(entry.run_id.is_none());

    let report = tracker.run().unwrap();
    assert!(report.events.is_empty());
    assert_eq!(report.missing_records, 0);

    let entries = tracker.history(&HistoryQuery::all().path("a.tiff")).unwrap();
    assert_eq!(entries[0].event.kind, EventKind::Forgotten);
}

#[test]
fn test_forget_refuses_active_file() {
    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    let err = tracker.forget("b.tiff").unwrap_err();
    assert!(matches!(err, TrackError::Store(StoreError::StillActive(_))));
    let err = tracker.forget("nope.tiff").unwrap_err();
    assert!(matches!(err, TrackError::Store(StoreError::NotTracked(_))));
}

#[test]
fn test_store_inside_root_is_not_tracked() {
    let temp = archive();
    let root = temp.path().canonicalize().unwrap();
    let mut config = config(&root);
    config.database = Some(root.join("keeper.db"));
    let tracker = Tracker::new(config).unwrap();

    let first = tracker.run().unwrap();
    assert_eq!(first.count(EventKind::Added), 3);
    assert!(first.events.iter().all(|e| !e.path.starts_with("keeper.db")));
    assert!(tracker.run().unwrap().events.is_empty());
}

#[test]
fn test_exclude_patterns_apply() {
    let temp = archive();
    fs::write(temp.path().join("a.xmp"), "sidecar").unwrap();
    let mut config = config(temp.path());
    config.exclude_patterns = vec!["*.xmp".to_string()];

    let report = Tracker::new(config).unwrap().run().unwrap();
    assert_eq!(report.count(EventKind::Added), 3);
}

#[test]
fn test_missing_root_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = tracker(&temp.path().join("absent")).run().unwrap_err();
    assert!(matches!(err, TrackError::Scan(_)));
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_reported_not_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let temp = archive();
    let tracker = tracker(temp.path());
    tracker.run().unwrap();

    let locked = temp.path().join("b.tiff");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    // Root ignores permission bits; nothing to test there.
    if fs::read(&locked).is_ok() {
        return;
    }

    let report = tracker.run().unwrap();
    let errors = find(&report.events, EventKind::ReadError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "b.tiff");
    assert_eq!(report.read_failures.len(), 1);
    assert!(report.render_text().contains("Skipped paths:"));
    assert!(find(&report.events, EventKind::Missing).is_empty());

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    let report = tracker.run().unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, EventKind::Recovered);
}
