//! Run orchestration: lock, load, walk and hash, classify, commit.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use archivekeeper_core::{AuditEntry, EventKind, KeeperConfig, STORE_DIR_NAME, ScanError};
use archivekeeper_scan::{EntryFilter, FileHasher, HashPool, ScanProgress, Walker};
use archivekeeper_store::{
    HistoryQuery, RunLock, RunStats, SnapshotStore, StoreError, lock_path,
};

use crate::classifier::classify;
use crate::error::TrackError;
use crate::report::RunReport;

/// Drives integrity runs for one archive root.
///
/// # Example
///
/// ```rust,no_run
/// use archivekeeper_core::KeeperConfig;
/// use archivekeeper_track::Tracker;
///
/// let tracker = Tracker::new(KeeperConfig::new("/archive")).unwrap();
/// let report = tracker.run().unwrap();
/// print!("{}", report.render_text());
/// ```
pub struct Tracker {
    config: KeeperConfig,
    pool: HashPool,
    cancel: Mutex<CancellationToken>,
}

impl Tracker {
    /// Create a tracker; the hashing pool is started immediately.
    pub fn new(config: KeeperConfig) -> Result<Self, TrackError> {
        let pool = HashPool::new(config.threads)?;
        Ok(Self {
            config,
            pool,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    /// Token that aborts the current run before it commits.
    ///
    /// A cancelled run is followed by a fresh token, so fetch it again
    /// before the next run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    fn rearm(&self) {
        let mut slot = self.cancel.lock().unwrap_or_else(|err| err.into_inner());
        if slot.is_cancelled() {
            *slot = CancellationToken::new();
        }
    }

    /// Subscribe to hashing progress.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.pool.subscribe()
    }

    fn canonical_root(&self) -> Result<PathBuf, TrackError> {
        let root = &self.config.root;
        let canonical = root.canonicalize().map_err(|e| ScanError::io(root, e))?;
        if !canonical.is_dir() {
            return Err(ScanError::NotADirectory { path: canonical }.into());
        }
        Ok(canonical)
    }

    fn entry_filter(&self, root: &Path, database: &Path) -> Result<EntryFilter, TrackError> {
        let database = database
            .canonicalize()
            .unwrap_or_else(|_| database.to_path_buf());
        let mut filter =
            EntryFilter::new(&self.config.exclude_patterns, self.config.include_hidden)?
                .skip_path(root.join(STORE_DIR_NAME))
                .skip_path(lock_path(&database));
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut name = database.clone().into_os_string();
            name.push(suffix);
            filter = filter.skip_path(PathBuf::from(name));
        }
        Ok(filter)
    }

    /// Perform one run and commit its result.
    ///
    /// Per-file read problems are part of the report. Lock, store and
    /// cancellation errors abort the run and leave the previous snapshot
    /// as it was.
    pub fn run(&self) -> Result<RunReport, TrackError> {
        let cancel = self.cancel_token();
        let result = self.run_with(&cancel);
        if cancel.is_cancelled() {
            self.rearm();
        }
        result
    }

    fn run_with(&self, cancel: &CancellationToken) -> Result<RunReport, TrackError> {
        let started_at = Utc::now();
        let root = self.canonical_root()?;
        let database = self.config.database_path(&root);
        let algorithm = self.config.hash_algorithm;

        let mut lock = RunLock::for_database(&database)?;
        let _guard = lock.try_acquire()?;

        let mut store = SnapshotStore::open(&database)?;
        store.check_binding(&root, algorithm)?;
        let previous = store.load_snapshot()?;
        info!(
            root = %root.display(),
            tracked = previous.active_count(),
            missing = previous.len() - previous.active_count(),
            threads = self.pool.threads(),
            %algorithm,
            "Starting run"
        );

        let walker = Walker::new(
            &root,
            self.entry_filter(&root, &database)?,
            self.config.follow_symlinks,
        )?;
        let hasher = FileHasher::from_config(&self.config);
        let observed = self
            .pool
            .observe(walker, &hasher, cancel)
            .map_err(|e| match e {
                ScanError::Interrupted => TrackError::Cancelled,
                other => other.into(),
            })?;

        let classification = classify(&previous, &observed, Utc::now());
        if cancel.is_cancelled() {
            warn!("Run cancelled before commit");
            return Err(TrackError::Cancelled);
        }

        let finished_at = Utc::now();
        let stats = RunStats {
            started_at,
            finished_at,
            files_seen: observed.file_count() as u64,
            bytes_hashed: observed.bytes_hashed,
            event_count: classification.events.len() as u64,
        };

        let mut batch = store.begin()?;
        batch.bind(&root, algorithm)?;
        let run_id = batch.record_run(&stats)?;
        batch.replace_snapshot(&classification.next)?;
        batch.append_events(Some(run_id), &classification.events)?;
        batch.commit()?;

        let counts = classification.counts();
        info!(
            run = run_id.0,
            events = classification.events.len(),
            corrupted = counts.get(&EventKind::Corrupted).copied().unwrap_or(0),
            missing = counts.get(&EventKind::Missing).copied().unwrap_or(0),
            "Run committed"
        );

        let unverified = classification.skipped().cloned().collect();
        let tracked = classification.next.active_count();
        let missing_records = classification.next.len() - tracked;
        Ok(RunReport {
            run_id,
            root,
            database,
            algorithm,
            started_at,
            finished_at,
            hash_duration: observed.duration,
            files_seen: stats.files_seen,
            bytes_hashed: stats.bytes_hashed,
            tracked,
            missing_records,
            counts,
            events: classification.events,
            read_failures: observed.failures,
            unverified,
        })
    }

    fn open_existing_store(&self) -> Result<(PathBuf, SnapshotStore), TrackError> {
        let root = self.canonical_root()?;
        let database = self.config.database_path(&root);
        if !database.is_file() {
            return Err(TrackError::NoStore { path: database });
        }
        let store = SnapshotStore::open(&database)?;
        if let Some(expected) = store.root()? {
            if expected != root {
                return Err(StoreError::RootMismatch {
                    expected,
                    actual: root,
                }
                .into());
            }
        }
        Ok((database, store))
    }

    /// Read the audit log.
    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<AuditEntry>, TrackError> {
        let (_, store) = self.open_existing_store()?;
        match query.path {
            Some(ref path) => {
                let query = query.clone().path(normalize_path(path));
                Ok(store.history(&query)?)
            }
            None => Ok(store.history(query)?),
        }
    }

    /// Drop the record of a missing path, logging a `Forgotten` event.
    pub fn forget(&self, path: &str) -> Result<AuditEntry, TrackError> {
        let (database, mut store) = self.open_existing_store()?;
        let mut lock = RunLock::for_database(&database)?;
        let _guard = lock.try_acquire()?;
        Ok(store.forget(normalize_path(path), Utc::now())?)
    }
}

/// Normalise a user-supplied relative path to the stored form.
fn normalize_path(path: &str) -> &str {
    let path = path.trim_start_matches("./");
    path.trim_end_matches('/')
}
