//! Bounded parallel hashing of walker output.

use std::time::Instant;

use rayon::iter::{ParallelBridge, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use archivekeeper_core::{HashError, ObservationSet, ObservedFile, ReadFailure, ScanError};

use crate::hasher::FileHasher;
use crate::progress::{ProgressTracker, ScanProgress};
use crate::walker::Walker;

/// Emit a progress update every this many files.
const PROGRESS_EVERY: u64 = 100;

enum Hashed {
    File(ObservedFile),
    Failed(ReadFailure),
    Cancelled,
}

/// Worker pool that hashes files as the walker finds them.
///
/// The walker is consumed lazily, so hashing starts before the walk is
/// complete. [`HashPool::observe`] only returns once every file is done:
/// that is the barrier the classifier needs.
pub struct HashPool {
    pool: ThreadPool,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl HashPool {
    /// Create a pool with `threads` workers (0 = one per CPU).
    pub fn new(threads: usize) -> Result<Self, ScanError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("keeper-hash-{i}"))
            .build()
            .map_err(|e| ScanError::Pool {
                message: e.to_string(),
            })?;
        let (progress_tx, _) = broadcast::channel(100);
        Ok(Self { pool, progress_tx })
    }

    /// Subscribe to hashing progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Walk and hash everything, returning the complete observation set.
    ///
    /// Per-file failures are collected, never fatal. Cancellation discards
    /// all partial work and returns [`ScanError::Interrupted`].
    pub fn observe(
        &self,
        walker: Walker,
        hasher: &FileHasher,
        cancel: &CancellationToken,
    ) -> Result<ObservationSet, ScanError> {
        let start = Instant::now();
        let tracker = ProgressTracker::new(self.progress_tx.clone(), PROGRESS_EVERY);

        let results: Vec<Hashed> = self.pool.install(|| {
            walker
                .par_bridge()
                .map(|item| {
                    if cancel.is_cancelled() {
                        return Hashed::Cancelled;
                    }
                    let entry = match item {
                        Ok(entry) => entry,
                        Err(failure) => {
                            warn!(
                                path = %failure.path,
                                kind = %failure.kind,
                                "{}",
                                failure.message
                            );
                            tracker.record_failure();
                            return Hashed::Failed(failure);
                        }
                    };
                    match hasher.hash_file(&entry.abs_path, cancel) {
                        Ok(hashed) => {
                            tracker.record_file(hashed.size, &entry.abs_path);
                            Hashed::File(ObservedFile {
                                path: entry.path,
                                size: hashed.size,
                                mtime: hashed.mtime,
                                content_hash: hashed.hash,
                            })
                        }
                        Err(HashError::Cancelled) => Hashed::Cancelled,
                        Err(err) => {
                            warn!(path = %entry.path, error = %err, "could not hash file");
                            tracker.record_failure();
                            Hashed::Failed(ReadFailure::from_hash(entry.path, &err))
                        }
                    }
                })
                .collect()
        });

        if cancel.is_cancelled() {
            info!("Run cancelled, discarding {} partial results", results.len());
            return Err(ScanError::Interrupted);
        }

        let mut observations = ObservationSet::new();
        for result in results {
            match result {
                Hashed::File(file) => observations.record_file(file),
                Hashed::Failed(failure) => observations.record_failure(failure),
                Hashed::Cancelled => return Err(ScanError::Interrupted),
            }
        }
        observations.finish(start.elapsed());
        tracker.finish();

        info!(
            files = observations.file_count(),
            failures = observations.failures.len(),
            bytes = observations.bytes_hashed,
            "Hashing complete in {:.2}s",
            observations.duration.as_secs_f64()
        );
        Ok(observations)
    }
}
