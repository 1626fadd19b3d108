//! Hashing progress reporting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// Progress information during a run.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Number of files hashed so far.
    pub files_hashed: u64,
    /// Total bytes hashed so far.
    pub bytes_hashed: u64,
    /// Number of paths that could not be read.
    pub failures: u64,
    /// Most recently finished path.
    pub current_path: PathBuf,
    /// Time elapsed since the run started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            files_hashed: 0,
            bytes_hashed: 0,
            failures: 0,
            current_path: PathBuf::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate hashing rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_hashed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Calculate hashing rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.bytes_hashed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared counters updated by hashing workers.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    files_hashed: AtomicU64,
    bytes_hashed: AtomicU64,
    failures: AtomicU64,
    every: u64,
    tx: broadcast::Sender<ScanProgress>,
}

impl ProgressTracker {
    pub fn new(tx: broadcast::Sender<ScanProgress>, every: u64) -> Self {
        Self {
            start_time: Instant::now(),
            files_hashed: AtomicU64::new(0),
            bytes_hashed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            every: every.max(1),
            tx,
        }
    }

    pub fn record_file(&self, size: u64, path: &std::path::Path) {
        self.bytes_hashed.fetch_add(size, Ordering::Relaxed);
        let count = self.files_hashed.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.every == 0 {
            self.publish(path.to_path_buf());
        }
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Send a final update regardless of the sampling interval.
    pub fn finish(&self) {
        self.publish(PathBuf::new());
    }

    pub fn snapshot(&self, current_path: PathBuf) -> ScanProgress {
        ScanProgress {
            files_hashed: self.files_hashed.load(Ordering::Relaxed),
            bytes_hashed: self.bytes_hashed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            current_path,
            elapsed: self.start_time.elapsed(),
        }
    }

    fn publish(&self, current_path: PathBuf) {
        // No subscribers is fine.
        let _ = self.tx.send(self.snapshot(current_path));
    }
}
