//! Streaming content hashing with bounded memory, retries and a per-file deadline.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use archivekeeper_core::{ContentHash, HashAlgorithm, HashError, KeeperConfig, Mtime};

/// How often a waiting attempt rechecks cancellation.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Digest of a file plus the metadata of the handle that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashedFile {
    /// Content digest.
    pub hash: ContentHash,
    /// Size reported by the opened handle.
    pub size: u64,
    /// Modification time reported by the opened handle.
    pub mtime: Mtime,
}

/// Incremental state for either supported algorithm.
enum DigestState {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(bytes),
            Self::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    fn finalize(self) -> ContentHash {
        match self {
            Self::Sha256(h) => ContentHash::new(h.finalize().into()),
            Self::Blake3(h) => ContentHash::new(*h.finalize().as_bytes()),
        }
    }
}

/// Hash an in-memory buffer.
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> ContentHash {
    let mut state = DigestState::new(algorithm);
    state.update(bytes);
    state.finalize()
}

/// Computes content digests by streaming files in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct FileHasher {
    algorithm: HashAlgorithm,
    chunk_size: usize,
    max_retries: u32,
    timeout: Duration,
    progress_threshold: u64,
}

impl FileHasher {
    /// Create a hasher with default limits.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self::from_config(&KeeperConfig {
            hash_algorithm: algorithm,
            ..KeeperConfig::default()
        })
    }

    /// Create a hasher from run configuration.
    pub fn from_config(config: &KeeperConfig) -> Self {
        Self {
            algorithm: config.hash_algorithm,
            chunk_size: config.chunk_size.max(1),
            max_retries: config.max_retries,
            timeout: config.file_timeout(),
            progress_threshold: config.progress_log_threshold,
        }
    }

    /// Override the per-file deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Algorithm in use.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash a file, retrying transient failures up to the configured limit.
    pub fn hash_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<HashedFile, HashError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.hash_with_deadline(path, cancel, attempt) {
                Ok(hashed) => return Ok(hashed),
                Err(err) if err.is_transient() && attempt <= self.max_retries => {
                    warn!(path = %path.display(), attempt, error = %err, "retrying hash");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run one attempt on a helper thread so a read that never returns
    /// still yields `TimedOut` once the deadline passes.
    ///
    /// A stuck helper is abandoned with its token cancelled; it exits on its
    /// own if the read ever completes.
    fn hash_with_deadline(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<HashedFile, HashError> {
        let deadline = Instant::now() + self.timeout;
        let child = cancel.child_token();
        let (tx, rx) = mpsc::sync_channel(1);

        let hasher = self.clone();
        let owned_path = path.to_path_buf();
        let token = child.clone();
        thread::Builder::new()
            .name("keeper-read".into())
            .spawn(move || {
                let _ = tx.send(hasher.hash_once(&owned_path, &token, attempt));
            })
            .map_err(|source| HashError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining.min(WAIT_SLICE)) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        child.cancel();
                        return Err(HashError::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        child.cancel();
                        warn!(path = %path.display(), attempt, "read exceeded deadline");
                        return Err(HashError::TimedOut {
                            path: path.to_path_buf(),
                            timeout: self.timeout,
                            attempts: attempt,
                        });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(HashError::Io {
                        path: path.to_path_buf(),
                        source: std::io::Error::other("hashing thread exited"),
                    });
                }
            }
        }
    }

    fn hash_once(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<HashedFile, HashError> {
        let io_err = |source: std::io::Error| HashError::Io {
            path: path.to_path_buf(),
            source,
        };

        let deadline = Instant::now() + self.timeout;
        let mut file = File::open(path).map_err(io_err)?;
        let metadata = file.metadata().map_err(io_err)?;
        let size = metadata.len();
        let mtime = Mtime::from_system_time(metadata.modified().map_err(io_err)?);

        let log_progress = size > self.progress_threshold;
        if log_progress {
            info!(
                "Hashing large file ({:.2} GB): {}",
                size as f64 / (1024.0 * 1024.0 * 1024.0),
                path.display()
            );
        }

        let mut state = DigestState::new(self.algorithm);
        let mut buffer = vec![0u8; self.chunk_size.min(size.max(1) as usize)];
        let mut bytes_read: u64 = 0;
        let mut last_logged_percent = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(HashError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(HashError::TimedOut {
                    path: path.to_path_buf(),
                    timeout: self.timeout,
                    attempts: attempt,
                });
            }

            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_err(e)),
            };
            state.update(&buffer[..n]);
            bytes_read += n as u64;

            if log_progress {
                let percent = (bytes_read * 100 / size.max(1)) as u32;
                if percent >= last_logged_percent + 25 {
                    info!(
                        "  Progress: {percent}% ({:.2} GB)",
                        bytes_read as f64 / (1024.0 * 1024.0 * 1024.0)
                    );
                    last_logged_percent = percent;
                }
            }
        }

        if log_progress {
            info!("  Completed: {}", path.display());
        }
        debug!(path = %path.display(), bytes = bytes_read, "hashed");

        Ok(HashedFile {
            hash: state.finalize(),
            size,
            mtime,
        })
    }
}
