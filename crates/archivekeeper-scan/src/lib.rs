//! File walking and content hashing for archivekeeper.
//!
//! This crate produces the observation set a run is classified from:
//!
//! - **Iterative walking** with an explicit directory stack, deterministic order
//! - **Streaming hashes** (SHA-256 or BLAKE3) in fixed-size chunks
//! - **Bounded parallelism** via a dedicated rayon pool
//! - **Progress updates** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use archivekeeper_scan::{EntryFilter, FileHasher, HashPool, Walker};
//! use archivekeeper_core::HashAlgorithm;
//! use tokio_util::sync::CancellationToken;
//!
//! let walker = Walker::new("/archive", EntryFilter::default(), false).unwrap();
//! let hasher = FileHasher::new(HashAlgorithm::Sha256);
//! let pool = HashPool::new(4).unwrap();
//! let observed = pool.observe(walker, &hasher, &CancellationToken::new()).unwrap();
//!
//! println!("Hashed {} files", observed.file_count());
//! ```

mod filter;
mod hasher;
mod inode;
mod pool;
mod progress;
mod walker;

pub use filter::EntryFilter;
pub use hasher::{FileHasher, HashedFile, hash_bytes};
pub use inode::{DirKey, InodeTracker};
pub use pool::HashPool;
pub use progress::ScanProgress;
pub use walker::{WalkEntry, Walker, relative_path};

// Re-export core types for convenience
pub use archivekeeper_core::{
    ContentHash, HashAlgorithm, ObservationSet, ObservedFile, ReadFailure, ScanError,
};
