//! Change classification and run orchestration for archivekeeper.
//!
//! Each run compares what is on disk now with the snapshot committed by the
//! previous run and classifies every path:
//!
//! - **Added**: a path seen for the first time
//! - **Modified**: content changed along with size or mtime
//! - **Moved**: content vanished from one path and appeared at another
//! - **Missing**: a tracked path is gone
//! - **Corrupted**: content changed while size and mtime did not (bit rot)
//! - **Recovered**: a missing path reappeared with its old content
//! - **ReadError**: the path could not be read this run
//!
//! [`classify`] is a pure function over a snapshot and an observation set;
//! [`Tracker`] wires it to the walker, hasher and store.

mod classifier;
mod error;
mod pairing;
mod report;
mod tracker;

pub use classifier::{Classification, Outcome, classify};
pub use error::TrackError;
pub use pairing::{MovePair, edit_distance, pair_moves};
pub use report::{RunReport, describe_event, format_size, render_history};
pub use tracker::Tracker;

// Re-export the types callers need alongside the tracker
pub use archivekeeper_core::{
    ChangeEvent, EventKind, HashAlgorithm, KeeperConfig, ObservationSet, Snapshot,
};
pub use archivekeeper_store::HistoryQuery;
