//! Persistence for archivekeeper.
//!
//! One SQLite database per archive holds:
//!
//! - **files**: the current snapshot, one row per tracked path
//! - **events**: the append-only audit log, guarded by triggers
//! - **runs**: totals for every committed run
//! - **meta**: the root and digest algorithm the store is bound to
//!
//! Every run commits through a single [`SnapshotWriteBatch`]; a run that
//! fails or is cancelled before [`SnapshotWriteBatch::commit`] leaves the
//! previous snapshot untouched. [`RunLock`] keeps a second run from
//! starting against the same database.

mod error;
mod history;
mod lock;
mod rows;
mod schema;
mod store;

pub use error::{LockError, StoreError};
pub use history::HistoryQuery;
pub use lock::{RunLock, RunLockGuard, lock_path};
pub use schema::SCHEMA_VERSION;
pub use store::{RunRecord, RunStats, SnapshotStore, SnapshotWriteBatch};
