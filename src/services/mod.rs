//! External collaborators: the durable timer store and the snapshot cache
//!
//! Both are blocking, trait-based boundaries with SQLite implementations.

pub mod repository;
pub mod snapshot_cache;
pub mod sqlite_store;

// Re-export main types
pub use repository::TimerRepository;
pub use snapshot_cache::{
    snapshot_key, SnapshotCache, SqliteSnapshotCache, DEFAULT_SNAPSHOT_TTL, SNAPSHOT_KEY_PREFIX,
};
pub use sqlite_store::SqliteTimerRepository;
