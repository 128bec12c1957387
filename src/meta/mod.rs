//! Metadata cache
//!
//! Responsibilities:
//! - Keep one durable record (size, content type, timestamp) per known URI
//!   so that stat/exists queries avoid round-trips to the bucket.
//! - Front the durable table with a fast in-process cache and populate it
//!   single-flight under a per-URI lock with bounded waits.
//! - Persist first, then invalidate, on every mutation.
//!
//! Submodules:
//! - `record`: the cached record type
//! - `store`: durable persistence (`RecordStore`, SQLite via sqlx, in-memory)
//! - `lock`: population lock capability
//! - `fast_cache`: fast read-through layer (moka)
//! - `cache`: `MetadataCache`, the read/write/delete protocol
pub mod cache;
pub mod fast_cache;
pub mod lock;
pub mod record;
pub mod store;

pub use cache::MetadataCache;
pub use fast_cache::{FastCache, MokaFastCache};
pub use lock::{LocalLockManager, LockManager, LockToken};
pub use record::CachedFileRecord;
pub use store::{InMemoryRecordStore, MetaError, RecordStore, SqliteRecordStore};
