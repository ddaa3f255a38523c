//! Offline session cache.
//!
//! Keeps, per session, the recent message history, the queue of operations
//! the server has not confirmed yet, and the last-known metadata snapshot,
//! all on a namespaced key-value store so they survive restarts.
//!
//! # Layout
//!
//! ```text
//! messages:{session}   last N messages, oldest first
//! pending:{session}    unsynced operations, insertion order
//! metadata:{session}   metadata snapshot
//! lru-index            per-session recency + size, aggregate size
//! ```
//!
//! # Size budget
//!
//! Every write measures the record it replaces and the record it stores and
//! applies the difference to the index, so the aggregate always equals the
//! sum of the stored records. When a write pushes the aggregate over
//! `max_total_cache_size_bytes`, whole sessions are evicted least recently
//! used first until it drops to `eviction_target_ratio` of the maximum.
//!
//! Eviction does not spare sessions with pending operations: they are
//! dropped with the session, logged, and counted in [`CacheStats`].

mod cache;
mod error;
mod index;
mod keys;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use cache::{CacheConfig, PersistentCache};
pub use error::{CacheError, CacheResult};
pub use index::measured_size;
pub use keys::{parse_key, RecordKind, LRU_INDEX_KEY};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use types::{
    CacheStats, CachedMessage, CachedSessionMetadata, CommandPayload, ExecutionState, LruEntry,
    MessageRole, OperationKind, PendingOperation, PermissionResponsePayload, StateUpdatePayload,
};
