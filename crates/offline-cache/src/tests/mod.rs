//! Behavioural tests for the offline cache.
//!
//! - `harness.rs`  - record builders, failing store, size invariant check
//! - `messages.rs` - history trimming, metadata, clearing
//! - `pending.rs`  - pending operation queue
//! - `eviction.rs` - LRU budget enforcement
//! - `recovery.rs` - restarts, index rebuild, failed writes

mod eviction;
mod recovery;
