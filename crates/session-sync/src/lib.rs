//! Offline-first session sync.
//!
//! Ties the [`offline_cache`] queue to the [`delivery_tracker`]: every
//! outgoing operation is written to the cache before it is sent and removed
//! only once the server has answered for it. Whatever is still queued when
//! the connection comes back is replayed oldest first, one operation at a
//! time.
//!
//! ```text
//! dispatch ──> pending:{session} ──> tracker.send ──> ack ──> dequeue
//!                    │                    │
//!                    │              retries exhausted ──> retry_count += 1
//!                    │
//! reconnect ──> replay (FIFO by created_at, serial) ──> same as above
//! disconnect ──> tracker.clear_all (queue untouched)
//! ```

mod coordinator;
mod error;
mod settings;

#[cfg(test)]
mod tests;

pub use coordinator::{new_operation, DispatchOutcome, ReplaySummary, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use settings::SyncConfig;
