//! Delivery tracking for outbound messages over an unreliable channel.
//!
//! Every outbound message carries a client-generated `local_id`. The
//! [`DeliveryTracker`] sends it through a [`Transport`], waits for the
//! server's ack and retries timed-out or failed attempts with exponential
//! backoff until the retry budget is spent.
//!
//! # Core Invariants
//!
//! 1. **One record per id**: a second submit of a pending `local_id` is rejected
//! 2. **One attempt at a time**: attempt N+1 starts only after attempt N
//!    was acked, failed or timed out
//! 3. **Duplicates are success**: an ack flagged `duplicate` settles as delivered
//! 4. **Logical errors are final**: an `error` ack is never retried
//!
//! # Lifecycle
//!
//! ```text
//! submit -> message-pending -> message-sending -+-> message-acked
//!                                  ^            +-> message-error
//!                                  |            +-> message-retry --(backoff)--+
//!                                  +-------------------------------------------+
//!                                               +-> message-failed
//! cancel -> message-cancelled     clear_all -> all-cleared
//! ```

mod ack;
mod config;
mod error;
mod events;
mod tracker;
mod transport;

#[cfg(test)]
mod tests;

pub use ack::{AckResponse, AckResult};
pub use config::DeliveryConfig;
pub use error::{DeliveryError, DeliveryResult};
pub use events::{DeliveryEvent, EventEmitter};
pub use tracker::{DeliveryTracker, PendingDelivery};
pub use transport::{Transport, TransportError};
