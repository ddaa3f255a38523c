//! Behavioural tests for the sync coordinator.
//!
//! - `harness.rs`  - simulated server transport
//! - `dispatch.rs` - dispatch outcomes and disconnects
//! - `replay.rs`   - reconnect replay ordering and budgets

pub(crate) mod harness;
