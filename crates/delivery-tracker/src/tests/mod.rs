//! Behavioural tests for the delivery tracker.
//!
//! - `harness.rs` - scripted transport and event helpers
//! - `submit.rs`  - registration, dedup, ack handling
//! - `retry.rs`   - timeouts, backoff spacing, retry exhaustion
//! - `cancel.rs`  - cancel and clear_all

mod cancel;
