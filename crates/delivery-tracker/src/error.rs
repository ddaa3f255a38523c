//! Delivery error types.

use crate::TransportError;
use thiserror::Error;

/// Delivery error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The local id already has an attempt cycle running
    #[error("Message {0} is already pending")]
    DuplicateSubmission(String),

    /// No ack arrived before the ack timeout
    #[error("No ack received within {0} ms")]
    AckTimeout(u64),

    /// The transport failed the request
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a logical error; never retried
    #[error("Server rejected message {local_id}: {message}")]
    Rejected { local_id: String, message: String },

    /// Every attempt failed
    #[error("Max retries exceeded for message {local_id} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        local_id: String,
        attempts: u32,
        last_error: String,
    },

    /// Settled by `clear_all` when the connection went away
    #[error("Connection closed")]
    ConnectionClosed,

    /// Settled by `cancel`
    #[error("Delivery of message {0} was cancelled")]
    Cancelled(String),

    /// The tracker went away without settling the message
    #[error("Delivery of message {0} was abandoned")]
    Abandoned(String),
}

impl DeliveryError {
    /// Whether the failure belongs to the timeout/transport family that the
    /// attempt cycle retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AckTimeout(_) | Self::Transport(_))
    }
}

/// Result type alias using DeliveryError.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
