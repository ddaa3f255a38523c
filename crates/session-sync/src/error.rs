//! Sync error types.

use client_core::CoreError;
use delivery_tracker::{DeliveryError, TransportError};
use offline_cache::CacheError;
use thiserror::Error;

/// Sync error type.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Cache write failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Delivery failed in a way the coordinator does not absorb
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Transport refused to connect
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Operation body can never be applied
    #[error("Invalid operation {id}: {reason}")]
    InvalidOperation { id: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
