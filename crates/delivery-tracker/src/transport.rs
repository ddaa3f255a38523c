//! Transport seam.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors a transport reports for a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection is open
    #[error("Not connected")]
    NotConnected,

    /// The connection dropped while the request was in flight
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The peer answered with something that is not a valid ack
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Request/acknowledge channel to the server.
///
/// `request` resolves with the raw ack body; the tracker validates it.
/// Connection state is only observed by the tracker through failed requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `payload` under `event` and wait for the server's reply.
    async fn request(&self, event: &str, payload: Value) -> Result<Value, TransportError>;

    /// Open the connection.
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Close the connection.
    async fn disconnect(&self) {}
}
