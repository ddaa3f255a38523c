//! Lifecycle events broadcast by the tracker.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Delivery lifecycle event.
///
/// Serializes with a `type` tag carrying the event name, e.g.
/// `{"type":"message-retry","localId":"m1","retryCount":1,...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum DeliveryEvent {
    MessagePending {
        local_id: String,
        session_id: String,
    },
    MessageSending {
        local_id: String,
        retry_count: u32,
    },
    MessageAcked {
        local_id: String,
        message_id: Option<String>,
        duplicate: bool,
    },
    MessageError {
        local_id: String,
        error: String,
    },
    MessageRetry {
        local_id: String,
        retry_count: u32,
        delay_ms: u64,
        error: String,
    },
    MessageFailed {
        local_id: String,
        retry_count: u32,
        error: String,
    },
    MessageCancelled {
        local_id: String,
    },
    AllCleared {
        local_ids: Vec<String>,
    },
}

impl DeliveryEvent {
    /// Event name as seen by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessagePending { .. } => "message-pending",
            Self::MessageSending { .. } => "message-sending",
            Self::MessageAcked { .. } => "message-acked",
            Self::MessageError { .. } => "message-error",
            Self::MessageRetry { .. } => "message-retry",
            Self::MessageFailed { .. } => "message-failed",
            Self::MessageCancelled { .. } => "message-cancelled",
            Self::AllCleared { .. } => "all-cleared",
        }
    }

    /// The message this event is about. `None` for `all-cleared`.
    pub fn local_id(&self) -> Option<&str> {
        match self {
            Self::MessagePending { local_id, .. }
            | Self::MessageSending { local_id, .. }
            | Self::MessageAcked { local_id, .. }
            | Self::MessageError { local_id, .. }
            | Self::MessageRetry { local_id, .. }
            | Self::MessageFailed { local_id, .. }
            | Self::MessageCancelled { local_id } => Some(local_id),
            Self::AllCleared { .. } => None,
        }
    }
}

/// Broadcast-based event emitter.
///
/// `emit` never blocks; receivers that fall behind observe a lag error
/// instead of stalling the tracker.
pub struct EventEmitter {
    tx: broadcast::Sender<DeliveryEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit to all current subscribers. Returns how many received it.
    pub fn emit(&self, event: DeliveryEvent) -> usize {
        self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
