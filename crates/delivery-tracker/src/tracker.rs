//! Delivery tracker: one attempt cycle per pending local id.

use crate::{
    AckResponse, DeliveryConfig, DeliveryError, DeliveryEvent, DeliveryResult, EventEmitter,
    Transport, TransportError,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A message waiting for its ack.
struct PendingMessage {
    session_id: String,
    payload: Value,
    created_at: DateTime<Utc>,
    retry_count: u32,
    /// Distinguishes this record from an earlier one with the same local id,
    /// so a stale attempt task can never settle a newer submission.
    generation: u64,
    /// The attempt task. It owns both the ack timeout and the backoff sleep.
    timer: Option<JoinHandle<()>>,
    settle: oneshot::Sender<DeliveryResult<AckResponse>>,
}

impl PendingMessage {
    fn envelope(&self, local_id: &str) -> Value {
        json!({
            "sessionId": self.session_id,
            "localId": local_id,
            "payload": self.payload,
        })
    }

    fn age_ms(&self) -> i64 {
        (Utc::now() - self.created_at).num_milliseconds()
    }
}

#[derive(Default)]
struct TrackerState {
    pending: HashMap<String, PendingMessage>,
    next_generation: u64,
}

struct TrackerInner {
    config: DeliveryConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<TrackerState>,
    events: EventEmitter,
}

/// Why a single attempt did not produce an ack.
enum AttemptFailure {
    Timeout,
    Transport(TransportError),
}

impl AttemptFailure {
    fn into_error(self, ack_timeout: Duration) -> DeliveryError {
        match self {
            Self::Timeout => DeliveryError::AckTimeout(ack_timeout.as_millis() as u64),
            Self::Transport(e) => DeliveryError::Transport(e),
        }
    }
}

/// Handle to the eventual outcome of a submitted message.
#[must_use = "a pending delivery does nothing unless awaited"]
pub struct PendingDelivery {
    local_id: String,
    receiver: oneshot::Receiver<DeliveryResult<AckResponse>>,
}

impl PendingDelivery {
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Wait until the message is acked, fails, or is cancelled.
    pub async fn wait(self) -> DeliveryResult<AckResponse> {
        let Self { local_id, receiver } = self;
        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Abandoned(local_id)),
        }
    }
}

/// Tracks in-flight messages and drives their attempt cycles.
///
/// Cloning is cheap; clones share the same pending set. All methods must be
/// called from within a tokio runtime.
#[derive(Clone)]
pub struct DeliveryTracker {
    inner: Arc<TrackerInner>,
}

impl DeliveryTracker {
    /// Create a tracker over the given transport.
    pub fn new(config: DeliveryConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                config,
                transport,
                state: Mutex::new(TrackerState::default()),
                events: EventEmitter::new(),
            }),
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.inner.events.subscribe()
    }

    /// Register a message and start its attempt cycle.
    ///
    /// Fails with [`DeliveryError::DuplicateSubmission`] and changes nothing
    /// if `local_id` is already pending.
    pub fn submit(
        &self,
        session_id: &str,
        local_id: &str,
        payload: Value,
    ) -> DeliveryResult<PendingDelivery> {
        let (tx, rx) = oneshot::channel();

        let mut state = self.inner.state.lock();
        if state.pending.contains_key(local_id) {
            warn!(local_id = %local_id, "Rejected duplicate submission");
            return Err(DeliveryError::DuplicateSubmission(local_id.to_string()));
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        // Emitted under the lock so it always precedes message-sending.
        self.inner.events.emit(DeliveryEvent::MessagePending {
            local_id: local_id.to_string(),
            session_id: session_id.to_string(),
        });

        let timer = tokio::spawn(run_attempts(
            self.inner.clone(),
            local_id.to_string(),
            generation,
        ));

        state.pending.insert(
            local_id.to_string(),
            PendingMessage {
                session_id: session_id.to_string(),
                payload,
                created_at: Utc::now(),
                retry_count: 0,
                generation,
                timer: Some(timer),
                settle: tx,
            },
        );
        drop(state);

        debug!(session_id = %session_id, local_id = %local_id, "Message submitted");

        Ok(PendingDelivery {
            local_id: local_id.to_string(),
            receiver: rx,
        })
    }

    /// Submit and wait for the outcome.
    pub async fn send(
        &self,
        session_id: &str,
        local_id: &str,
        payload: Value,
    ) -> DeliveryResult<AckResponse> {
        self.submit(session_id, local_id, payload)?.wait().await
    }

    /// Cancel a pending message. Returns whether anything was cancelled.
    pub fn cancel(&self, local_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(record) = state.pending.remove(local_id) else {
            return false;
        };

        if let Some(timer) = record.timer {
            timer.abort();
        }
        let _ = record
            .settle
            .send(Err(DeliveryError::Cancelled(local_id.to_string())));
        self.inner.events.emit(DeliveryEvent::MessageCancelled {
            local_id: local_id.to_string(),
        });
        drop(state);

        info!(local_id = %local_id, "Message cancelled");
        true
    }

    /// Fail every pending message with [`DeliveryError::ConnectionClosed`].
    ///
    /// Called when the transport disconnects.
    pub fn clear_all(&self) {
        let mut state = self.inner.state.lock();
        let mut local_ids: Vec<String> = Vec::with_capacity(state.pending.len());

        for (local_id, record) in state.pending.drain() {
            if let Some(timer) = record.timer {
                timer.abort();
            }
            let _ = record.settle.send(Err(DeliveryError::ConnectionClosed));
            local_ids.push(local_id);
        }
        local_ids.sort();

        let count = local_ids.len();
        self.inner
            .events
            .emit(DeliveryEvent::AllCleared { local_ids });
        drop(state);

        info!(count = count, "Cleared all pending messages");
    }

    /// Ids of all pending messages, sorted.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.state.lock().pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_pending(&self, local_id: &str) -> bool {
        self.inner.state.lock().pending.contains_key(local_id)
    }

    /// Failed attempts so far for a pending message.
    pub fn retry_count(&self, local_id: &str) -> Option<u32> {
        self.inner
            .state
            .lock()
            .pending
            .get(local_id)
            .map(|record| record.retry_count)
    }
}

/// The attempt cycle for one record.
///
/// Exits as soon as the record is gone or replaced, so only one cycle ever
/// acts on a given generation.
async fn run_attempts(inner: Arc<TrackerInner>, local_id: String, generation: u64) {
    loop {
        let envelope = {
            let state = inner.state.lock();
            let Some(record) = state
                .pending
                .get(&local_id)
                .filter(|record| record.generation == generation)
            else {
                return;
            };

            inner.events.emit(DeliveryEvent::MessageSending {
                local_id: local_id.clone(),
                retry_count: record.retry_count,
            });
            record.envelope(&local_id)
        };

        debug!(local_id = %local_id, "Sending message");

        let request = inner
            .transport
            .request(&inner.config.request_event, envelope);
        let outcome = match tokio::time::timeout(inner.config.ack_timeout, request).await {
            Ok(Ok(raw)) => parse_ack(&local_id, raw),
            Ok(Err(e)) => Err(AttemptFailure::Transport(e)),
            Err(_) => Err(AttemptFailure::Timeout),
        };

        match outcome {
            Ok(ack) => {
                inner.settle_with_ack(&local_id, generation, ack);
                return;
            }
            Err(failure) => match inner.record_failure(&local_id, generation, failure) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            },
        }
    }
}

/// Validate a raw ack body against the submitted id.
fn parse_ack(local_id: &str, raw: Value) -> Result<AckResponse, AttemptFailure> {
    let ack: AckResponse = serde_json::from_value(raw).map_err(|e| {
        AttemptFailure::Transport(TransportError::Protocol(format!("malformed ack: {}", e)))
    })?;

    match ack.local_id.as_deref() {
        Some(acked) if acked != local_id => Err(AttemptFailure::Transport(
            TransportError::Protocol(format!("ack for {} while waiting on {}", acked, local_id)),
        )),
        _ => Ok(ack),
    }
}

impl TrackerInner {
    fn settle_with_ack(&self, local_id: &str, generation: u64, ack: AckResponse) {
        let mut state = self.state.lock();
        let is_current = state
            .pending
            .get(local_id)
            .is_some_and(|record| record.generation == generation);
        if !is_current {
            return;
        }
        let Some(record) = state.pending.remove(local_id) else {
            return;
        };

        if ack.is_ok() {
            self.events.emit(DeliveryEvent::MessageAcked {
                local_id: local_id.to_string(),
                message_id: ack.message_id.clone(),
                duplicate: ack.is_duplicate(),
            });
            info!(
                local_id = %local_id,
                message_id = ?ack.message_id,
                duplicate = ack.is_duplicate(),
                attempts = record.retry_count + 1,
                age_ms = record.age_ms(),
                "Message acked"
            );
            let _ = record.settle.send(Ok(ack));
        } else {
            let message = ack
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            self.events.emit(DeliveryEvent::MessageError {
                local_id: local_id.to_string(),
                error: message.clone(),
            });
            warn!(local_id = %local_id, error = %message, "Server rejected message");
            let _ = record.settle.send(Err(DeliveryError::Rejected {
                local_id: local_id.to_string(),
                message,
            }));
        }
    }

    /// Count a failed attempt. Returns the backoff before the next attempt,
    /// or `None` when the record settled (or no longer belongs to the caller).
    fn record_failure(
        &self,
        local_id: &str,
        generation: u64,
        failure: AttemptFailure,
    ) -> Option<Duration> {
        let error = failure.into_error(self.config.ack_timeout);
        let mut state = self.state.lock();
        let record = state
            .pending
            .get_mut(local_id)
            .filter(|record| record.generation == generation)?;

        record.retry_count += 1;
        let retry_count = record.retry_count;

        if retry_count < self.config.max_retries {
            let delay = self.config.backoff_delay(retry_count);
            self.events.emit(DeliveryEvent::MessageRetry {
                local_id: local_id.to_string(),
                retry_count,
                delay_ms: delay.as_millis() as u64,
                error: error.to_string(),
            });
            warn!(
                local_id = %local_id,
                attempt = retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Send failed, retrying"
            );
            return Some(delay);
        }

        let record = state.pending.remove(local_id)?;
        self.events.emit(DeliveryEvent::MessageFailed {
            local_id: local_id.to_string(),
            retry_count,
            error: error.to_string(),
        });
        warn!(
            local_id = %local_id,
            attempts = retry_count,
            age_ms = record.age_ms(),
            error = %error,
            "Max retries exceeded"
        );
        let _ = record.settle.send(Err(DeliveryError::RetriesExhausted {
            local_id: local_id.to_string(),
            attempts: retry_count,
            last_error: error.to_string(),
        }));
        None
    }
}
