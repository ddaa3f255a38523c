//! Offline-first dispatch and reconnect replay.

use crate::{SyncConfig, SyncError, SyncResult};
use chrono::Utc;
use delivery_tracker::{AckResponse, DeliveryError, DeliveryEvent, DeliveryTracker, Transport};
use offline_cache::{OperationKind, PendingOperation, PersistentCache};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Build a new operation with a fresh id.
pub fn new_operation(session_id: &str, operation: OperationKind) -> PendingOperation {
    PendingOperation::new(&Uuid::new_v4().to_string(), session_id, operation)
}

/// What happened to a dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Acked by the server (possibly as a duplicate) and dequeued.
    Delivered(AckResponse),
    /// Refused by the server and dequeued.
    Rejected(String),
    /// Left in the queue without a failed attempt being counted: offline,
    /// a replay pass is running and will send it, or the connection
    /// dropped mid-flight.
    Queued,
    /// Every attempt failed; queued with the given replay retry count.
    Failed { retry_count: u32 },
    /// The same id is already being delivered.
    AlreadyInFlight,
}

/// Counts from one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    /// Operations sent.
    pub attempted: usize,
    pub delivered: usize,
    pub rejected: usize,
    /// Operations whose attempts were all exhausted.
    pub failed: usize,
    /// Operations dropped for exceeding the replay budget or being invalid.
    pub discarded: usize,
    /// Operations already in flight when the pass reached them.
    pub skipped: usize,
    /// The pass stopped early because the connection closed or was offline.
    pub interrupted: bool,
    /// Another pass was running; this one did nothing.
    pub already_running: bool,
    /// Operations still queued after the pass.
    pub remaining: usize,
}

/// Records outgoing operations in the cache, delivers them through the
/// tracker and replays whatever is left after a reconnect.
pub struct SyncCoordinator {
    cache: Arc<PersistentCache>,
    tracker: DeliveryTracker,
    transport: Arc<dyn Transport>,
    max_replay_attempts: u32,
    online: AtomicBool,
    /// Set while a replay pass runs. Dispatch defers to the pass so the
    /// server sees operations oldest first, one at a time.
    replaying: Mutex<bool>,
}

/// Clears the replaying flag on every exit from a pass that has not
/// already released it.
struct ReplayGuard<'a> {
    replaying: &'a Mutex<bool>,
    held: bool,
}

impl<'a> ReplayGuard<'a> {
    fn acquire(replaying: &'a Mutex<bool>) -> Option<Self> {
        let mut flag = replaying.lock();
        if *flag {
            return None;
        }
        *flag = true;
        Some(Self {
            replaying,
            held: true,
        })
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        if self.held {
            *self.replaying.lock() = false;
        }
    }
}

impl SyncCoordinator {
    /// Create a coordinator. It starts offline; call [`Self::reconnect`].
    pub fn new(
        cache: Arc<PersistentCache>,
        transport: Arc<dyn Transport>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            cache,
            tracker: DeliveryTracker::new(config.delivery.clone(), transport.clone()),
            transport,
            max_replay_attempts: config.max_replay_attempts,
            online: AtomicBool::new(false),
            replaying: Mutex::new(false),
        }
    }

    pub fn cache(&self) -> &Arc<PersistentCache> {
        &self.cache
    }

    pub fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Delivery lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.tracker.subscribe()
    }

    /// Queue an operation durably, then deliver it if online.
    ///
    /// The operation leaves the queue only once the server has acked or
    /// refused it. While a replay pass runs, the operation is left for the
    /// pass to send after the older ones.
    pub async fn dispatch(&self, operation: PendingOperation) -> SyncResult<DispatchOutcome> {
        operation
            .operation
            .validate()
            .map_err(|reason| SyncError::InvalidOperation {
                id: operation.id.clone(),
                reason,
            })?;

        self.cache.add_pending_operation(operation.clone())?;
        debug!(
            session_id = %operation.session_id,
            operation_id = %operation.id,
            operation_type = operation.operation.type_name(),
            "Operation queued"
        );

        if !self.is_online() {
            return Ok(DispatchOutcome::Queued);
        }
        // Checked after the enqueue: a running pass re-reads the queue
        // under this flag before it finishes, so it cannot miss the operation.
        if *self.replaying.lock() {
            debug!(operation_id = %operation.id, "Replay running, operation left to it");
            return Ok(DispatchOutcome::Queued);
        }

        let result = self
            .tracker
            .send(&operation.session_id, &operation.id, operation.wire_payload())
            .await;
        self.settle(&operation, result)
    }

    /// Drop the connection state: every in-flight delivery fails with
    /// connection closed, queued operations stay for the next replay.
    pub fn handle_disconnect(&self) {
        self.online.store(false, Ordering::SeqCst);
        let in_flight = self.tracker.pending_count();
        self.tracker.clear_all();
        info!(
            in_flight = in_flight,
            queued = self.cache.get_all_pending_operations().len(),
            "Disconnected"
        );
    }

    /// Connect the transport and replay the queue.
    pub async fn reconnect(&self) -> SyncResult<ReplaySummary> {
        self.transport.connect().await?;
        self.online.store(true, Ordering::SeqCst);
        info!("Connected, replaying pending operations");
        self.replay_pending().await
    }

    /// Deliver every queued operation, oldest first, one at a time.
    ///
    /// Operations queued while the pass runs are sent by the same pass.
    /// Only one pass runs at a time; a concurrent call returns immediately
    /// with `already_running` set.
    pub async fn replay_pending(&self) -> SyncResult<ReplaySummary> {
        let Some(mut guard) = ReplayGuard::acquire(&self.replaying) else {
            debug!("Replay already running");
            return Ok(ReplaySummary {
                already_running: true,
                ..Default::default()
            });
        };

        let mut summary = ReplaySummary::default();
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            if !self.is_online() {
                summary.interrupted = true;
                break;
            }

            let Some(operation) = self.next_unvisited(&visited) else {
                let mut replaying = self.replaying.lock();
                if self.next_unvisited(&visited).is_some() {
                    continue;
                }
                *replaying = false;
                guard.held = false;
                break;
            };
            visited.insert(operation.id.clone());

            if let Some(reason) = self.discard_reason(&operation) {
                warn!(
                    session_id = %operation.session_id,
                    operation_id = %operation.id,
                    retry_count = operation.retry_count,
                    age_secs = (Utc::now() - operation.created_at).num_seconds(),
                    reason = %reason,
                    "Discarding queued operation"
                );
                self.cache
                    .remove_pending_operation(&operation.session_id, &operation.id)?;
                summary.discarded += 1;
                continue;
            }

            if self.tracker.is_pending(&operation.id) {
                summary.skipped += 1;
                continue;
            }

            summary.attempted += 1;
            let result = self
                .tracker
                .send(&operation.session_id, &operation.id, operation.wire_payload())
                .await;

            match self.settle(&operation, result)? {
                DispatchOutcome::Delivered(_) => summary.delivered += 1,
                DispatchOutcome::Rejected(_) => summary.rejected += 1,
                DispatchOutcome::Failed { .. } => summary.failed += 1,
                DispatchOutcome::AlreadyInFlight => summary.skipped += 1,
                DispatchOutcome::Queued => {
                    summary.interrupted = true;
                    break;
                }
            }
        }

        summary.remaining = self.cache.get_all_pending_operations().len();
        info!(
            attempted = summary.attempted,
            delivered = summary.delivered,
            rejected = summary.rejected,
            failed = summary.failed,
            discarded = summary.discarded,
            skipped = summary.skipped,
            interrupted = summary.interrupted,
            remaining = summary.remaining,
            "Replay finished"
        );
        Ok(summary)
    }

    /// Oldest queued operation this pass has not handled yet.
    fn next_unvisited(&self, visited: &HashSet<String>) -> Option<PendingOperation> {
        self.cache
            .get_all_pending_operations()
            .into_iter()
            .find(|operation| !visited.contains(&operation.id))
    }

    fn discard_reason(&self, operation: &PendingOperation) -> Option<String> {
        if operation.retry_count >= self.max_replay_attempts {
            return Some(format!("failed {} replay rounds", operation.retry_count));
        }
        operation.operation.validate().err()
    }

    /// Apply a delivery result to the queue.
    fn settle(
        &self,
        operation: &PendingOperation,
        result: Result<AckResponse, DeliveryError>,
    ) -> SyncResult<DispatchOutcome> {
        let session_id = operation.session_id.as_str();
        let id = operation.id.as_str();

        match result {
            Ok(ack) => {
                // Delivered either way; a stale queue entry is acked as a
                // duplicate on the next replay.
                if let Err(e) = self.cache.remove_pending_operation(session_id, id) {
                    warn!(operation_id = %id, error = %e, "Failed to dequeue delivered operation");
                }
                Ok(DispatchOutcome::Delivered(ack))
            }
            Err(DeliveryError::Rejected { message, .. }) => {
                warn!(
                    session_id = %session_id,
                    operation_id = %id,
                    error = %message,
                    "Server rejected operation, dropping it"
                );
                self.cache.remove_pending_operation(session_id, id)?;
                Ok(DispatchOutcome::Rejected(message))
            }
            Err(DeliveryError::RetriesExhausted { attempts, .. }) => {
                let retry_count = self
                    .cache
                    .update_pending_retry_count(session_id, id)?
                    .unwrap_or(operation.retry_count);
                warn!(
                    operation_id = %id,
                    attempts = attempts,
                    retry_count = retry_count,
                    "Operation undelivered, kept for replay"
                );
                Ok(DispatchOutcome::Failed { retry_count })
            }
            Err(DeliveryError::ConnectionClosed)
            | Err(DeliveryError::Cancelled(_))
            | Err(DeliveryError::Abandoned(_)) => {
                debug!(operation_id = %id, "Delivery interrupted, kept for replay");
                Ok(DispatchOutcome::Queued)
            }
            Err(DeliveryError::DuplicateSubmission(_)) => Ok(DispatchOutcome::AlreadyInFlight),
            Err(e) => Err(e.into()),
        }
    }
}
