//! Test harness: a transport that behaves like a deduplicating server.

use crate::{SyncConfig, SyncCoordinator};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use delivery_tracker::{Transport, TransportError};
use offline_cache::{
    CommandPayload, MemoryStore, OperationKind, PendingOperation, PersistentCache,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How the server answers requests.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Reply {
    /// Ack immediately
    Ack,
    /// Ack after a delay
    Delay(Duration),
    /// Refuse with a logical error
    Reject(String),
    /// Fail at the transport level
    Fail,
    /// Never answer
    Hang,
}

/// A request the server received.
#[derive(Debug, Clone)]
pub struct Received {
    pub local_id: String,
    pub session_id: String,
    pub payload: Value,
    pub at: Instant,
}

pub struct ServerTransport {
    reply: Mutex<Reply>,
    seen: Mutex<HashSet<String>>,
    received: Mutex<Vec<Received>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    connects: AtomicUsize,
}

impl ServerTransport {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            seen: Mutex::new(HashSet::new()),
            received: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock() = reply;
    }

    /// Pretend an id was already applied by the server.
    pub fn mark_seen(&self, local_id: &str) {
        self.seen.lock().insert(local_id.to_string());
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    pub fn received_ids(&self) -> Vec<String> {
        self.received().into_iter().map(|r| r.local_id).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn ack(&self, local_id: &str) -> Value {
        let duplicate = !self.seen.lock().insert(local_id.to_string());
        json!({
            "result": "ok",
            "localId": local_id,
            "messageId": format!("srv-{}", local_id),
            "duplicate": duplicate,
        })
    }
}

#[async_trait]
impl Transport for ServerTransport {
    async fn request(&self, _event: &str, payload: Value) -> Result<Value, TransportError> {
        let local_id = payload["localId"].as_str().unwrap_or_default().to_string();
        self.received.lock().push(Received {
            local_id: local_id.clone(),
            session_id: payload["sessionId"].as_str().unwrap_or_default().to_string(),
            payload: payload["payload"].clone(),
            at: Instant::now(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let reply = self.reply.lock().clone();
        let result = match reply {
            Reply::Ack => Ok(self.ack(&local_id)),
            Reply::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.ack(&local_id))
            }
            Reply::Reject(message) => Ok(json!({
                "result": "error",
                "localId": local_id,
                "error": message,
            })),
            Reply::Fail => Err(TransportError::NotConnected),
            Reply::Hang => std::future::pending().await,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap()
}

/// A command created `offset_secs` after the base time.
pub fn command(id: &str, session_id: &str, offset_secs: i64) -> PendingOperation {
    PendingOperation {
        id: id.to_string(),
        session_id: session_id.to_string(),
        operation: OperationKind::Command(CommandPayload {
            text: format!("run {}", id),
        }),
        created_at: base_time() + ChronoDuration::seconds(offset_secs),
        retry_count: 0,
    }
}

pub fn coordinator_with(
    transport: Arc<ServerTransport>,
    config: SyncConfig,
) -> Arc<SyncCoordinator> {
    let cache = PersistentCache::open(Arc::new(MemoryStore::new()), config.cache.clone()).unwrap();
    Arc::new(SyncCoordinator::new(Arc::new(cache), transport, &config))
}

pub fn coordinator(transport: Arc<ServerTransport>) -> Arc<SyncCoordinator> {
    coordinator_with(transport, SyncConfig::default())
}

/// Let spawned tasks run until they block.
pub async fn settle_tasks() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn queued_ids(coordinator: &SyncCoordinator) -> Vec<String> {
    coordinator
        .cache()
        .get_all_pending_operations()
        .into_iter()
        .map(|op| op.id)
        .collect()
}
