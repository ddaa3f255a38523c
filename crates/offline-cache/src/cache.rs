//! Size-bounded durable session cache.

use crate::index::{measured_size, LruIndex};
use crate::keys::{parse_key, RecordKind, LRU_INDEX_KEY};
use crate::store::KeyValueStore;
use crate::{
    CacheResult, CacheStats, CachedMessage, CachedSessionMetadata, LruEntry, PendingOperation,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache limits.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Most recent messages kept per session.
    pub max_messages_per_session: usize,
    /// Eviction starts once the aggregate size exceeds this.
    pub max_total_cache_size_bytes: u64,
    /// Eviction stops once the aggregate size is at or below this fraction
    /// of the maximum.
    pub eviction_target_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_messages_per_session: 100,
            max_total_cache_size_bytes: 100 * 1024 * 1024,
            eviction_target_ratio: 0.8,
        }
    }
}

impl CacheConfig {
    pub fn eviction_target_bytes(&self) -> u64 {
        (self.max_total_cache_size_bytes as f64 * self.eviction_target_ratio) as u64
    }
}

struct CacheState {
    index: LruIndex,
    evicted_sessions: u64,
    dropped_pending_operations: u64,
}

/// What clearing one session removed.
struct ClearedSession {
    freed_bytes: u64,
    pending_operations: usize,
}

/// Durable per-session cache of message history, pending operations and
/// metadata, bounded by an LRU size budget.
///
/// Every public method holds the cache lock for its whole duration, so
/// operations never interleave.
pub struct PersistentCache {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl PersistentCache {
    /// Open the cache over `store`, loading (or recovering) the LRU index.
    pub fn open(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> CacheResult<Self> {
        let cache = Self {
            store,
            config,
            state: Mutex::new(CacheState {
                index: LruIndex::default(),
                evicted_sessions: 0,
                dropped_pending_operations: 0,
            }),
        };

        let index = cache.recover_index()?;
        info!(
            sessions = index.session_count(),
            total_size_bytes = index.total_size_bytes(),
            "Opened offline cache"
        );
        cache.state.lock().index = index;
        Ok(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ==========================================================================
    // Messages
    // ==========================================================================

    /// Replace a session's history with the last `max_messages_per_session`
    /// of `messages`.
    pub fn cache_messages(&self, session_id: &str, messages: &[CachedMessage]) -> CacheResult<()> {
        let mut state = self.state.lock();
        self.store_messages(&mut state, session_id, messages)?;
        self.commit(&mut state, Some(session_id))
    }

    /// Append to a session's history, trimming to the limit.
    pub fn append_messages(&self, session_id: &str, messages: &[CachedMessage]) -> CacheResult<()> {
        let mut state = self.state.lock();
        let mut all: Vec<CachedMessage> = self
            .read_record(&RecordKind::Messages.key(session_id))
            .unwrap_or_default();
        all.extend_from_slice(messages);
        self.store_messages(&mut state, session_id, &all)?;
        self.commit(&mut state, Some(session_id))
    }

    /// A session's cached history, oldest first. Counts as an access.
    pub fn get_cached_messages(&self, session_id: &str) -> Vec<CachedMessage> {
        let mut state = self.state.lock();
        let messages = self
            .read_record(&RecordKind::Messages.key(session_id))
            .unwrap_or_default();
        self.touch_on_read(&mut state, session_id);
        messages
    }

    fn store_messages(
        &self,
        state: &mut CacheState,
        session_id: &str,
        messages: &[CachedMessage],
    ) -> CacheResult<()> {
        let start = messages
            .len()
            .saturating_sub(self.config.max_messages_per_session);
        let kept = &messages[start..];
        self.write_record(state, session_id, RecordKind::Messages, kept)?;
        debug!(
            session_id = %session_id,
            kept = kept.len(),
            trimmed = start,
            "Cached messages"
        );
        Ok(())
    }

    // ==========================================================================
    // Pending operations
    // ==========================================================================

    /// Queue an operation, replacing any queued operation with the same id.
    pub fn add_pending_operation(&self, operation: PendingOperation) -> CacheResult<()> {
        let mut state = self.state.lock();
        let session_id = operation.session_id.clone();
        let mut operations = self.read_pending(&session_id);

        match operations.iter_mut().find(|queued| queued.id == operation.id) {
            Some(queued) => *queued = operation,
            None => operations.push(operation),
        }

        self.write_record(&mut state, &session_id, RecordKind::Pending, &operations)?;
        self.commit(&mut state, Some(&session_id))
    }

    /// Drop a queued operation. Returns whether it was queued.
    pub fn remove_pending_operation(&self, session_id: &str, id: &str) -> CacheResult<bool> {
        let mut state = self.state.lock();
        let mut operations = self.read_pending(session_id);
        let before = operations.len();
        operations.retain(|queued| queued.id != id);
        if operations.len() == before {
            return Ok(false);
        }

        if operations.is_empty() {
            self.delete_record(&mut state, session_id, RecordKind::Pending)?;
        } else {
            self.write_record(&mut state, session_id, RecordKind::Pending, &operations)?;
        }
        self.commit(&mut state, None)?;
        Ok(true)
    }

    /// Queued operations of one session, in insertion order.
    pub fn get_pending_operations(&self, session_id: &str) -> Vec<PendingOperation> {
        let _state = self.state.lock();
        self.read_pending(session_id)
    }

    /// Queued operations of every session, oldest first.
    pub fn get_all_pending_operations(&self) -> Vec<PendingOperation> {
        let _state = self.state.lock();
        self.collect_pending()
    }

    /// Bump a queued operation's retry count. Returns the new count, or
    /// `None` if the operation is not queued.
    pub fn update_pending_retry_count(&self, session_id: &str, id: &str) -> CacheResult<Option<u32>> {
        let mut state = self.state.lock();
        let mut operations = self.read_pending(session_id);
        let Some(queued) = operations.iter_mut().find(|queued| queued.id == id) else {
            return Ok(None);
        };
        queued.retry_count += 1;
        let retry_count = queued.retry_count;

        self.write_record(&mut state, session_id, RecordKind::Pending, &operations)?;
        self.commit(&mut state, None)?;
        Ok(Some(retry_count))
    }

    pub fn has_pending_sync(&self) -> bool {
        let _state = self.state.lock();
        !self.collect_pending().is_empty()
    }

    fn read_pending(&self, session_id: &str) -> Vec<PendingOperation> {
        self.read_record(&RecordKind::Pending.key(session_id))
            .unwrap_or_default()
    }

    fn collect_pending(&self) -> Vec<PendingOperation> {
        let keys = match self.store.keys_with_prefix(RecordKind::Pending.prefix()) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list pending operation keys");
                return Vec::new();
            }
        };

        let mut operations: Vec<PendingOperation> = keys
            .iter()
            .filter_map(|key| self.read_record::<Vec<PendingOperation>>(key))
            .flatten()
            .collect();
        operations.sort_by_key(|operation| operation.created_at);
        operations
    }

    // ==========================================================================
    // Metadata
    // ==========================================================================

    /// Overwrite a session's metadata snapshot.
    pub fn cache_session_metadata(&self, metadata: &CachedSessionMetadata) -> CacheResult<()> {
        let mut state = self.state.lock();
        let session_id = metadata.session_id.as_str();
        self.write_record(&mut state, session_id, RecordKind::Metadata, metadata)?;
        self.commit(&mut state, Some(session_id))
    }

    /// A session's metadata snapshot. Counts as an access.
    pub fn get_cached_session_metadata(&self, session_id: &str) -> Option<CachedSessionMetadata> {
        let mut state = self.state.lock();
        let metadata = self.read_record(&RecordKind::Metadata.key(session_id));
        self.touch_on_read(&mut state, session_id);
        metadata
    }

    // ==========================================================================
    // Clearing and stats
    // ==========================================================================

    /// Remove every record of a session.
    pub fn clear_session_cache(&self, session_id: &str) -> CacheResult<()> {
        let mut state = self.state.lock();
        let cleared = self.clear_session_locked(&mut state, session_id)?;
        self.persist_index(&state)?;
        info!(
            session_id = %session_id,
            freed_bytes = cleared.freed_bytes,
            pending_operations = cleared.pending_operations,
            "Cleared session cache"
        );
        Ok(())
    }

    /// Remove everything in the cache namespace.
    pub fn clear_all_cache(&self) -> CacheResult<()> {
        let mut state = self.state.lock();
        let removed = self.store.clear()?;
        state.index = LruIndex::default();
        info!(removed_keys = removed, "Cleared all cache");
        Ok(())
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            total_size_bytes: state.index.total_size_bytes(),
            session_count: state.index.session_count(),
            pending_operation_count: self.collect_pending().len(),
            evicted_session_count: state.evicted_sessions,
            dropped_pending_operation_count: state.dropped_pending_operations,
        }
    }

    /// LRU entries, least recently used first.
    pub fn lru_entries(&self) -> Vec<LruEntry> {
        let state = self.state.lock();
        state
            .index
            .eviction_order()
            .iter()
            .filter_map(|session_id| state.index.get(session_id).cloned())
            .collect()
    }

    // ==========================================================================
    // Internals (callers hold the state lock)
    // ==========================================================================

    fn read_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt cache record, treating as absent");
                None
            }
        }
    }

    fn stored_size(&self, key: &str) -> CacheResult<u64> {
        Ok(self
            .store
            .get(key)?
            .map(|raw| measured_size(&raw))
            .unwrap_or(0))
    }

    fn write_record<T: Serialize + ?Sized>(
        &self,
        state: &mut CacheState,
        session_id: &str,
        kind: RecordKind,
        value: &T,
    ) -> CacheResult<()> {
        let key = kind.key(session_id);
        let old_size = self.stored_size(&key)?;
        let raw = serde_json::to_string(value)?;
        self.store.set(&key, &raw)?;
        state
            .index
            .apply_delta(session_id, old_size, measured_size(&raw), Utc::now());
        Ok(())
    }

    fn delete_record(
        &self,
        state: &mut CacheState,
        session_id: &str,
        kind: RecordKind,
    ) -> CacheResult<()> {
        let key = kind.key(session_id);
        let old_size = self.stored_size(&key)?;
        self.store.delete(&key)?;
        state.index.apply_delta(session_id, old_size, 0, Utc::now());
        if !self.has_records(session_id)? {
            state.index.remove(session_id);
        }
        Ok(())
    }

    fn has_records(&self, session_id: &str) -> CacheResult<bool> {
        for kind in RecordKind::ALL {
            if self.store.get(&kind.key(session_id))?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Finish a mutating write: touch, evict if over budget, persist the index.
    fn commit(&self, state: &mut CacheState, touched: Option<&str>) -> CacheResult<()> {
        if let Some(session_id) = touched {
            state.index.touch(session_id, Utc::now());
        }
        self.evict_if_needed(state)?;
        self.persist_index(state)
    }

    fn touch_on_read(&self, state: &mut CacheState, session_id: &str) {
        if state.index.touch_existing(session_id, Utc::now()) {
            if let Err(e) = self.persist_index(state) {
                warn!(session_id = %session_id, error = %e, "Failed to persist LRU index");
            }
        }
    }

    fn persist_index(&self, state: &CacheState) -> CacheResult<()> {
        let raw = serde_json::to_string(&state.index)?;
        self.store.set(LRU_INDEX_KEY, &raw)
    }

    fn evict_if_needed(&self, state: &mut CacheState) -> CacheResult<()> {
        let before = state.index.total_size_bytes();
        if before <= self.config.max_total_cache_size_bytes {
            return Ok(());
        }

        let target = self.config.eviction_target_bytes();
        let mut evicted = 0;
        for session_id in state.index.eviction_order() {
            if state.index.total_size_bytes() <= target {
                break;
            }

            let cleared = self.clear_session_locked(state, &session_id)?;
            state.evicted_sessions += 1;
            evicted += 1;

            if cleared.pending_operations > 0 {
                state.dropped_pending_operations += cleared.pending_operations as u64;
                warn!(
                    session_id = %session_id,
                    pending_operations = cleared.pending_operations,
                    freed_bytes = cleared.freed_bytes,
                    "Evicted session with unsynced pending operations"
                );
            } else {
                debug!(
                    session_id = %session_id,
                    freed_bytes = cleared.freed_bytes,
                    "Evicted session"
                );
            }
        }

        info!(
            evicted_sessions = evicted,
            before_bytes = before,
            after_bytes = state.index.total_size_bytes(),
            target_bytes = target,
            "Cache eviction complete"
        );
        Ok(())
    }

    fn clear_session_locked(
        &self,
        state: &mut CacheState,
        session_id: &str,
    ) -> CacheResult<ClearedSession> {
        let mut cleared = ClearedSession {
            freed_bytes: 0,
            pending_operations: 0,
        };

        for kind in RecordKind::ALL {
            let key = kind.key(session_id);
            let Some(raw) = self.store.get(&key)? else {
                continue;
            };
            let size = measured_size(&raw);
            self.store.delete(&key)?;
            // Accounted per record so a failed delete leaves the index exact.
            state.index.apply_delta(session_id, size, 0, Utc::now());
            cleared.freed_bytes += size;
            if kind == RecordKind::Pending {
                cleared.pending_operations = serde_json::from_str::<Vec<PendingOperation>>(&raw)
                    .map(|operations| operations.len())
                    .unwrap_or(0);
            }
        }

        state.index.remove(session_id);
        Ok(cleared)
    }

    /// Load the persisted index and reconcile it with the stored records.
    ///
    /// A missing or unreadable index is rebuilt from scratch; recovered
    /// sessions start out most recently used.
    fn recover_index(&self) -> CacheResult<LruIndex> {
        let persisted = match self.store.get(LRU_INDEX_KEY)? {
            Some(raw) => match serde_json::from_str::<LruIndex>(&raw) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!(error = %e, "Corrupt LRU index, rebuilding");
                    None
                }
            },
            None => None,
        };

        let mut sizes: BTreeMap<String, u64> = BTreeMap::new();
        for key in self.store.keys()? {
            let Some((_, session_id)) = parse_key(&key) else {
                continue;
            };
            let size = self.stored_size(&key)?;
            *sizes.entry(session_id.to_string()).or_default() += size;
        }

        let loaded = persisted.unwrap_or_default();
        let mut index = loaded.clone();
        index.reconcile(&sizes, Utc::now());

        if index != loaded {
            info!(
                sessions = index.session_count(),
                total_size_bytes = index.total_size_bytes(),
                previous_total_bytes = loaded.total_size_bytes(),
                "Reconciled LRU index with stored records"
            );
            let raw = serde_json::to_string(&index)?;
            self.store.set(LRU_INDEX_KEY, &raw)?;
        }
        Ok(index)
    }
}
