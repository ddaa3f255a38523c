//! LRU index: per-session recency and size, plus the aggregate size.

use crate::LruEntry;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Measured size of a serialized record, in bytes.
///
/// Two bytes per byte of serialized text.
pub fn measured_size(serialized: &str) -> u64 {
    2 * serialized.len() as u64
}

/// Persisted LRU state.
///
/// `total_size_bytes` is kept equal to the sum of every entry's
/// `size_bytes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LruIndex {
    entries: BTreeMap<String, LruEntry>,
    total_size_bytes: u64,
}

impl LruIndex {
    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    pub fn session_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, session_id: &str) -> Option<&LruEntry> {
        self.entries.get(session_id)
    }

    /// Sum of entry sizes. Equal to `total_size_bytes` unless the persisted
    /// index drifted.
    pub fn entry_size_sum(&self) -> u64 {
        self.entries.values().map(|entry| entry.size_bytes).sum()
    }

    /// Access time for a touch at `now`, strictly after every recorded one.
    ///
    /// Clock resolution and clock steps must never produce ties, or the
    /// eviction order would depend on map order.
    fn next_access_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.entries.values().map(|e| e.last_accessed_at).max() {
            Some(latest) if now <= latest => latest + Duration::microseconds(1),
            _ => now,
        }
    }

    /// Mark a session as most recently used, creating its entry if needed.
    pub fn touch(&mut self, session_id: &str, now: DateTime<Utc>) {
        let at = self.next_access_time(now);
        self.entries
            .entry(session_id.to_string())
            .and_modify(|entry| entry.last_accessed_at = at)
            .or_insert_with(|| LruEntry {
                session_id: session_id.to_string(),
                last_accessed_at: at,
                size_bytes: 0,
            });
    }

    /// Mark a session as most recently used only if it is already tracked.
    pub fn touch_existing(&mut self, session_id: &str, now: DateTime<Utc>) -> bool {
        if !self.entries.contains_key(session_id) {
            return false;
        }
        self.touch(session_id, now);
        true
    }

    /// Replace `old_size` bytes of a session's records with `new_size`.
    pub fn apply_delta(
        &mut self,
        session_id: &str,
        old_size: u64,
        new_size: u64,
        now: DateTime<Utc>,
    ) {
        if !self.entries.contains_key(session_id) {
            self.touch(session_id, now);
        }
        if let Some(entry) = self.entries.get_mut(session_id) {
            entry.size_bytes = entry.size_bytes.saturating_sub(old_size) + new_size;
        }
        self.total_size_bytes = self.total_size_bytes.saturating_sub(old_size) + new_size;
    }

    /// Drop a session's entry along with whatever size it still carries.
    pub fn remove(&mut self, session_id: &str) -> Option<LruEntry> {
        let removed = self.entries.remove(session_id)?;
        self.total_size_bytes = self.total_size_bytes.saturating_sub(removed.size_bytes);
        Some(removed)
    }

    /// Session ids, least recently used first.
    pub fn eviction_order(&self) -> Vec<String> {
        let mut entries: Vec<&LruEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        entries.into_iter().map(|e| e.session_id.clone()).collect()
    }

    /// Overwrite measured sizes, keeping recency where known.
    ///
    /// Sessions absent from `sizes` are dropped; new ones are appended as
    /// most recently used in session id order.
    pub fn reconcile(&mut self, sizes: &BTreeMap<String, u64>, now: DateTime<Utc>) {
        self.entries.retain(|session_id, _| sizes.contains_key(session_id));
        for (session_id, size) in sizes {
            if !self.entries.contains_key(session_id) {
                self.touch(session_id, now);
            }
            if let Some(entry) = self.entries.get_mut(session_id) {
                entry.size_bytes = *size;
            }
        }
        self.total_size_bytes = self.entry_size_sum();
    }
}
