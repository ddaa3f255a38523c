//! Restarts, index recovery and failed writes.

use super::harness::{
    assert_size_invariant, messages, metadata, pending_op, size_of, FlakyStore,
};
use crate::{
    CacheConfig, CacheError, KeyValueStore, PersistentCache, RecordKind, SqliteStore,
    LRU_INDEX_KEY,
};
use std::sync::Arc;
use tempfile::TempDir;

fn open_sqlite(temp: &TempDir) -> (Arc<SqliteStore>, PersistentCache) {
    let path = temp.path().join("cache.sqlite");
    let store = Arc::new(SqliteStore::open(path, "offline-cache").unwrap());
    let cache = PersistentCache::open(store.clone(), CacheConfig::default()).unwrap();
    (store, cache)
}

#[test]
fn everything_survives_a_restart() {
    let temp = TempDir::new().unwrap();
    let (total, order) = {
        let (_store, cache) = open_sqlite(&temp);
        cache.cache_messages("s1", &messages("s1", 3)).unwrap();
        cache.add_pending_operation(pending_op("op-1", "s2", 0)).unwrap();
        cache.cache_session_metadata(&metadata("s3", "plan")).unwrap();
        cache.get_cached_messages("s1");
        (cache.get_cache_stats().total_size_bytes, cache.lru_entries())
    };

    let (store, cache) = open_sqlite(&temp);
    // Recency reloads exactly as persisted.
    assert_eq!(cache.lru_entries(), order);
    let sessions: Vec<String> = order.into_iter().map(|e| e.session_id).collect();
    assert_eq!(sessions, vec!["s2", "s3", "s1"]);

    assert_eq!(cache.get_cached_messages("s1"), messages("s1", 3));
    assert_eq!(cache.get_pending_operations("s2"), vec![pending_op("op-1", "s2", 0)]);
    assert!(cache.has_pending_sync());
    assert_eq!(
        cache.get_cached_session_metadata("s3"),
        Some(metadata("s3", "plan"))
    );

    let stats = cache.get_cache_stats();
    assert_eq!(stats.total_size_bytes, total);
    assert_eq!(stats.session_count, 3);
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn missing_index_is_rebuilt_from_records() {
    let temp = TempDir::new().unwrap();
    {
        let (store, cache) = open_sqlite(&temp);
        cache.cache_messages("s1", &messages("s1", 2)).unwrap();
        cache.add_pending_operation(pending_op("op-1", "s2", 0)).unwrap();
        store.delete(LRU_INDEX_KEY).unwrap();
    }

    let (store, cache) = open_sqlite(&temp);
    let stats = cache.get_cache_stats();
    assert_eq!(stats.session_count, 2);
    assert_eq!(
        stats.total_size_bytes,
        size_of(&messages("s1", 2)) + size_of(&vec![pending_op("op-1", "s2", 0)])
    );
    assert!(store.get(LRU_INDEX_KEY).unwrap().is_some());
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn corrupt_index_is_rebuilt() {
    let temp = TempDir::new().unwrap();
    {
        let (store, cache) = open_sqlite(&temp);
        cache.cache_messages("s1", &messages("s1", 2)).unwrap();
        store.set(LRU_INDEX_KEY, "{\"entries\": 12").unwrap();
    }

    let (store, cache) = open_sqlite(&temp);
    assert_eq!(cache.get_cache_stats().session_count, 1);
    assert_eq!(
        cache.get_cache_stats().total_size_bytes,
        size_of(&messages("s1", 2))
    );
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn record_written_without_index_update_is_counted_on_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let (store, cache) = open_sqlite(&temp);
        cache.cache_messages("s1", &messages("s1", 2)).unwrap();
        // A crash after the record write, before the index write.
        let raw = serde_json::to_string(&messages("s2", 4)).unwrap();
        store.set(&RecordKind::Messages.key("s2"), &raw).unwrap();
    }

    let (store, cache) = open_sqlite(&temp);
    let sessions: Vec<String> = cache.lru_entries().into_iter().map(|e| e.session_id).collect();
    assert_eq!(sessions, vec!["s1", "s2"]);
    assert_eq!(
        cache.get_cache_stats().total_size_bytes,
        size_of(&messages("s1", 2)) + size_of(&messages("s2", 4))
    );
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn failed_write_leaves_accounting_unchanged() {
    let store = FlakyStore::new();
    let cache = PersistentCache::open(store.clone(), CacheConfig::default()).unwrap();
    cache.cache_messages("s1", &messages("s1", 1)).unwrap();
    let before = cache.get_cache_stats();

    store.fail_writes(true);
    let err = cache.cache_messages("s1", &messages("s1", 20)).unwrap_err();
    assert!(matches!(err, CacheError::Store(_)));
    assert!(cache.add_pending_operation(pending_op("op-1", "s2", 0)).is_err());

    assert_eq!(cache.get_cache_stats(), before);
    assert_eq!(cache.get_cached_messages("s1"), messages("s1", 1));

    store.fail_writes(false);
    cache.cache_messages("s1", &messages("s1", 20)).unwrap();
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn emptied_session_reports_the_same_stats_after_a_restart() {
    let temp = TempDir::new().unwrap();
    let before = {
        let (_store, cache) = open_sqlite(&temp);
        cache.cache_messages("s2", &messages("s2", 2)).unwrap();
        cache.add_pending_operation(pending_op("op-1", "s1", 0)).unwrap();
        assert!(cache.remove_pending_operation("s1", "op-1").unwrap());
        cache.get_cache_stats()
    };
    assert_eq!(before.session_count, 1);

    let (store, cache) = open_sqlite(&temp);
    assert_eq!(cache.get_cache_stats(), before);
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn failed_delete_during_clear_keeps_accounting_exact() {
    let store = FlakyStore::new();
    let cache = PersistentCache::open(store.clone(), CacheConfig::default()).unwrap();
    cache.cache_messages("s1", &messages("s1", 3)).unwrap();
    cache.add_pending_operation(pending_op("op-1", "s1", 0)).unwrap();
    cache.cache_session_metadata(&metadata("s1", "plan")).unwrap();
    cache.cache_messages("s2", &messages("s2", 1)).unwrap();

    store.fail_deletes_after(1);
    let err = cache.clear_session_cache("s1").unwrap_err();
    assert!(matches!(err, CacheError::Store(_)));
    // One record went, the rest stay counted.
    assert_size_invariant(store.as_ref(), &cache);
    assert_eq!(cache.get_cache_stats().session_count, 2);

    store.allow_deletes();
    cache.clear_session_cache("s1").unwrap();
    assert_eq!(cache.get_cache_stats().session_count, 1);
    assert_eq!(
        cache.get_cache_stats().total_size_bytes,
        size_of(&messages("s2", 1))
    );
    assert_size_invariant(store.as_ref(), &cache);
}
