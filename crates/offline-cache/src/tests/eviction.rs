//! LRU budget enforcement.

use super::harness::{assert_size_invariant, memory_cache, messages, pending_op, size_of};
use crate::{CacheConfig, KeyValueStore, MemoryStore, PersistentCache, RecordKind};
use std::sync::Arc;

/// Size of one single-message session record.
fn session_size() -> u64 {
    size_of(&messages("a", 1))
}

/// Budget of 3.5 sessions: a fourth session overflows it, and eviction
/// stops at 2.8 sessions (two remain).
fn three_and_a_half_sessions() -> (Arc<MemoryStore>, PersistentCache) {
    memory_cache(CacheConfig {
        max_total_cache_size_bytes: session_size() * 7 / 2,
        ..Default::default()
    })
}

fn cached_sessions(cache: &PersistentCache) -> Vec<String> {
    cache
        .lru_entries()
        .into_iter()
        .map(|entry| entry.session_id)
        .collect()
}

#[test]
fn no_eviction_at_or_below_the_maximum() {
    let (store, cache) = memory_cache(CacheConfig {
        max_total_cache_size_bytes: session_size() * 3,
        ..Default::default()
    });

    for session in ["a", "b", "c"] {
        cache.cache_messages(session, &messages(session, 1)).unwrap();
    }

    let stats = cache.get_cache_stats();
    assert_eq!(stats.total_size_bytes, session_size() * 3);
    assert_eq!(stats.session_count, 3);
    assert_eq!(stats.evicted_session_count, 0);
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn evicts_least_recently_used_until_under_target() {
    let (store, cache) = three_and_a_half_sessions();

    for session in ["a", "b", "c", "d"] {
        cache.cache_messages(session, &messages(session, 1)).unwrap();
    }

    assert_eq!(cached_sessions(&cache), vec!["c", "d"]);
    let stats = cache.get_cache_stats();
    assert_eq!(stats.total_size_bytes, session_size() * 2);
    assert!(stats.total_size_bytes <= cache.config().eviction_target_bytes());
    assert_eq!(stats.evicted_session_count, 2);
    assert_eq!(store.get(&RecordKind::Messages.key("a")).unwrap(), None);
    assert_eq!(store.get(&RecordKind::Messages.key("b")).unwrap(), None);
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn recently_read_sessions_survive_eviction() {
    let (store, cache) = three_and_a_half_sessions();

    for session in ["a", "b", "c"] {
        cache.cache_messages(session, &messages(session, 1)).unwrap();
    }
    assert_eq!(cache.get_cached_messages("a").len(), 1);

    cache.cache_messages("d", &messages("d", 1)).unwrap();

    assert_eq!(cached_sessions(&cache), vec!["a", "d"]);
    assert!(cache.get_cached_messages("b").is_empty());
    assert!(cache.get_cached_messages("c").is_empty());
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn eviction_drops_pending_operations_with_their_session() {
    let queued = vec![pending_op("op-1", "a", 0), pending_op("op-2", "a", 1)];
    let budget = size_of(&queued) + session_size() * 5 / 2;
    let (store, cache) = memory_cache(CacheConfig {
        max_total_cache_size_bytes: budget,
        ..Default::default()
    });

    // "a" is the oldest session and holds unsynced work.
    cache.add_pending_operation(pending_op("op-1", "a", 0)).unwrap();
    cache.add_pending_operation(pending_op("op-2", "a", 1)).unwrap();
    for session in ["b", "c"] {
        cache.cache_messages(session, &messages(session, 1)).unwrap();
    }
    assert_eq!(cache.get_cache_stats().evicted_session_count, 0);

    cache.cache_messages("d", &messages("d", 3)).unwrap();

    assert!(!cached_sessions(&cache).contains(&"a".to_string()));
    assert!(cache.get_pending_operations("a").is_empty());
    assert!(!cache.has_pending_sync());

    let stats = cache.get_cache_stats();
    assert!(stats.evicted_session_count >= 1);
    assert_eq!(stats.dropped_pending_operation_count, 2);
    assert_eq!(stats.pending_operation_count, 0);
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn oversized_single_session_is_evicted_as_well() {
    let (store, cache) = memory_cache(CacheConfig {
        max_total_cache_size_bytes: session_size(),
        ..Default::default()
    });

    cache.cache_messages("a", &messages("a", 1)).unwrap();
    cache.cache_messages("big", &messages("big", 10)).unwrap();

    let stats = cache.get_cache_stats();
    assert_eq!(stats.session_count, 0);
    assert_eq!(stats.total_size_bytes, 0);
    assert_eq!(stats.evicted_session_count, 2);
    assert!(store.get(&RecordKind::Messages.key("big")).unwrap().is_none());
    assert_size_invariant(store.as_ref(), &cache);
}

#[test]
fn pending_records_count_towards_the_budget() {
    let (store, cache) = three_and_a_half_sessions();

    cache.cache_messages("a", &messages("a", 1)).unwrap();
    cache.add_pending_operation(pending_op("op-1", "b", 0)).unwrap();

    let expected = session_size() + size_of(&vec![pending_op("op-1", "b", 0)]);
    assert_eq!(cache.get_cache_stats().total_size_bytes, expected);
    assert_size_invariant(store.as_ref(), &cache);
}
