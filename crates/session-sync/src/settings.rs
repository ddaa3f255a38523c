//! Runtime configuration assembled from the client config file.

use client_core::ClientConfig;
use delivery_tracker::DeliveryConfig;
use offline_cache::CacheConfig;
use std::time::Duration;

/// Everything needed to build a cache and a coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub delivery: DeliveryConfig,
    pub cache: CacheConfig,
    /// Store namespace of the cache.
    pub namespace: String,
    /// Failed replay rounds after which a queued operation is discarded.
    pub max_replay_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_client_config(&ClientConfig::default())
    }
}

impl SyncConfig {
    pub fn from_client_config(config: &ClientConfig) -> Self {
        let delivery = &config.delivery;
        let cache = &config.cache;
        Self {
            delivery: DeliveryConfig {
                ack_timeout: Duration::from_millis(delivery.ack_timeout_ms),
                max_retries: delivery.max_retries.max(1),
                backoff_base: Duration::from_millis(delivery.backoff_base_ms),
                request_event: delivery.request_event.clone(),
            },
            cache: CacheConfig {
                max_messages_per_session: cache.max_messages_per_session,
                max_total_cache_size_bytes: cache.max_total_cache_size_bytes,
                eviction_target_ratio: cache.eviction_target_ratio.clamp(0.0, 1.0),
            },
            namespace: cache.namespace.clone(),
            max_replay_attempts: config.sync.max_replay_attempts,
        }
    }
}
