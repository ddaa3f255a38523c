//! Configuration management for the client.

use crate::{CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Delivery tunables (ack timeout, retry budget, backoff).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// How long to wait for an ack before an attempt counts as failed.
    pub ack_timeout_ms: u64,
    /// Attempts per message before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub backoff_base_ms: u64,
    /// Transport event name used for outbound messages.
    pub request_event: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            max_retries: 3,
            backoff_base_ms: 1000,
            request_event: "message".to_string(),
        }
    }
}

/// Offline cache tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Storage namespace isolating cache keys from other application data.
    pub namespace: String,
    /// Most recent messages retained per session.
    pub max_messages_per_session: usize,
    /// Hard ceiling on the aggregate size of all cached records.
    pub max_total_cache_size_bytes: u64,
    /// Fraction of the ceiling eviction shrinks the cache down to.
    pub eviction_target_ratio: f64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: "offline-cache".to_string(),
            max_messages_per_session: 100,
            max_total_cache_size_bytes: 100 * 1024 * 1024,
            eviction_target_ratio: 0.8,
        }
    }
}

/// Reconnect replay tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Replay rounds an operation may fail before it is discarded.
    pub max_replay_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_replay_attempts: 10,
        }
    }
}

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            delivery: DeliverySettings::default(),
            cache: CacheSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file if it exists, falling back
    /// to defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup. Unparseable values are ignored.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("OFFLINE_SYNC_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(ms) = lookup("OFFLINE_SYNC_ACK_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.delivery.ack_timeout_ms = ms;
        }
        if let Some(n) = lookup("OFFLINE_SYNC_MAX_RETRIES").and_then(|s| s.parse().ok()) {
            self.delivery.max_retries = n;
        }
        if let Some(bytes) = lookup("OFFLINE_SYNC_CACHE_MAX_BYTES").and_then(|s| s.parse().ok()) {
            self.cache.max_total_cache_size_bytes = bytes;
        }
    }
}
