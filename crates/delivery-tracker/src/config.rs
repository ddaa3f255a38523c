//! Tracker configuration.

use std::time::Duration;

/// Delivery tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Time to wait for an ack per attempt.
    pub ack_timeout: Duration,
    /// Attempts per message before it fails.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Event name passed to the transport.
    pub request_event: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(5000),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            request_event: "message".to_string(),
        }
    }
}

impl DeliveryConfig {
    /// Backoff before the attempt that follows failure number `retry_count`:
    /// `base * 2^(retry_count - 1)`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DeliveryConfig::default();
        assert_eq!(config.ack_timeout, Duration::from_millis(5000));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert_eq!(config.request_event, "message");
    }

    #[test]
    fn test_backoff_doubles() {
        let config = DeliveryConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_saturates() {
        let config = DeliveryConfig::default();
        assert_eq!(config.backoff_delay(0), Duration::from_secs(1));
        assert!(config.backoff_delay(200) >= Duration::from_secs(1 << 30));
    }
}
