//! Connector Configuration
//!
//! Per-connector tuning knobs. Backend connection details live in
//! [`crate::store::StoreConfig`].

use std::time::Duration;

/// Default request timeout (milliseconds).
pub const DEFAULT_REQ_TIMEOUT_MS: u64 = 5_000;

/// Default idle sleep of the worker loop (milliseconds).
pub const DEFAULT_IDLE_SLEEP_MS: u64 = 1;

/// Tuning for one [`crate::connector::AsyncConnector`].
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Age after which a pending request is evicted without a callback.
    pub req_timeout: Duration,
    /// Worker sleep once spinning found nothing to do.
    pub idle_sleep: Duration,
    /// Idle iterations spent yielding before the worker starts sleeping.
    pub spin_rounds: u32,
    /// Maximum queue items alive at once (0 = unbounded).
    pub max_outstanding: usize,
    /// Released items kept for reuse.
    pub free_list_cap: usize,
    /// Worker thread name prefix.
    pub worker_name: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            req_timeout: Duration::from_millis(DEFAULT_REQ_TIMEOUT_MS),
            idle_sleep: Duration::from_millis(DEFAULT_IDLE_SLEEP_MS),
            spin_rounds: 64,
            max_outstanding: 65_536,
            free_list_cap: 256,
            worker_name: "store-worker".to_string(),
        }
    }
}

impl ConnectorConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            req_timeout: env_u64("CONNECTOR_REQ_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.req_timeout),
            idle_sleep: env_u64("CONNECTOR_IDLE_SLEEP_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.idle_sleep),
            max_outstanding: env_u64("CONNECTOR_MAX_OUTSTANDING")
                .map(|v| v as usize)
                .unwrap_or(defaults.max_outstanding),
            ..defaults
        }
    }

    /// Set the request timeout in milliseconds.
    pub fn with_req_timeout_ms(mut self, ms: u64) -> Self {
        self.req_timeout = Duration::from_millis(ms);
        self
    }
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::default();
        assert_eq!(config.req_timeout, Duration::from_millis(DEFAULT_REQ_TIMEOUT_MS));
        assert_eq!(config.idle_sleep, Duration::from_millis(1));
        assert!(config.max_outstanding > 0);
    }

    #[test]
    fn test_builder() {
        let config = ConnectorConfig::default().with_req_timeout_ms(100);
        assert_eq!(config.req_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_from_env_ignores_garbage() {
        std::env::set_var("CONNECTOR_IDLE_SLEEP_MS", "not-a-number");
        let config = ConnectorConfig::from_env();
        assert_eq!(config.idle_sleep, Duration::from_millis(DEFAULT_IDLE_SLEEP_MS));
        std::env::remove_var("CONNECTOR_IDLE_SLEEP_MS");
    }
}
