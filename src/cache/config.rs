//! Cache configuration.
//!
//! Controls the response cache via the `[cache]` section of `roamly.toml`.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_SWEEP_BATCH_SIZE: usize = 256;
const DEFAULT_FLIGHT_WAIT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Cache configuration from `roamly.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when off the facade behaves as if no cache existed.
    pub enabled: bool,
    /// TTL applied when a caller does not pass one.
    pub default_ttl_seconds: u64,
    /// Interval between background sweeps of expired entries.
    pub sweep_interval_seconds: u64,
    /// Maximum entries purged per sweep batch before yielding.
    pub sweep_batch_size: usize,
    /// How long a `get_or_set` waiter waits on another caller's compute.
    pub flight_wait_timeout_ms: u64,
    /// Largest response body the HTTP middleware will capture.
    pub max_body_bytes: usize,
    /// Pre-populate hot keys when the server starts.
    pub warm_on_startup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            flight_wait_timeout_ms: DEFAULT_FLIGHT_WAIT_TIMEOUT_MS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            warm_on_startup: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl_seconds: settings.default_ttl.as_secs(),
            sweep_interval_seconds: settings.sweep_interval.as_secs(),
            sweep_batch_size: settings.sweep_batch_size,
            flight_wait_timeout_ms: u64::try_from(settings.flight_wait_timeout.as_millis())
                .unwrap_or(u64::MAX),
            max_body_bytes: settings.max_body_bytes,
            warm_on_startup: settings.warm_on_startup,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Sweep interval, clamped to at least one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    /// Sweep batch size, clamped to at least one entry.
    pub fn sweep_batch_size(&self) -> usize {
        self.sweep_batch_size.max(1)
    }

    pub fn flight_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.flight_wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.sweep_batch_size(), 256);
        assert_eq!(config.flight_wait_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert!(config.warm_on_startup);
    }

    #[test]
    fn zero_sweep_settings_clamp_to_min() {
        let config = CacheConfig {
            sweep_interval_seconds: 0,
            sweep_batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.sweep_batch_size(), 1);
    }
}
