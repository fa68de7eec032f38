//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECS: u64 = 60;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Runtime switches for the route cache and invalidation sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, cached routes pass through and the sweep does nothing.
    pub enabled: bool,
    /// TTL used by [`TriggerCache::wrap_default`](super::TriggerCache::wrap_default).
    pub default_ttl_secs: u64,
    /// Largest response body that will be captured and stored.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: DEFAULT_TTL_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl_secs: settings.default_ttl.as_secs(),
            max_body_bytes: settings.max_body_bytes.get(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_ttl(), Duration::from_secs(60));
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn partial_input_keeps_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"enabled": false}"#).expect("valid config");
        assert!(!config.enabled);
        assert_eq!(config.default_ttl_secs, 60);
    }
}
