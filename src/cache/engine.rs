use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, error};
use triggercache_store::{CacheStore, CachedContent, MemoryStore, StoreError};

use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::{HandlerId, StaleEntry};
use super::registry::TriggerRegistry;
use super::trigger::{RequestInfo, SharedTrigger};

pub(crate) const METRIC_HIT: &str = "triggercache_hit_total";
pub(crate) const METRIC_MISS: &str = "triggercache_miss_total";
pub(crate) const METRIC_LOOKUP_ERROR: &str = "triggercache_lookup_error_total";
pub(crate) const METRIC_PERSIST_ERROR: &str = "triggercache_persist_error_total";
pub(crate) const METRIC_INVALIDATE: &str = "triggercache_invalidate_total";
pub(crate) const METRIC_DELETE_ERROR: &str = "triggercache_delete_error_total";

/// One logical cache: a store handle plus the trigger registry shared by
/// every wrapped route and the invalidation sweep.
#[derive(Clone)]
pub struct TriggerCache {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    registry: Arc<TriggerRegistry>,
}

impl TriggerCache {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            config,
            store,
            registry: Arc::new(TriggerRegistry::new()),
        }
    }

    /// Cache backed by a fresh [`MemoryStore`].
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Prepare caching for one route.
    ///
    /// Call once per route when building the router; each call mints a new
    /// [`HandlerId`], so every wrapped route gets its own key namespace.
    pub fn wrap(&self, ttl: Duration, triggers: Vec<SharedTrigger>) -> RouteCache {
        let handler_id = HandlerId::new();
        debug!(
            handler_id = %handler_id,
            triggers = triggers.len(),
            ttl_secs = ttl.as_secs(),
            "wrapping route with response cache"
        );

        RouteCache {
            cache: self.clone(),
            handler_id,
            ttl,
            triggers: Arc::from(triggers),
        }
    }

    /// [`TriggerCache::wrap`] with the configured default TTL.
    pub fn wrap_default(&self, triggers: Vec<SharedTrigger>) -> RouteCache {
        self.wrap(self.config.default_ttl(), triggers)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<TriggerRegistry> {
        &self.registry
    }

    /// Delete every cached entry made stale by `request`.
    ///
    /// Deletions run as detached tasks; the return value is the number of
    /// keys and patterns dispatched.
    pub fn sweep(&self, request: RequestInfo<'_>) -> usize {
        if !self.config.enabled {
            return 0;
        }

        let stale = self.registry.matching_keys(request);
        if stale.is_empty() {
            return 0;
        }

        debug!(
            method = %request.method,
            uri = %request.uri,
            keys = stale.len(),
            "request matched cache triggers"
        );
        counter!(METRIC_INVALIDATE).increment(stale.len() as u64);

        let dispatched = stale.len();
        for entry in stale {
            self.spawn_delete(entry);
        }
        dispatched
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.store.close().await
    }

    pub(crate) fn spawn_persist(&self, key: String, content: CachedContent, ttl: Duration) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.set(&key, &content, ttl).await {
                Ok(()) => debug!(key = %key, status = content.status(), "cached response stored"),
                Err(source) => {
                    counter!(METRIC_PERSIST_ERROR).increment(1);
                    let err = CacheError::Persist { key, source };
                    error!(error = %err, "failed to persist cached response");
                }
            }
        });
    }

    fn spawn_delete(&self, entry: StaleEntry) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let result = match &entry {
                StaleEntry::Key(key) => store.delete_key(key).await,
                StaleEntry::Pattern(pattern) => store.delete(pattern).await,
            };
            if let Err(source) = result {
                counter!(METRIC_DELETE_ERROR).increment(1);
                let err = CacheError::Delete {
                    entry: entry.to_string(),
                    source,
                };
                error!(error = %err, "failed to invalidate cached response");
            }
        });
    }
}

/// Per-route cache state produced by [`TriggerCache::wrap`].
///
/// Install it with `axum::middleware::from_fn_with_state(route, cache_route)`.
#[derive(Clone)]
pub struct RouteCache {
    pub(crate) cache: TriggerCache,
    pub(crate) handler_id: HandlerId,
    pub(crate) ttl: Duration,
    pub(crate) triggers: Arc<[SharedTrigger]>,
}

impl RouteCache {
    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cache(&self) -> &TriggerCache {
        &self.cache
    }
}
