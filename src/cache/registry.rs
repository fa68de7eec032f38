//! Trigger registry.
//!
//! Tracks, per wrapped route, the triggers it declared and every request path
//! the route has served, so a matching request can find the cached entries
//! it makes stale.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::keys::{HandlerId, StaleEntry, invalidation_targets};
use super::lock::mutex_lock;
use super::trigger::{RequestInfo, SharedTrigger};

const SOURCE: &str = "cache::registry";

/// One trigger declared by a route, plus the paths that route has served.
pub struct TriggerBinding {
    trigger: SharedTrigger,
    urls: HashSet<String>,
}

impl TriggerBinding {
    fn new(trigger: SharedTrigger) -> Self {
        Self {
            trigger,
            urls: HashSet::new(),
        }
    }
}

/// Maps each handler to its trigger bindings.
///
/// A single mutex serializes registration, path recording and sweep scans.
/// It is never held across store I/O. Recorded paths are not pruned when
/// entries are invalidated, so the path sets grow with the number of
/// distinct paths a route serves.
pub struct TriggerRegistry {
    bindings: Mutex<HashMap<HandlerId, Vec<TriggerBinding>>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Register the handler's triggers unless already present.
    ///
    /// Returns true when this call created the entry.
    pub fn ensure_registered(&self, handler: HandlerId, triggers: &[SharedTrigger]) -> bool {
        let mut bindings = mutex_lock(&self.bindings, SOURCE, "ensure_registered");
        if bindings.contains_key(&handler) {
            return false;
        }

        let entries = triggers
            .iter()
            .map(|trigger| TriggerBinding::new(Arc::clone(trigger)))
            .collect();
        bindings.insert(handler, entries);
        true
    }

    /// Record a served path on every binding of the handler.
    pub fn record_url(&self, handler: HandlerId, path: &str) {
        let mut bindings = mutex_lock(&self.bindings, SOURCE, "record_url");
        let Some(entries) = bindings.get_mut(&handler) else {
            return;
        };

        for binding in entries {
            if !binding.urls.contains(path) {
                binding.urls.insert(path.to_string());
            }
        }
    }

    /// Store entries made stale by `request`.
    ///
    /// Scans every binding under the lock and returns the deduplicated
    /// deletions, leaving the caller to dispatch them once the lock is free.
    pub fn matching_keys(&self, request: RequestInfo<'_>) -> Vec<StaleEntry> {
        let bindings = mutex_lock(&self.bindings, SOURCE, "matching_keys");

        let mut stale = BTreeSet::new();
        for (handler, entries) in bindings.iter() {
            for binding in entries {
                if !binding.trigger.matches(request) {
                    continue;
                }
                for path in &binding.urls {
                    stale.extend(invalidation_targets(*handler, path));
                }
            }
        }

        stale.into_iter().collect()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        mutex_lock(&self.bindings, SOURCE, "handler_count").len()
    }

    /// Number of trigger bindings registered for a handler.
    pub fn binding_count(&self, handler: HandlerId) -> usize {
        mutex_lock(&self.bindings, SOURCE, "binding_count")
            .get(&handler)
            .map_or(0, Vec::len)
    }

    /// Distinct paths recorded for a handler, sorted.
    pub fn urls_for(&self, handler: HandlerId) -> Vec<String> {
        let bindings = mutex_lock(&self.bindings, SOURCE, "urls_for");
        bindings
            .get(&handler)
            .into_iter()
            .flatten()
            .flat_map(|binding| binding.urls.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Total recorded paths across all bindings.
    pub fn url_count(&self) -> usize {
        mutex_lock(&self.bindings, SOURCE, "url_count")
            .values()
            .flatten()
            .map(|binding| binding.urls.len())
            .sum()
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
