use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::{CacheStore, CachedContent, KeyPattern, StoreError};

struct Entry {
    blob: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// In-process [`CacheStore`] backed by a concurrent map.
///
/// Entries are held as serialized blobs, the same shape a networked backend
/// would receive. Expired entries read as absent and are dropped lazily or by
/// [`MemoryStore::purge_expired`].
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CachedContent>, StoreError> {
        self.ensure_open()?;

        let now = Instant::now();
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (entry.is_live(now), entry.blob.clone()));

        match lookup {
            Some((true, blob)) => CachedContent::from_blob(&blob).map(Some),
            Some((false, _)) => {
                self.entries.remove_if(key, |_, entry| !entry.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        content: &CachedContent,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;

        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        let blob = content.to_blob()?;
        self.entries
            .insert(key.to_string(), Entry { blob, expires_at });
        Ok(())
    }

    async fn delete(&self, pattern: &str) -> Result<(), StoreError> {
        self.ensure_open()?;

        match KeyPattern::parse(pattern) {
            KeyPattern::Exact(key) => {
                self.entries.remove(key);
            }
            prefix @ KeyPattern::Prefix(_) => {
                let before = self.entries.len();
                self.entries.retain(|key, _| !prefix.matches(key));
                debug!(
                    pattern,
                    removed = before.saturating_sub(self.entries.len()),
                    "deleted keys by prefix"
                );
            }
        }
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        self.entries.clear();
        Ok(())
    }
}
