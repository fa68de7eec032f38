//! Storage contract for the triggercache response cache.
//!
//! A [`CacheStore`] keeps serialized [`CachedContent`] envelopes under string
//! keys with a per-entry expiry. Deletion accepts either an exact key or a
//! prefix pattern ending in [`WILDCARD`], which removes every key sharing the
//! literal prefix.
//!
//! [`MemoryStore`] is the in-process backend used by default and in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod content;
mod memory;

pub use content::CachedContent;
pub use memory::MemoryStore;

/// Trailing wildcard accepted by [`CacheStore::delete`].
pub const WILDCARD: char = '*';

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is closed")]
    Closed,
    #[error("failed to encode or decode cached content: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Key/value client consumed by the cache engine.
///
/// Implementations must tolerate overlapping calls from request tasks and
/// detached background tasks without external locking.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Fetch the content stored under `key`, `Ok(None)` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CachedContent>, StoreError>;

    /// Store `content` under `key`. A zero `ttl` keeps the entry until deleted.
    async fn set(&self, key: &str, content: &CachedContent, ttl: Duration)
    -> Result<(), StoreError>;

    /// Delete a single key, or every key with a given prefix when the
    /// pattern ends in [`WILDCARD`].
    async fn delete(&self, pattern: &str) -> Result<(), StoreError>;

    /// Delete exactly `key`. A trailing [`WILDCARD`] is part of the key.
    async fn delete_key(&self, key: &str) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

/// Parsed form of a [`CacheStore::delete`] argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern<'a> {
    Exact(&'a str),
    Prefix(&'a str),
}

impl<'a> KeyPattern<'a> {
    pub fn parse(pattern: &'a str) -> Self {
        match pattern.strip_suffix(WILDCARD) {
            Some(prefix) => Self::Prefix(prefix),
            None => Self::Exact(pattern),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Exact(exact) => key == *exact,
            Self::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}
