//! Handler identity and store key layout.
//!
//! Every cached entry lives under `{handler_id}:{path_and_query}` so two
//! wrapped routes answering the same URI never share an entry.

use std::fmt;

use axum::http::Uri;
use triggercache_store::WILDCARD;
use uuid::Uuid;

const KEY_SEPARATOR: char = ':';

/// Identity of one cache-wrapped route, minted once per wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

impl HandlerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Store key for a request URI under a handler.
pub fn cache_key(handler: HandlerId, uri: &Uri) -> String {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{handler}{KEY_SEPARATOR}{target}")
}

/// One store deletion produced by a trigger match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StaleEntry {
    /// Exact key; a trailing `*` in it is literal.
    Key(String),
    /// Store pattern ending in the store wildcard.
    Pattern(String),
}

impl StaleEntry {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Key(key) => key,
            Self::Pattern(pattern) => pattern,
        }
    }
}

impl fmt::Display for StaleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deletions covering a recorded path: the bare path as an exact key and
/// every query string variant of it as a pattern.
pub fn invalidation_targets(handler: HandlerId, path: &str) -> [StaleEntry; 2] {
    [
        StaleEntry::Key(format!("{handler}{KEY_SEPARATOR}{path}")),
        StaleEntry::Pattern(format!("{handler}{KEY_SEPARATOR}{path}?{WILDCARD}")),
    ]
}
