use axum::http::Method;
use thiserror::Error;
use triggercache_store::StoreError;

/// Failures observed while serving a cached route or sweeping triggers.
///
/// These are logged where they happen and never surface to the client as a
/// typed error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("store lookup failed for `{key}`: {source}")]
    Lookup { key: String, source: StoreError },
    #[error("failed to persist `{key}`: {source}")]
    Persist { key: String, source: StoreError },
    #[error("failed to delete `{entry}`: {source}")]
    Delete { entry: String, source: StoreError },
    #[error("caching is only supported for GET requests, got {method}")]
    MethodNotSupported { method: Method },
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid trigger pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}
