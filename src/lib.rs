//! Response caching for axum routes with trigger-driven invalidation.

pub mod cache;
pub mod config;
pub mod infra;

pub use triggercache_store as store;
