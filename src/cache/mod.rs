//! Trigger-driven response cache.
//!
//! Routes wrapped with [`TriggerCache::wrap`] serve GET responses from a
//! [`CacheStore`](crate::store::CacheStore) and keep their entries until a
//! request matching one of their [`Trigger`]s passes through
//! [`invalidation_sweep`].
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use axum::{Router, middleware, routing::get};
//! use triggercache::cache::{CacheConfig, TriggerCache, UriTrigger, cache_route, invalidation_sweep};
//!
//! # fn build() -> Result<Router, triggercache::cache::TriggerError> {
//! let cache = TriggerCache::in_memory(CacheConfig::default());
//! let users = cache.wrap(
//!     Duration::from_secs(30),
//!     vec![UriTrigger::on_update(".*/users.*")?.into()],
//! );
//!
//! let router = Router::new()
//!     .route(
//!         "/users",
//!         get(|| async { "alice, bob" })
//!             .route_layer(middleware::from_fn_with_state(users, cache_route)),
//!     )
//!     .layer(middleware::from_fn_with_state(cache, invalidation_sweep));
//! # Ok(router)
//! # }
//! ```
//!
//! `Router::layer` also wraps the router's fallback, so unmatched requests
//! are swept too. Inside a nested router the sweep and the route cache both
//! read the full request URI from `OriginalUri`.

mod capture;
mod config;
mod engine;
mod error;
mod keys;
mod lock;
mod middleware;
mod registry;
mod trigger;

pub use capture::CaptureBody;
pub use config::CacheConfig;
pub use engine::{RouteCache, TriggerCache};
pub use error::{CacheError, TriggerError};
pub use keys::{HandlerId, StaleEntry, cache_key, invalidation_targets};
pub use middleware::{cache_route, invalidation_sweep};
pub use registry::{TriggerBinding, TriggerRegistry};
pub use trigger::{DEFAULT_UPDATE_METHODS, RequestInfo, SharedTrigger, Trigger, UriTrigger};
