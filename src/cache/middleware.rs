//! Route cache and invalidation sweep middleware.
//!
//! `cache_route` is installed per route with the [`RouteCache`] returned by
//! [`TriggerCache::wrap`]. `invalidation_sweep` is installed once around the
//! whole router so every request is checked against the registered triggers.

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{
        HeaderValue, Method, Request, StatusCode, Uri,
        header::{ALLOW, CONTENT_TYPE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, error, instrument, warn};
use triggercache_store::CachedContent;

use super::capture::CaptureBody;
use super::engine::{
    METRIC_HIT, METRIC_LOOKUP_ERROR, METRIC_MISS, RouteCache, TriggerCache,
};
use super::error::CacheError;
use super::keys;
use super::trigger::RequestInfo;

const EVENT_STREAM: &str = "text/event-stream";

/// Per-route response cache.
///
/// Registers the route's triggers on first use and records the request path
/// on every request. GET requests are answered from the store when possible;
/// otherwise the downstream handler runs and its response is stored once the
/// body has been sent. Any other method, and any store lookup failure, stops
/// the request before the downstream handler.
///
/// Keys and recorded paths use the full request URI, so a router nested at
/// several prefixes keeps one entry per prefix.
#[instrument(skip_all, fields(handler_id = %route.handler_id, path = %request.uri().path()))]
pub async fn cache_route(
    State(route): State<RouteCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let cache = &route.cache;
    if !cache.config().enabled {
        return next.run(request).await;
    }

    let registry = cache.registry();
    if registry.ensure_registered(route.handler_id, &route.triggers) {
        debug!(triggers = route.triggers.len(), "registered route triggers");
    }
    let uri = request_uri(&request);
    registry.record_url(route.handler_id, uri.path());

    if request.method() != Method::GET {
        let err = CacheError::MethodNotSupported {
            method: request.method().clone(),
        };
        warn!(error = %err, "rejecting request on cached route");
        return method_not_allowed();
    }

    let key = keys::cache_key(route.handler_id, &uri);
    match cache.store().get(&key).await {
        Ok(Some(content)) => {
            counter!(METRIC_HIT).increment(1);
            debug!(cache = "route", outcome = "hit", "serving cached response");
            build_response(content)
        }
        Ok(None) => {
            counter!(METRIC_MISS).increment(1);
            debug!(
                cache = "route",
                outcome = "miss",
                "cache miss, executing handler"
            );
            let response = next.run(request).await;
            capture_response(&route, key, response)
        }
        Err(source) => {
            counter!(METRIC_LOOKUP_ERROR).increment(1);
            let err = CacheError::Lookup { key, source };
            error!(error = %err, "cache lookup failed, request not served");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Router-wide invalidation hook.
///
/// Dispatches deletions for every cached entry whose trigger matches the
/// request, then continues without waiting for them. Triggers see the full
/// request URI even when the sweep is installed inside a nested router.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn invalidation_sweep(
    State(cache): State<TriggerCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let uri = request_uri(&request);
    cache.sweep(RequestInfo {
        method: request.method(),
        uri: &uri,
        headers: request.headers(),
    });
    next.run(request).await
}

/// URI as received, before any nesting router stripped its prefix.
fn request_uri<B>(request: &Request<B>) -> Uri {
    request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| request.uri().clone())
}

/// Wrap the downstream body so its bytes are stored once fully sent.
fn capture_response(route: &RouteCache, key: String, response: Response) -> Response {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with(EVENT_STREAM) {
        debug!(key = %key, "skipping capture of event stream");
        return response;
    }

    let (parts, body) = response.into_parts();
    let status = parts.status.as_u16();
    let cache = route.cache.clone();
    let ttl = route.ttl;

    let body = CaptureBody::new(body, cache.config().max_body_bytes, move |bytes| {
        let content = CachedContent::new(status, content_type, bytes);
        cache.spawn_persist(key, content, ttl);
    });

    Response::from_parts(parts, Body::new(body))
}

/// Build a response from cached data.
fn build_response(content: CachedContent) -> Response {
    let mut builder = Response::builder().status(content.status());

    if !content.content_type().is_empty() {
        if let Ok(value) = HeaderValue::from_str(content.content_type()) {
            builder = builder.header(CONTENT_TYPE, value);
        }
    }

    builder
        .body(Body::from(content.body().clone()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(ALLOW, HeaderValue::from_static("GET"))],
    )
        .into_response()
}
