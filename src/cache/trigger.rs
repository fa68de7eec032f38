//! Invalidation triggers.
//!
//! A trigger inspects an incoming request and decides whether the cached
//! entries bound to it are stale.

use std::sync::Arc;

use axum::http::{HeaderMap, Method, Request, Uri, request::Parts};
use regex::Regex;

use super::error::TriggerError;

/// Methods that usually modify a resource.
pub const DEFAULT_UPDATE_METHODS: [Method; 3] = [Method::POST, Method::PATCH, Method::PUT];

/// Borrowed view of the request parts a trigger may inspect.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
}

impl<'a, B> From<&'a Request<B>> for RequestInfo<'a> {
    fn from(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
        }
    }
}

impl<'a> From<&'a Parts> for RequestInfo<'a> {
    fn from(parts: &'a Parts) -> Self {
        Self {
            method: &parts.method,
            uri: &parts.uri,
            headers: &parts.headers,
        }
    }
}

/// Predicate deciding whether a request invalidates cached data.
pub trait Trigger: Send + Sync {
    fn matches(&self, request: RequestInfo<'_>) -> bool;
}

/// Triggers are shared between the route wrapper and the registry.
pub type SharedTrigger = Arc<dyn Trigger>;

impl<F> Trigger for F
where
    F: Fn(RequestInfo<'_>) -> bool + Send + Sync,
{
    fn matches(&self, request: RequestInfo<'_>) -> bool {
        self(request)
    }
}

/// Matches requests by method and a regular expression over the request URI.
///
/// The pattern is searched anywhere in the URI, so `.*/users.*` and `/users`
/// behave alike.
#[derive(Debug, Clone)]
pub struct UriTrigger {
    methods: Vec<Method>,
    pattern: Regex,
}

impl UriTrigger {
    pub fn new<I>(methods: I, pattern: &str) -> Result<Self, TriggerError>
    where
        I: IntoIterator<Item = Method>,
    {
        let pattern = Regex::new(pattern).map_err(|source| TriggerError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut unique: Vec<Method> = Vec::new();
        for method in methods {
            if !unique.contains(&method) {
                unique.push(method);
            }
        }

        Ok(Self {
            methods: unique,
            pattern,
        })
    }

    /// Trigger on [`DEFAULT_UPDATE_METHODS`].
    pub fn on_update(pattern: &str) -> Result<Self, TriggerError> {
        Self::new(DEFAULT_UPDATE_METHODS, pattern)
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Trigger for UriTrigger {
    fn matches(&self, request: RequestInfo<'_>) -> bool {
        self.methods.contains(request.method) && self.pattern.is_match(&request.uri.to_string())
    }
}

impl From<UriTrigger> for SharedTrigger {
    fn from(trigger: UriTrigger) -> Self {
        Arc::new(trigger)
    }
}
