//! End-to-end behavior of cached routes and trigger invalidation, driven
//! through an axum `Router`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    extract::OriginalUri,
    http::{
        Method, Request, StatusCode, Uri,
        header::{ALLOW, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{any, delete, get, post},
};
use tower::ServiceExt;
use triggercache::cache::{
    CacheConfig, RequestInfo, RouteCache, SharedTrigger, TriggerCache, UriTrigger, cache_key,
    cache_route, invalidation_sweep,
};
use triggercache::store::{CacheStore, CachedContent, MemoryStore, StoreError};

const USERS_BODY: &str = "alice,bob";

struct Fixture {
    app: Router,
    store: Arc<MemoryStore>,
    cache: TriggerCache,
    users: RouteCache,
    calls: Arc<AtomicUsize>,
}

fn users_trigger() -> SharedTrigger {
    UriTrigger::on_update(".*/users.*")
        .expect("valid pattern")
        .into()
}

fn counting_handler(
    calls: &Arc<AtomicUsize>,
    response: fn() -> Response,
) -> axum::routing::MethodRouter {
    let calls = Arc::clone(calls);
    get(move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            response()
        }
    })
}

fn users_response() -> Response {
    ([(CONTENT_TYPE, "text/plain; charset=utf-8")], USERS_BODY).into_response()
}

fn fixture_with(config: CacheConfig, ttl: Duration) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let cache = TriggerCache::new(config, store.clone());
    let users = cache.wrap(ttl, vec![users_trigger()]);
    let calls = Arc::new(AtomicUsize::new(0));

    let app = Router::new()
        .route(
            "/users",
            counting_handler(&calls, users_response)
                .route_layer(middleware::from_fn_with_state(users.clone(), cache_route))
                .post(|| async { StatusCode::CREATED }),
        )
        .route("/groups", post(|| async { StatusCode::CREATED }))
        .layer(middleware::from_fn_with_state(
            cache.clone(),
            invalidation_sweep,
        ));

    Fixture {
        app,
        store,
        cache,
        users,
        calls,
    }
}

fn fixture() -> Fixture {
    fixture_with(CacheConfig::default(), Duration::from_secs(60))
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Bytes, Response) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.expect("body should collect");
    let head = Response::from_parts(parts, Body::empty());
    (status, bytes, head)
}

fn key_for(route: &RouteCache, uri: &'static str) -> String {
    cache_key(route.handler_id(), &Uri::from_static(uri))
}

/// Wait for detached store writes or deletes to settle.
async fn wait_for(store: &MemoryStore, key: &str, present: bool) {
    for _ in 0..200 {
        let found = store.get(key).await.expect("memory store get").is_some();
        if found == present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("key `{key}` never became present={present}");
}

#[tokio::test]
async fn second_get_is_served_from_cache() {
    let fx = fixture();

    let (status, first, _) = send(&fx.app, Method::GET, "/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, Bytes::from(USERS_BODY));
    wait_for(&fx.store, &key_for(&fx.users, "/users"), true).await;

    let (status, second, head) = send(&fx.app, Method::GET, "/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);
    assert_eq!(
        head.headers().get(CONTENT_TYPE).expect("content type"),
        "text/plain; charset=utf-8"
    );
    assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn query_strings_are_cached_separately() {
    let fx = fixture();

    send(&fx.app, Method::GET, "/users?page=1").await;
    send(&fx.app, Method::GET, "/users?page=2").await;
    wait_for(&fx.store, &key_for(&fx.users, "/users?page=1"), true).await;
    wait_for(&fx.store, &key_for(&fx.users, "/users?page=2"), true).await;

    send(&fx.app, Method::GET, "/users?page=1").await;
    assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fx.cache.registry().urls_for(fx.users.handler_id()), vec!["/users"]);
}

#[tokio::test]
async fn update_invalidates_path_and_query_variants() {
    let fx = fixture();
    let bare = key_for(&fx.users, "/users");
    let paged = key_for(&fx.users, "/users?page=2");

    send(&fx.app, Method::GET, "/users").await;
    send(&fx.app, Method::GET, "/users?page=2").await;
    wait_for(&fx.store, &bare, true).await;
    wait_for(&fx.store, &paged, true).await;

    let (status, _, _) = send(&fx.app, Method::POST, "/users").await;
    assert_eq!(status, StatusCode::CREATED);
    wait_for(&fx.store, &bare, false).await;
    wait_for(&fx.store, &paged, false).await;

    send(&fx.app, Method::GET, "/users").await;
    assert_eq!(fx.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unrelated_update_keeps_entries() {
    let fx = fixture();
    let key = key_for(&fx.users, "/users");

    send(&fx.app, Method::GET, "/users").await;
    wait_for(&fx.store, &key, true).await;

    let (status, _, _) = send(&fx.app, Method::POST, "/groups").await;
    assert_eq!(status, StatusCode::CREATED);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(fx.store.get(&key).await.expect("get").is_some());
    send(&fx.app, Method::GET, "/users").await;
    assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_get_on_cached_route_is_rejected() {
    let cache = TriggerCache::in_memory(CacheConfig::default());
    let reports = cache.wrap(Duration::from_secs(60), Vec::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::clone(&calls);

    let app = Router::new().route(
        "/reports",
        any(move || {
            let calls = Arc::clone(&handler_calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "report"
            }
        })
        .route_layer(middleware::from_fn_with_state(reports.clone(), cache_route)),
    );

    for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
        let (status, _, head) = send(&app, method, "/reports").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(head.headers().get(ALLOW).expect("allow header"), "GET");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // Rejected requests still record their path.
    assert_eq!(
        cache.registry().urls_for(reports.handler_id()),
        vec!["/reports"]
    );
}

struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<CachedContent>, StoreError> {
        Err(StoreError::backend("connection refused"))
    }

    async fn set(
        &self,
        _key: &str,
        _content: &CachedContent,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        Err(StoreError::backend("connection refused"))
    }

    async fn delete(&self, _pattern: &str) -> Result<(), StoreError> {
        Err(StoreError::backend("connection refused"))
    }

    async fn delete_key(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::backend("connection refused"))
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn lookup_failure_is_not_served() {
    let cache = TriggerCache::new(CacheConfig::default(), Arc::new(UnavailableStore));
    let users = cache.wrap(Duration::from_secs(60), vec![users_trigger()]);
    let calls = Arc::new(AtomicUsize::new(0));

    let app = Router::new().route(
        "/users",
        counting_handler(&calls, users_response)
            .route_layer(middleware::from_fn_with_state(users, cache_route)),
    );

    let (status, body, _) = send(&app, Method::GET, "/users").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn routes_on_the_same_path_do_not_share_entries() {
    let store = Arc::new(MemoryStore::new());
    let cache = TriggerCache::new(CacheConfig::default(), store.clone());
    let first = cache.wrap(Duration::from_secs(60), Vec::new());
    let second = cache.wrap(Duration::from_secs(60), Vec::new());

    let first_app = Router::new().route(
        "/profile",
        get(|| async { "first" })
            .route_layer(middleware::from_fn_with_state(first.clone(), cache_route)),
    );
    let second_app = Router::new().route(
        "/profile",
        get(|| async { "second" })
            .route_layer(middleware::from_fn_with_state(second.clone(), cache_route)),
    );

    send(&first_app, Method::GET, "/profile").await;
    wait_for(&store, &key_for(&first, "/profile"), true).await;

    let (_, body, _) = send(&second_app, Method::GET, "/profile").await;
    assert_eq!(body, Bytes::from("second"));
    wait_for(&store, &key_for(&second, "/profile"), true).await;

    let (_, body, _) = send(&first_app, Method::GET, "/profile").await;
    assert_eq!(body, Bytes::from("first"));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn event_streams_are_not_stored() {
    let store = Arc::new(MemoryStore::new());
    let cache = TriggerCache::new(CacheConfig::default(), store.clone());
    let events = cache.wrap(Duration::from_secs(60), Vec::new());

    let app = Router::new().route(
        "/events",
        get(|| async { ([(CONTENT_TYPE, "text/event-stream")], "data: ping\n\n") })
            .route_layer(middleware::from_fn_with_state(events, cache_route)),
    );

    let (status, body, _) = send(&app, Method::GET, "/events").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from("data: ping\n\n"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn oversized_bodies_are_forwarded_but_not_stored() {
    let fx = fixture_with(
        CacheConfig {
            max_body_bytes: 4,
            ..Default::default()
        },
        Duration::from_secs(60),
    );

    let (_, body, _) = send(&fx.app, Method::GET, "/users").await;
    assert_eq!(body, Bytes::from(USERS_BODY));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fx.store.is_empty());

    send(&fx.app, Method::GET, "/users").await;
    assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disabled_cache_passes_everything_through() {
    let fx = fixture_with(
        CacheConfig {
            enabled: false,
            ..Default::default()
        },
        Duration::from_secs(60),
    );

    send(&fx.app, Method::GET, "/users").await;
    send(&fx.app, Method::GET, "/users").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
    assert!(fx.store.is_empty());
    assert_eq!(fx.cache.registry().handler_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_fetched_again() {
    let fx = fixture_with(CacheConfig::default(), Duration::from_secs(1));
    let key = key_for(&fx.users, "/users");

    send(&fx.app, Method::GET, "/users").await;
    wait_for(&fx.store, &key, true).await;
    send(&fx.app, Method::GET, "/users").await;
    assert_eq!(fx.calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;

    send(&fx.app, Method::GET, "/users").await;
    assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_register_once() {
    let fx = fixture();

    let requests: Vec<_> = (0..16)
        .map(|i| {
            let app = fx.app.clone();
            tokio::spawn(async move {
                let uri = format!("/users?page={i}");
                send(&app, Method::GET, &uri).await.0
            })
        })
        .collect();

    for request in requests {
        assert_eq!(request.await.expect("request task"), StatusCode::OK);
    }

    assert_eq!(fx.cache.registry().handler_count(), 1);
    assert_eq!(fx.cache.registry().binding_count(fx.users.handler_id()), 1);
    assert_eq!(fx.cache.registry().urls_for(fx.users.handler_id()), vec!["/users"]);
}

#[tokio::test]
async fn closure_triggers_inspect_headers() {
    let store = Arc::new(MemoryStore::new());
    let cache = TriggerCache::new(CacheConfig::default(), store.clone());
    let purge: SharedTrigger =
        Arc::new(|request: RequestInfo<'_>| request.headers.contains_key("x-purge"));
    let feed = cache.wrap(Duration::from_secs(60), vec![purge]);
    let key = key_for(&feed, "/feed");

    let app = Router::new()
        .route(
            "/feed",
            get(|| async { "feed" })
                .route_layer(middleware::from_fn_with_state(feed.clone(), cache_route)),
        )
        .route("/admin", delete(|| async { StatusCode::NO_CONTENT }))
        .layer(middleware::from_fn_with_state(
            cache.clone(),
            invalidation_sweep,
        ));

    send(&app, Method::GET, "/feed").await;
    wait_for(&store, &key, true).await;

    // Without the header nothing is swept.
    send(&app, Method::DELETE, "/admin").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.get(&key).await.expect("get").is_some());

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/admin")
        .header("x-purge", "1")
        .body(Body::empty())
        .expect("request should build");
    let response = app.clone().oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    wait_for(&store, &key, false).await;
}

#[tokio::test]
async fn unmatched_requests_are_still_swept() {
    let fx = fixture();
    let key = key_for(&fx.users, "/users");

    send(&fx.app, Method::GET, "/users").await;
    wait_for(&fx.store, &key, true).await;

    // `Router::layer` also wraps the fallback.
    let (status, _, _) = send(&fx.app, Method::POST, "/users/bob").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    wait_for(&fx.store, &key, false).await;
}

#[tokio::test]
async fn nested_mounts_keep_separate_entries() {
    let store = Arc::new(MemoryStore::new());
    let cache = TriggerCache::new(CacheConfig::default(), store.clone());
    let users = cache.wrap(Duration::from_secs(60), vec![users_trigger()]);

    let api = Router::new().route(
        "/users",
        get(|OriginalUri(uri): OriginalUri| async move { uri.path().to_string() })
            .route_layer(middleware::from_fn_with_state(users.clone(), cache_route)),
    );
    let app = Router::new().nest("/v1", api.clone()).nest("/v2", api);

    let (_, body, _) = send(&app, Method::GET, "/v1/users").await;
    assert_eq!(body, Bytes::from("/v1/users"));
    wait_for(&store, &key_for(&users, "/v1/users"), true).await;

    let (_, body, _) = send(&app, Method::GET, "/v2/users").await;
    assert_eq!(body, Bytes::from("/v2/users"));
    wait_for(&store, &key_for(&users, "/v2/users"), true).await;

    let (_, body, _) = send(&app, Method::GET, "/v1/users").await;
    assert_eq!(body, Bytes::from("/v1/users"));
    assert_eq!(store.len(), 2);
    assert_eq!(
        cache.registry().urls_for(users.handler_id()),
        vec!["/v1/users", "/v2/users"]
    );
}

#[tokio::test]
async fn sweep_inside_nested_router_sees_full_uri() {
    let store = Arc::new(MemoryStore::new());
    let cache = TriggerCache::new(CacheConfig::default(), store.clone());
    let users = cache.wrap(
        Duration::from_secs(60),
        vec![UriTrigger::on_update("^/v2/users").expect("valid pattern").into()],
    );
    let key = key_for(&users, "/v2/users");

    let api = Router::new()
        .route(
            "/users",
            get(|| async { USERS_BODY })
                .route_layer(middleware::from_fn_with_state(users.clone(), cache_route))
                .post(|| async { StatusCode::CREATED }),
        )
        .layer(middleware::from_fn_with_state(
            cache.clone(),
            invalidation_sweep,
        ));
    let app = Router::new().nest("/v2", api);

    send(&app, Method::GET, "/v2/users").await;
    wait_for(&store, &key, true).await;

    let (status, _, _) = send(&app, Method::POST, "/v2/users").await;
    assert_eq!(status, StatusCode::CREATED);
    wait_for(&store, &key, false).await;
}
