use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Method, Request, StatusCode, header};
use axum::middleware::from_fn_with_state;
use axum::routing::post;
use axum::{Extension, Json};
use quietgate_application::ThrottleService;
use quietgate_domain::ThrottleConfig;
use quietgate_infrastructure::{InMemoryRecordStore, SystemClock};
use serde_json::Value;
use tower::ServiceExt;

use super::build_router;
use crate::middleware::{ThrottleCheck, throttle_gate};
use crate::state::AppState;

const PEER: ([u8; 4], u16) = ([203, 0, 113, 7], 40_000);
const ADMIN_TOKEN: &str = "test-admin-token";

struct TestApp {
    router: Router,
    store: Arc<InMemoryRecordStore>,
    throttle: ThrottleService,
}

fn test_state(
    config: ThrottleConfig,
    admin_token: Option<&str>,
    trusted: &[&str],
) -> (AppState, Arc<InMemoryRecordStore>) {
    let store = Arc::new(InMemoryRecordStore::new());
    let throttle = ThrottleService::new(store.clone(), Arc::new(SystemClock::new()), config);
    let state = AppState {
        throttle_service: throttle,
        trusted_proxies: Arc::new(
            trusted
                .iter()
                .filter_map(|network| network.parse().ok())
                .collect(),
        ),
        admin_token: admin_token.map(Arc::from),
    };
    (state, store)
}

fn test_app(config: ThrottleConfig, admin_token: Option<&str>, trusted: &[&str]) -> TestApp {
    let (state, store) = test_state(config, admin_token, trusted);
    let throttle = state.throttle_service.clone();

    let router = match build_router(state, None) {
        Ok(router) => router.layer(MockConnectInfo(SocketAddr::from(PEER))),
        Err(error) => panic!("failed to build router: {error}"),
    };

    TestApp {
        router,
        store,
        throttle,
    }
}

fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap_or_default()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = match app.router.clone().oneshot(request).await {
        Ok(response) => response,
        Err(error) => match error {},
    };
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Waits until detached attempt writes for `identifier` reach `expected`.
async fn wait_for_records(app: &TestApp, identifier: &str, expected: usize) {
    for _ in 0..100 {
        let count = app
            .throttle
            .history(identifier)
            .await
            .map(|hits| hits.count())
            .unwrap_or_default();
        if count >= expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("attempt for {identifier} was never recorded");
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app(ThrottleConfig::default(), None, &[]);
    let (status, body) = send(&app, request(Method::GET, "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn second_submission_within_quiet_time_requires_challenge() {
    let config = ThrottleConfig::default().with_quiet_time_millis(Some(60_000));
    let app = test_app(config, None, &[]);

    let (status, body) = send(&app, request(Method::POST, "/captcha/submit", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["hits"]["count"], 0);
    assert_eq!(body["hits"]["most_recent_gap_millis"], -1);

    wait_for_records(&app, "203.0.113.7", 1).await;

    let (status, body) = send(&app, request(Method::POST, "/captcha/submit", None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["challenge_required"], true);
    assert_eq!(body["message"], "Submitted too frequently");
    assert_eq!(body["hits"]["count"], 1);
}

#[tokio::test]
async fn daily_limit_takes_precedence_over_quiet_time() {
    let config = ThrottleConfig::default()
        .with_max_per_day(Some(1))
        .with_quiet_time_millis(Some(60_000));
    let app = test_app(config, None, &[]);

    let (status, _) = send(&app, request(Method::POST, "/captcha/submit", None)).await;
    assert_eq!(status, StatusCode::OK);
    wait_for_records(&app, "203.0.113.7", 1).await;

    let (status, body) = send(&app, request(Method::POST, "/captcha/submit", None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Exceeded Max Per Day");
}

#[tokio::test]
async fn store_outage_fails_request_then_recovers() {
    let app = test_app(ThrottleConfig::default(), None, &[]);
    app.store.fail_next_opens(1);

    let (status, body) = send(&app, request(Method::POST, "/captcha/submit", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["message"]
        .as_str()
        .is_some_and(|message| message.contains("store connection")));

    let (status, _) = send(&app, request(Method::POST, "/captcha/submit", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.open_calls(), 2);
}

#[tokio::test]
async fn gate_hands_store_failures_to_the_handler() {
    async fn inspect(Extension(ThrottleCheck(check)): Extension<ThrottleCheck>) -> Json<Value> {
        Json(match check {
            Ok(outcome) => serde_json::json!({ "decided": outcome.is_allowed() }),
            Err(error) => serde_json::json!({ "store_error": error.to_string() }),
        })
    }

    let (state, store) = test_state(ThrottleConfig::default(), None, &[]);
    let router = Router::new()
        .route("/gated", post(inspect))
        .route_layer(from_fn_with_state(state.clone(), throttle_gate))
        .with_state(state.clone())
        .layer(MockConnectInfo(SocketAddr::from(PEER)));
    let app = TestApp {
        router,
        store,
        throttle: state.throttle_service,
    };
    app.store.fail_next_opens(1);

    let (status, body) = send(&app, request(Method::POST, "/gated", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["store_error"]
        .as_str()
        .is_some_and(|message| message.contains("store connection")));

    let (status, body) = send(&app, request(Method::POST, "/gated", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decided"], true);
}

#[tokio::test]
async fn forged_leftmost_forwarded_hops_do_not_evade_the_limit() {
    let config = ThrottleConfig::default().with_max_per_day(Some(1));
    let app = test_app(config, None, &["203.0.113.0/24"]);

    let with_forged_hop = |forged: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/captcha/submit")
            .header("x-forwarded-for", format!("{forged}, 198.51.100.20"))
            .body(Body::empty())
            .unwrap_or_default()
    };

    let (status, _) = send(&app, with_forged_hop("1.1.1.1")).await;
    assert_eq!(status, StatusCode::OK);
    wait_for_records(&app, "198.51.100.20", 1).await;

    for forged in ["1.1.1.2", "1.1.1.3"] {
        let (status, body) = send(&app, with_forged_hop(forged)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["message"], "Exceeded Max Per Day");
    }

    let forged_records = app
        .throttle
        .history("1.1.1.1")
        .await
        .map(|hits| hits.count())
        .ok();
    assert_eq!(forged_records, Some(0));
}

#[tokio::test]
async fn forwarded_client_is_throttled_behind_trusted_proxy() {
    let config = ThrottleConfig::default().with_max_per_day(Some(1));
    let app = test_app(config, None, &["203.0.113.0/24"]);

    let forwarded = |client: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/captcha/submit")
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap_or_default()
    };

    let (status, _) = send(&app, forwarded("198.51.100.20")).await;
    assert_eq!(status, StatusCode::OK);
    wait_for_records(&app, "198.51.100.20", 1).await;

    let (status, _) = send(&app, forwarded("198.51.100.21")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, forwarded("198.51.100.20")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn admin_routes_require_configured_token() {
    let app = test_app(ThrottleConfig::default(), None, &[]);
    let (status, _) = send(
        &app,
        request(Method::GET, "/admin/history/203.0.113.7", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let app = test_app(ThrottleConfig::default(), Some(ADMIN_TOKEN), &[]);
    let (status, _) = send(
        &app,
        request(Method::GET, "/admin/history/203.0.113.7", Some("wrong")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_can_inspect_and_clear_history() {
    let app = test_app(ThrottleConfig::default(), Some(ADMIN_TOKEN), &[]);
    for identifier in ["203.0.113.7", "203.0.113.7", "198.51.100.3"] {
        assert!(app.throttle.record_attempt_now(identifier).await.is_ok());
    }

    let (status, body) = send(
        &app,
        request(Method::GET, "/admin/history/203.0.113.7", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identifier"], "203.0.113.7");
    assert_eq!(body["hits"]["count"], 2);

    let (status, body) = send(
        &app,
        request(Method::DELETE, "/admin/history/203.0.113.7", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);

    let (status, body) = send(
        &app,
        request(Method::DELETE, "/admin/history/203.0.113.7", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);

    let (status, body) = send(
        &app,
        request(Method::DELETE, "/admin/history", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert!(body.get("identifier").is_none());

    let remaining = app
        .throttle
        .history("198.51.100.3")
        .await
        .map(|hits| hits.count())
        .ok();
    assert_eq!(remaining, Some(0));
}
