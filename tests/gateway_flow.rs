use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Local;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tower::ServiceExt;

use genie_match_lib::models::{BatchImage, BatchRequest, MatchOutcome, MatchMode};
use genie_match_lib::modules::matcher::{BatchOrchestrator, Outcome};
use genie_match_lib::modules::quota;
use genie_match_lib::modules::store::{JsonFileStore, MemoryStore, QuotaStore};
use genie_match_lib::proxy::common::error::GatewayError;
use genie_match_lib::proxy::server::{build_router, AppState};
use genie_match_lib::proxy::upstream::client::UnconfiguredBackend;
use genie_match_lib::proxy::{AxumServer, MatchBackend, MatchGateway, ProxyConfig};

const BOUNDARY: &str = "genie-test-boundary";

fn gateway_for(server: &MockServer) -> Arc<MatchGateway> {
    let config = ProxyConfig {
        backend_url: Some(server.base_url()),
        ..Default::default()
    };
    Arc::new(MatchGateway::new(&config).unwrap())
}

fn images(names: &[&str]) -> Vec<BatchImage> {
    names
        .iter()
        .map(|n| BatchImage::new(*n, vec![0xFF, 0xD8, 0xFF, 0xE0]).with_content_type("image/jpeg"))
        .collect()
}

fn seeded_store(used: u32) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let mut state = quota::initial_state(&Local::now());
    state.used_images = used;
    store.save(&state).unwrap();
    store
}

fn multipart_body(names: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    for name in names {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
                BOUNDARY, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn batch_request(uri: &str, names: &[&str]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(multipart_body(names)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ranked_batch_normalises_urls_and_keeps_order() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/match-actors-batch")
                .query_param("top_k", "2");
            then.status(200).json_body(json!({
                "items": [
                    {"filename": "a.jpg", "results": [
                        {"name": "Jane", "score": 0.91, "image_url": "/static/jane.jpg"},
                        {"name": "Ann", "score": 0.40, "image_url": "https://cdn.example.com/ann.jpg"}
                    ]},
                    {"filename": "b.jpg", "error": "no face detected"},
                    {"filename": "c.jpg", "results": [{"name": "Bo", "score": 0.7}]}
                ]
            }));
        })
        .await;

    let gateway = gateway_for(&server);
    let request = BatchRequest::new(images(&["a.jpg", "b.jpg", "c.jpg"]), 2);
    let response = gateway.match_batch(&request).await.unwrap();
    mock.assert_async().await;

    let files: Vec<&str> = response.items.iter().map(|i| i.filename.as_str()).collect();
    assert_eq!(files, ["a.jpg", "b.jpg", "c.jpg"]);
    assert_eq!(response.success_count(), 2);
    assert_eq!(response.metadata.mode, MatchMode::Ranked);

    match &response.items[0].outcome {
        MatchOutcome::Ranked { results } => {
            assert_eq!(
                results[0].image_url.as_deref(),
                Some(format!("{}/static/jane.jpg", server.base_url()).as_str())
            );
            assert_eq!(results[1].image_url.as_deref(), Some("https://cdn.example.com/ann.jpg"));
        }
        other => panic!("expected ranked outcome, got {:?}", other),
    }
    assert!(matches!(response.items[1].outcome, MatchOutcome::Errored { .. }));
}

#[tokio::test]
async fn reference_mode_is_forwarded_and_reported() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/match-actors-batch")
                .query_param("reference_actor", "Jane Doe");
            then.status(200).json_body(json!({
                "reference_actor": "Jane Doe",
                "items": [
                    {"filename": "a.jpg", "reference_score": 0.42, "reference_actor_name": "Jane Doe"},
                    {"filename": "b.jpg", "reference_score": 0.88, "reference_actor_name": "Jane Doe"}
                ],
                "ranked_by_reference": [
                    {"filename": "b.jpg", "reference_score": 0.88},
                    {"filename": "a.jpg", "reference_score": 0.42}
                ]
            }));
        })
        .await;

    let gateway = gateway_for(&server);
    let request =
        BatchRequest::new(images(&["a.jpg", "b.jpg"]), 3).with_reference_actor("  Jane Doe ");
    let response = gateway.match_batch(&request).await.unwrap();
    mock.assert_async().await;

    assert_eq!(response.metadata.mode, MatchMode::Reference);
    assert_eq!(response.metadata.reference_actor.as_deref(), Some("Jane Doe"));
    assert_eq!(response.metadata.reference_ranking[0].filename, "b.jpg");
    assert_eq!(response.items[0].filename, "a.jpg");
}

#[tokio::test]
async fn backend_error_surfaces_status_and_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/match-actors-batch");
            then.status(500).body("index not loaded");
        })
        .await;

    let gateway = gateway_for(&server);
    let err = gateway
        .match_batch(&BatchRequest::new(images(&["a.jpg"]), 3))
        .await
        .unwrap_err();
    match err {
        GatewayError::Backend { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "index not loaded");
        }
        other => panic!("expected backend error, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_success_body_is_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/match-actors-batch");
            then.status(200).body("<html>oops</html>");
        })
        .await;

    let err = gateway_for(&server)
        .match_batch(&BatchRequest::new(images(&["a.jpg"]), 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "decode");
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/match-actors-batch");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({"items": []}));
        })
        .await;

    let config = ProxyConfig {
        backend_url: Some(server.base_url()),
        host_time_limit_secs: 2,
        timeout_margin_secs: 1,
        ..Default::default()
    };
    let gateway = MatchGateway::new(&config).unwrap();
    let err = gateway
        .match_batch(&BatchRequest::new(images(&["a.jpg"]), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn failed_backend_call_leaves_usage_unchanged() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/match-actors-batch");
            then.status(503).body("warming up");
        })
        .await;

    let store = seeded_store(4);
    let orchestrator = BatchOrchestrator::new(store.clone(), gateway_for(&server));

    let outcome = orchestrator
        .submit(BatchRequest::new(images(&["a.jpg", "b.jpg"]), 3))
        .await;
    assert!(matches!(outcome, Outcome::Failed { .. }));
    assert_eq!(orchestrator.current_state().used_images, 4);
}

#[tokio::test]
async fn orchestrator_persists_usage_to_file_store() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/match-actors-batch");
            then.status(200).json_body(json!({
                "items": [
                    {"filename": "a.jpg", "results": [{"name": "Jane", "score": 0.9}]},
                    {"filename": "b.jpg", "results": [{"name": "Bo", "score": 0.8}]}
                ]
            }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let orchestrator = BatchOrchestrator::new(store.clone(), gateway_for(&server));

    let outcome = orchestrator
        .submit(BatchRequest::new(images(&["a.jpg", "b.jpg"]), 3))
        .await;
    assert!(matches!(outcome, Outcome::Completed { success_count: 2, .. }));

    // A fresh store over the same directory sees the recorded usage
    let reopened = JsonFileStore::new(dir.path());
    assert_eq!(reopened.load().unwrap().used_images, 2);
}

#[tokio::test]
async fn http_batch_route_returns_items_and_subscription() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/match-actors-batch")
                .query_param("top_k", "3");
            then.status(200).json_body(json!({
                "items": [
                    {"filename": "a.jpg", "results": [{"name": "Jane", "score": 0.9}]},
                    {"filename": "b.jpg", "error": "no face detected"}
                ]
            }));
        })
        .await;

    let gateway = gateway_for(&server);
    let state = AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(seeded_store(0), gateway.clone())),
        gateway: Some(gateway),
    };
    let app = build_router(state, 100);

    let response = app
        .oneshot(batch_request("/api/match-actors-batch", &["a.jpg", "b.jpg"]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success_count"], 1);
    assert_eq!(body["failed_count"], 1);
    assert_eq!(body["items"][0]["filename"], "a.jpg");
    assert_eq!(body["items"][0]["mode"], "ranked");
    assert_eq!(body["items"][1]["mode"], "errored");
    assert_eq!(body["subscription"]["usedImages"], 1);
    assert_eq!(body["subscription"]["remaining_images"], 9);
}

#[tokio::test]
async fn http_batch_route_blocks_over_quota_with_402() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/match-actors-batch");
            then.status(200).json_body(json!({"items": []}));
        })
        .await;

    let gateway = gateway_for(&server);
    let state = AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(seeded_store(9), gateway.clone())),
        gateway: Some(gateway),
    };

    let response = build_router(state, 100)
        .oneshot(batch_request("/api/match-actors-batch?top_k=3", &["a.jpg", "b.jpg"]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let body = json_body(response).await;
    assert_eq!(body["reason"], "images");
    assert_eq!(body["subscription"]["usedImages"], 9);
    assert_eq!(body["upgrade"]["maxImages"], -1);
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn http_subscription_upgrade_and_downgrade() {
    let state = AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(
            seeded_store(7),
            Arc::new(UnconfiguredBackend::new("unset")),
        )),
        gateway: None,
    };
    let app = build_router(state, 100);

    let post = |uri: &str| {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let upgraded = json_body(app.clone().oneshot(post("/api/subscription/upgrade")).await.unwrap()).await;
    assert_eq!(upgraded["plan"], "premium");
    assert_eq!(upgraded["maxImages"], -1);
    assert_eq!(upgraded["resetDate"], "");
    assert_eq!(upgraded["is_premium"], true);

    let downgraded =
        json_body(app.clone().oneshot(post("/api/subscription/downgrade")).await.unwrap()).await;
    assert_eq!(downgraded["plan"], "free");
    assert_eq!(downgraded["usedImages"], 0);
    assert_eq!(downgraded["maxActors"], 5);

    let current = app
        .oneshot(Request::builder().uri("/api/subscription").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(current.status(), StatusCode::OK);
    assert_eq!(json_body(current).await["remaining_images"], 10);
}

#[tokio::test]
async fn missing_backend_reports_configuration_error() {
    let state = AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(
            seeded_store(0),
            Arc::new(UnconfiguredBackend::new(
                "BACKEND_URL not set",
            )),
        )),
        gateway: None,
    };
    let app = build_router(state, 100);

    let response = app
        .clone()
        .oneshot(batch_request("/api/match-actors-batch", &["a.jpg"]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"]["kind"], "configuration");

    let health = app
        .oneshot(Request::builder().uri("/api/backend/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn backend_health_passthrough() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({"status": "ok", "actors_indexed": 1200}));
        })
        .await;

    let gateway = gateway_for(&server);
    let state = AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(Arc::new(MemoryStore::new()), gateway.clone())),
        gateway: Some(gateway),
    };

    let response = build_router(state, 100)
        .oneshot(Request::builder().uri("/api/backend/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["actors_indexed"], 1200);
}

/// Address nothing listens on: bind an ephemeral port, then release it
fn closed_backend() -> Arc<MatchGateway> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ProxyConfig {
        backend_url: Some(format!("http://{}", addr)),
        ..Default::default()
    };
    Arc::new(MatchGateway::new(&config).unwrap())
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    let err = closed_backend()
        .match_batch(&BatchRequest::new(images(&["a.jpg"]), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)), "got {:?}", err);
    assert!(err.is_transient());
}

#[tokio::test]
async fn unreachable_backend_fails_batch_without_charging() {
    let store = seeded_store(4);
    let orchestrator = BatchOrchestrator::new(store.clone(), closed_backend());

    match orchestrator
        .submit(BatchRequest::new(images(&["a.jpg", "b.jpg"]), 3))
        .await
    {
        Outcome::Failed { cause } => assert_eq!(cause.kind(), "transport"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(orchestrator.current_state().used_images, 4);
}

#[tokio::test]
async fn invalid_top_k_answers_json_error() {
    let state = AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(
            seeded_store(0),
            Arc::new(UnconfiguredBackend::new("unset")),
        )),
        gateway: None,
    };
    let app = build_router(state, 100);

    for uri in ["/api/match-actors-batch?top_k=abc", "/api/match-actors-batch?top_k=-2"] {
        let response = app.clone().oneshot(batch_request(uri, &["a.jpg"])).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "invalid_request");
        assert_eq!(body["error"]["retryable"], false);
    }
}

#[tokio::test]
async fn server_serves_until_stopped() {
    let state = AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(UnconfiguredBackend::new("unset")),
        )),
        gateway: None,
    };
    let (server, handle) = AxumServer::start("127.0.0.1".to_string(), 0, state, 100)
        .await
        .unwrap();
    let base = format!("http://{}", server.local_addr());

    let body: Value = reqwest::get(format!("{}/healthz", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");

    let subscription: Value = reqwest::get(format!("{}/api/subscription", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(subscription["plan"], "free");

    server.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
