//! End-to-end coverage of the upload -> get -> download -> expire lifecycle
//! through the real router, backed entirely by in-memory components. Mirrors
//! the teacher's integration-test style: build a real `Router`, drive it
//! with `tower::ServiceExt::oneshot`, assert on status + decoded body.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use h51::accounts::{
    AccountRepository, AssetRepository, InMemoryAccountRepository, InMemoryAssetRepository,
    InMemoryStatsSink,
};
use h51::api::{build_router, AppState};
use h51::config::Config;
use h51::domain::{Account, BackendSettings};
use h51::events::EventBus;
use h51::queue::{InMemoryQueueBackend, TaskQueue};
use h51::ratelimit::{ApiLogRing, InMemoryRateLimitBackend, RateLimiter};
use h51::registry::{build_default_analyzer_registry, build_default_transform_registry};

const API_KEY_HEADER: &str = "x-h51-apikey";

async fn test_state(
    storage_root: &std::path::Path,
) -> (AppState<InMemoryQueueBackend, InMemoryRateLimitBackend>, Account) {
    let config = Config::default();

    let account_repo = InMemoryAccountRepository::new();
    let mut account = Account::new("acme", "test-api-key");
    account.public_backend = Some(BackendSettings::Local {
        root: storage_root.to_string_lossy().to_string(),
    });
    account_repo.put(account.clone()).await.unwrap();

    let state = AppState {
        config: Arc::new(config.clone()),
        queue: Arc::new(TaskQueue::new(Arc::new(InMemoryQueueBackend::new()), 120)),
        event_bus: EventBus::new(),
        account_repo: Arc::new(account_repo),
        asset_repo: Arc::new(InMemoryAssetRepository::new()),
        stats: Arc::new(InMemoryStatsSink::default()),
        rate_limiter: Arc::new(RateLimiter::new(
            InMemoryRateLimitBackend::new(),
            config.api_rate_limit_per_second,
        )),
        api_log: Arc::new(ApiLogRing::new(config.api_max_log_entries)),
        analyzer_registry: Arc::new(build_default_analyzer_registry()),
        transform_registry: Arc::new(build_default_transform_registry()),
    };
    (state, account)
}

fn multipart_body(boundary: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn upload_then_get_then_download_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _account) = test_state(dir.path()).await;
    let app = build_router(state);

    let boundary = "X-BOUNDARY-1";
    let payload = b"hello asset world".to_vec();
    let body = multipart_body(boundary, "greeting.txt", "text/plain", &payload);

    let upload_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/assets")
                .header(API_KEY_HEADER, "test-api-key")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(upload_response.status(), StatusCode::OK);

    let upload_bytes = upload_response.into_body().collect().await.unwrap().to_bytes();
    let uploaded: serde_json::Value = serde_json::from_slice(&upload_bytes).unwrap();
    let uid = uploaded["uid"].as_str().unwrap().to_string();
    assert_eq!(uploaded["content_type"], "text/plain");

    let get_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/assets/{uid}"))
                .header(API_KEY_HEADER, "test-api-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);

    let download_response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/assets/{uid}/download"))
                .header(API_KEY_HEADER, "test-api-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(download_response.status(), StatusCode::OK);
    let downloaded = download_response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(downloaded.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn missing_api_key_is_rejected_before_any_handler_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _account) = test_state(dir.path()).await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/assets")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_asset_uid_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _account) = test_state(dir.path()).await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/assets/{}", Uuid::new_v4()))
                .header(API_KEY_HEADER, "test-api-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expiring_an_asset_hides_it_from_subsequent_reads() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _account) = test_state(dir.path()).await;
    let app = build_router(state);

    let boundary = "X-BOUNDARY-2";
    let body = multipart_body(boundary, "doomed.bin", "application/octet-stream", b"bytes");
    let upload_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/assets")
                .header(API_KEY_HEADER, "test-api-key")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let upload_bytes = upload_response.into_body().collect().await.unwrap().to_bytes();
    let uploaded: serde_json::Value = serde_json::from_slice(&upload_bytes).unwrap();
    let uid = uploaded["uid"].as_str().unwrap().to_string();

    let expire_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/assets/{uid}/expire"))
                .header(API_KEY_HEADER, "test-api-key")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"seconds": -1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(expire_response.status(), StatusCode::OK);

    let get_response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/assets/{uid}"))
                .header(API_KEY_HEADER, "test-api-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_response.status(), StatusCode::NOT_FOUND);
}
