//! Integration tests for the cert-expiry API endpoints.
//!
//! These tests verify the full request/response cycle through the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_test::TestServer;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::json;
use tower::ServiceExt;

use cert_expiry::api::{AppState, router};
use cert_expiry::data_sources::ActivityDataSource;
use cert_expiry::error::DataSourceError;
use cert_expiry::expiration::{ExpirationCalculator, ExpirationPolicy};
use cert_expiry::model::ActivityEvent;
use cert_expiry::storage::Storage;

struct DownSource;

#[async_trait]
impl ActivityDataSource for DownSource {
    fn name(&self) -> &str {
        "down"
    }

    async fn fetch_activity(
        &self,
        _account_id: &str,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, DataSourceError> {
        Err(DataSourceError::Unavailable("connection refused".to_string()))
    }
}

async fn create_test_server_with(source: Arc<dyn ActivityDataSource>) -> TestServer {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    server_for(storage, source)
}

/// Server computing expirations from its own activity index.
async fn create_test_server() -> TestServer {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let source: Arc<dyn ActivityDataSource> = Arc::new(storage.clone());
    server_for(storage, source)
}

fn state_for(storage: Storage, source: Arc<dyn ActivityDataSource>) -> AppState {
    AppState {
        storage,
        calculator: ExpirationCalculator::new(
            source,
            ExpirationPolicy::default(),
            Duration::from_secs(5),
        ),
        cache_seconds: 600,
    }
}

fn server_for(storage: Storage, source: Arc<dyn ActivityDataSource>) -> TestServer {
    TestServer::new(router(state_for(storage, source))).unwrap()
}

fn nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap()
}

async fn post_activity_every(
    server: &TestServer,
    account_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    step_days: i64,
) {
    let mut at = from;
    while at <= to {
        server
            .post("/activity")
            .json(&json!({ "account_id": account_id, "timestamp_nanos": nanos(at) }))
            .await
            .assert_status(StatusCode::ACCEPTED);
        at += TimeDelta::days(step_days);
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_router_oneshot() {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let source: Arc<dyn ActivityDataSource> = Arc::new(storage.clone());
    let app = router(state_for(storage, source));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_post_activity() {
    let server = create_test_server().await;

    let response = server
        .post("/activity")
        .json(&json!({
            "account_id": "jane.near",
            "timestamp_nanos": 1_640_252_799_000_000_000i64
        }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_post_activity_is_counted_per_account() {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let source: Arc<dyn ActivityDataSource> = Arc::new(storage.clone());
    let server = server_for(storage.clone(), source);
    let first = Utc.with_ymd_and_hms(2021, 12, 23, 9, 46, 39).unwrap();

    post_activity_every(&server, "jane.near", first, first + TimeDelta::days(2), 1).await;
    post_activity_every(&server, "john.near", first, first, 1).await;

    assert_eq!(storage.activity_count("jane.near").await.unwrap(), 3);
    assert_eq!(storage.activity_count("john.near").await.unwrap(), 1);
}

#[tokio::test]
async fn test_post_activity_default_timestamp() {
    let server = create_test_server().await;

    let response = server
        .post("/activity")
        .json(&json!({ "account_id": "jane.near" }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_post_activity_rejects_empty_account() {
    let server = create_test_server().await;

    let response = server
        .post("/activity")
        .json(&json!({ "account_id": "" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_expiration_without_activity() {
    let server = create_test_server().await;

    let response = server
        .get("/expiration?account_id=idle.near&issued_at=2021-03-02")
        .await;

    response.assert_status_ok();
    assert_eq!(response.header("cache-control"), "public, s-maxage=600");

    let body: serde_json::Value = response.json();
    assert_eq!(body["account_id"], "idle.near");
    assert_eq!(body["expiration"], "2021-08-29");
    assert_eq!(body["basis"], "no_activity");
    assert!(body["gap_days"].is_null());
    assert_eq!(body["expired"], true);
}

#[tokio::test]
async fn test_expiration_first_long_gap() {
    let server = create_test_server().await;
    let issued = Utc.with_ymd_and_hms(2021, 1, 5, 0, 0, 0).unwrap();
    let quiet_from = Utc.with_ymd_and_hms(2021, 3, 16, 0, 0, 0).unwrap();

    post_activity_every(&server, "jim.near", issued, quiet_from, 5).await;
    post_activity_every(
        &server,
        "jim.near",
        quiet_from + TimeDelta::days(204),
        quiet_from + TimeDelta::days(300),
        7,
    )
    .await;

    let response = server
        .get("/expiration?account_id=jim.near&issued_at=1609804800000")
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["expiration"], "2021-09-12");
    assert_eq!(body["basis"], "inactivity_gap");
    assert_eq!(body["gap_days"], 204);
}

#[tokio::test]
async fn test_expiration_datetime_format() {
    let server = create_test_server().await;
    let last = Utc.with_ymd_and_hms(2022, 4, 7, 13, 20, 37).unwrap();

    post_activity_every(&server, "john.near", last, last, 1).await;

    let response = server
        .get("/expiration?account_id=john.near&issued_at=2022-04-01&format=datetime")
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["expiration"], "2022-10-04 13:20");
    assert_eq!(body["basis"], "most_recent_activity");
}

#[tokio::test]
async fn test_expiration_invalid_issued_at() {
    let server = create_test_server().await;

    let response = server
        .get("/expiration?account_id=jane.near&issued_at=someday")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_expiration_for_pre_1677_issuance() {
    let server = create_test_server().await;

    let response = server
        .get("/expiration?account_id=jane.near&issued_at=1600-01-01")
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["expiration"], "1600-06-29");
    assert_eq!(body["basis"], "no_activity");
}

#[tokio::test]
async fn test_expiration_source_down() {
    let server = create_test_server_with(Arc::new(DownSource)).await;

    let response = server
        .get("/expiration?account_id=jane.near&issued_at=2021-03-02")
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_certificate_lifecycle() {
    let server = create_test_server().await;

    server
        .post("/certificates")
        .json(&json!({
            "token_id": "103",
            "account_id": "jane.near",
            "issued_at": "2021-03-02T00:00:00Z",
            "title": "Certified Rust Developer"
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let resumed = Utc.with_ymd_and_hms(2021, 12, 23, 9, 46, 39).unwrap();
    post_activity_every(&server, "jane.near", resumed, resumed + TimeDelta::days(20), 5).await;

    let response = server.get("/certificates/103").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["token_id"], "103");
    assert_eq!(body["title"], "Certified Rust Developer");
    assert_eq!(body["issued"], "2021-03-02");
    assert_eq!(body["expiration"], "2021-08-29");
    assert_eq!(body["expired"], true);
}

#[tokio::test]
async fn test_certificate_is_write_once() {
    let server = create_test_server().await;
    let record = json!({
        "token_id": "7",
        "account_id": "jane.near",
        "issued_at": "2021-03-02"
    });

    server
        .post("/certificates")
        .json(&record)
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/certificates")
        .json(&record)
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_certificate_rejects_bad_input() {
    let server = create_test_server().await;

    server
        .post("/certificates")
        .json(&json!({ "token_id": "8", "account_id": "jane.near", "issued_at": "soon" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post("/certificates")
        .json(&json!({ "token_id": " ", "account_id": "jane.near", "issued_at": "2021-03-02" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_certificate() {
    let server = create_test_server().await;

    server
        .get("/certificates/missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_certificate_renders_without_expiration_when_source_down() {
    let server = create_test_server_with(Arc::new(DownSource)).await;

    server
        .post("/certificates")
        .json(&json!({
            "token_id": "42",
            "account_id": "jane.near",
            "issued_at": "2021-03-02"
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/certificates/42").await;

    response.assert_status_ok();
    assert!(response.headers().get("cache-control").is_none());

    let body: serde_json::Value = response.json();
    assert_eq!(body["account_id"], "jane.near");
    assert!(body["expiration"].is_null());
    assert!(body["expired"].is_null());
}
