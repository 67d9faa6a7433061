//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use keyhouse::config::{KeyhouseConfig, RateLimitConfig};
use keyhouse::errors::LicenseError;
use keyhouse::server::database::Database;
use keyhouse::server::handlers::AppState;
use keyhouse::server::logging::REQUEST_ID_HEADER;
use keyhouse::server::routes::build_router;

fn test_config() -> KeyhouseConfig {
    let mut config = KeyhouseConfig::default();
    config.auth.jwt_secret = "test-secret-that-is-long-enough-for-hs256".to_string();
    config.auth.password_memory_kib = 1024;
    config.auth.password_iterations = 1;
    config
}

async fn test_db() -> Arc<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    let db = Database::SQLite(pool);
    db.migrate().await.expect("failed to apply schema");
    Arc::new(db)
}

/// Helper to create a router over a fresh in-memory database.
async fn setup_test_app() -> Router {
    let state = AppState::new(test_db().await, &test_config()).expect("failed to build state");
    build_router(state, &RateLimitConfig::default()).expect("failed to build router")
}

/// Helper to make a JSON request to the app.
async fn json_request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let (status, _, json) = raw_request(app, method, uri, body, token).await;
    (status, json)
}

async fn raw_request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let body_bytes = body
        .map(|v| serde_json::to_vec(&v).unwrap())
        .unwrap_or_default();

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body_bytes)).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, headers, json)
}

/// Register `alice` and log in, returning the bearer token.
async fn login_token(app: &Router) -> String {
    let (status, _) = json_request(
        app,
        "POST",
        "/api/auth/register",
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "s3cret!",
            "password_confirm": "s3cret!"
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = json_request(
        app,
        "POST",
        "/api/auth/login",
        Some(json!({ "email": "alice@example.com", "password": "s3cret!" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().expect("token in body").to_string()
}

fn demo_license() -> Value {
    json!({
        "key": "ABCD-1234-EFGH-5678",
        "product": "Demo",
        "owner_email": "a@b.com",
        "owner_name": "A B"
    })
}

// ============================================================================
// Health and routing
// ============================================================================

#[tokio::test]
async fn ping_reports_healthy() {
    let app = setup_test_app().await;
    let (status, body) = json_request(&app, "GET", "/api/ping", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "keyhouse");
    assert_eq!(body["database"]["connected"], true);
    assert_eq!(body["database"]["db_type"], "sqlite");
}

#[tokio::test]
async fn unknown_route_uses_error_envelope() {
    let app = setup_test_app().await;
    let (status, body) = json_request(&app, "GET", "/nope", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = setup_test_app().await;
    let (_, headers, _) = raw_request(&app, "GET", "/api/ping", None, None).await;
    let id = headers
        .get(REQUEST_ID_HEADER)
        .expect("request id header")
        .to_str()
        .unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn state_requires_jwt_secret() {
    let mut config = test_config();
    config.auth.jwt_secret = String::new();
    let result = AppState::new(test_db().await, &config);
    assert!(matches!(result, Err(LicenseError::ConfigError(_))));
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn register_returns_account_without_hash() {
    let app = setup_test_app().await;
    let (status, body) = json_request(
        &app,
        "POST",
        "/api/auth/register",
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "s3cret!",
            "passwordRepeat": "s3cret!"
        })),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["account"]["username"], "alice");
    assert_eq!(body["account"]["email"], "alice@example.com");
    assert!(body["account"].get("password_hash").is_none());
    assert!(!body.to_string().contains("argon2"));
}

#[tokio::test]
async fn register_password_mismatch() {
    let app = setup_test_app().await;
    let (status, body) = json_request(
        &app,
        "POST",
        "/api/auth/register",
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "one",
            "password_confirm": "two"
        })),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "PASSWORD_MISMATCH");
}

#[tokio::test]
async fn register_twice_conflicts() {
    let app = setup_test_app().await;
    login_token(&app).await;

    let (status, body) = json_request(
        &app,
        "POST",
        "/api/auth/register",
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "pw",
            "password_confirm": "pw"
        })),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_ACCOUNT");
}

#[tokio::test]
async fn malformed_body_is_invalid_request() {
    let app = setup_test_app().await;
    let (status, body) = json_request(
        &app,
        "POST",
        "/api/auth/register",
        Some(json!({ "username": "alice" })),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn login_failures_look_the_same() {
    let app = setup_test_app().await;
    login_token(&app).await;

    let (wrong_pw_status, wrong_pw) = json_request(
        &app,
        "POST",
        "/api/auth/login",
        Some(json!({ "email": "alice@example.com", "password": "wrong" })),
        None,
    )
    .await;
    let (unknown_status, unknown) = json_request(
        &app,
        "POST",
        "/api/auth/login",
        Some(json!({ "email": "bob@example.com", "password": "s3cret!" })),
        None,
    )
    .await;

    assert_eq!(wrong_pw_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_pw["error"]["code"], "INVALID_CREDENTIALS");
    assert_eq!(wrong_pw, unknown);
}

#[tokio::test]
async fn me_returns_logged_in_account() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;

    let (status, body) = json_request(&app, "GET", "/api/auth/me", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert!(body["last_login"].is_string());
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = setup_test_app().await;

    let (status, body) = json_request(&app, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MISSING_TOKEN");

    let (status, body) =
        json_request(&app, "GET", "/license/audit-logs", None, Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

// ============================================================================
// Licenses
// ============================================================================

#[tokio::test]
async fn create_list_get_delete_license() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;

    let (status, body) =
        json_request(&app, "POST", "/api/licenses", Some(demo_license()), Some(&token)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["key"], "ABCD-1234-EFGH-5678");
    assert_eq!(body["is_activated"], false);
    assert_eq!(body["expires_at"], Value::Null);

    let (status, body) =
        json_request(&app, "GET", "/api/licenses?product=Demo", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["licenses"][0]["owner_name"], "A B");

    let (status, body) = json_request(
        &app,
        "GET",
        "/api/licenses/Demo/ABCD-1234-EFGH-5678",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner_email"], "a@b.com");

    let (status, body) = json_request(
        &app,
        "DELETE",
        "/api/licenses/Demo/ABCD-1234-EFGH-5678",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, body) = json_request(
        &app,
        "DELETE",
        "/api/licenses/Demo/ABCD-1234-EFGH-5678",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn create_without_key_generates_one() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;

    let (status, body) = json_request(
        &app,
        "POST",
        "/api/licenses",
        Some(json!({
            "product": "Demo",
            "owner_email": "a@b.com",
            "owner_name": "A B",
            "expires_at": "2030-01-31"
        })),
        Some(&token),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let key = body["key"].as_str().unwrap();
    assert!(keyhouse::license_key::is_valid_license_key(key));
    assert_eq!(body["expires_at"], "2030-01-31T00:00:00Z");
}

#[tokio::test]
async fn create_duplicate_conflicts() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;

    json_request(&app, "POST", "/api/licenses", Some(demo_license()), Some(&token)).await;
    let (status, body) =
        json_request(&app, "POST", "/api/licenses", Some(demo_license()), Some(&token)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_KEY");
}

#[tokio::test]
async fn create_rejects_bad_key_and_email() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;

    let mut bad_key = demo_license();
    bad_key["key"] = json!("abcd-1234");
    let (status, body) =
        json_request(&app, "POST", "/api/licenses", Some(bad_key), Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_KEY_FORMAT");

    let mut bad_email = demo_license();
    bad_email["owner_email"] = json!("nope");
    let (status, body) =
        json_request(&app, "POST", "/api/licenses", Some(bad_email), Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_EMAIL");
}

// ============================================================================
// Verification and audit
// ============================================================================

#[tokio::test]
async fn verify_is_public() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;
    json_request(&app, "POST", "/api/licenses", Some(demo_license()), Some(&token)).await;

    let (status, body) = json_request(
        &app,
        "POST",
        "/license/verify",
        Some(json!({ "key": "ABCD-1234-EFGH-5678", "product": "Demo" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["owner_email"], "a@b.com");

    let (status, body) = json_request(
        &app,
        "POST",
        "/license/verify",
        Some(json!({ "key": "ZZZZ-9999-ZZZZ-9999", "product": "Demo" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": false, "reason": "not found" }));
}

#[tokio::test]
async fn verify_reports_expired() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;

    let mut license = demo_license();
    license["expires_at"] = json!("2000-01-01T00:00:00Z");
    let (status, _) =
        json_request(&app, "POST", "/api/licenses", Some(license), Some(&token)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = json_request(
        &app,
        "POST",
        "/license/verify",
        Some(json!({ "key": "ABCD-1234-EFGH-5678", "product": "Demo" })),
        None,
    )
    .await;
    assert_eq!(body, json!({ "valid": false, "reason": "expired" }));
}

#[tokio::test]
async fn audit_logs_list_newest_first() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;

    json_request(&app, "POST", "/api/licenses", Some(demo_license()), Some(&token)).await;
    json_request(
        &app,
        "DELETE",
        "/api/licenses/Demo/ABCD-1234-EFGH-5678",
        None,
        Some(&token),
    )
    .await;

    let (status, body) =
        json_request(&app, "GET", "/license/audit-logs", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().expect("array body");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "DELETE");
    assert_eq!(entries[1]["action"], "ADD");
    assert_eq!(entries[1]["details"], "Owner: A B (a@b.com)");

    let (_, body) =
        json_request(&app, "GET", "/license/audit-logs?limit=1", None, Some(&token)).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn audit_log_limit_is_bounded() {
    let app = setup_test_app().await;
    let token = login_token(&app).await;

    for uri in ["/license/audit-logs?limit=0", "/license/audit-logs?limit=1001"] {
        let (status, body) = json_request(&app, "GET", uri, None, Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    }
}

#[tokio::test]
async fn overlong_fields_are_rejected() {
    let app = setup_test_app().await;

    let (status, body) = json_request(
        &app,
        "POST",
        "/api/auth/register",
        Some(json!({
            "username": "a".repeat(65),
            "email": "alice@example.com",
            "password": "pw",
            "password_confirm": "pw"
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert_eq!(body["error"]["details"]["field"], "username");

    let token = login_token(&app).await;
    let mut license = demo_license();
    license["owner_name"] = json!("n".repeat(256));
    let (status, body) =
        json_request(&app, "POST", "/api/licenses", Some(license), Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "owner_name");
}
