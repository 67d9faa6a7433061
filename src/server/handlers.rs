//! HTTP handlers.
//!
//! Handlers parse the request, call into the services and shape the JSON
//! response. Every failure goes out as an [`ApiError`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ConnectInfo, Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::KeyhouseConfig;
use crate::errors::LicenseResult;
use crate::license_key::resolve_license_key;
use crate::server::accounts::{Account, AccountService, Registration};
use crate::server::api_error::ApiError;
use crate::server::auth::AuthenticatedAccount;
use crate::server::database::{AuditLogEntry, Database, License, NewLicense};
use crate::server::licenses::LicenseService;
use crate::server::logging::HealthResponse;
use crate::server::password::{HashParams, PasswordHashing};
use crate::server::tokens::TokenIssuer;
use crate::server::validation::{
    parse_datetime, validate_length, validate_limit, validate_not_empty,
};
use crate::server::verification::VerifyResponse;

/// Default and maximum page size for `GET /license/audit-logs`.
pub const DEFAULT_AUDIT_LIMIT: u32 = 100;
pub const MAX_AUDIT_LIMIT: u32 = 1000;

/// Upper bounds for free-text fields, in characters.
pub const MAX_USERNAME_LENGTH: usize = 64;
pub const MAX_NAME_LENGTH: usize = 255;

/// Shared application state for handlers.
///
/// Cheap to clone: everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub licenses: LicenseService,
    pub accounts: AccountService,
    pub tokens: Arc<TokenIssuer>,
    pub started_at: Instant,
    /// Whether `X-Forwarded-For` is trusted for the client address
    pub trust_proxy_headers: bool,
}

impl AppState {
    /// Wire up the services. Fails if no JWT secret is configured.
    pub fn new(db: Arc<Database>, config: &KeyhouseConfig) -> LicenseResult<Self> {
        let tokens = TokenIssuer::from_config(&config.auth)?;
        let hasher = PasswordHashing::new(HashParams::from(&config.auth));

        Ok(Self {
            licenses: LicenseService::new(db.clone()),
            accounts: AccountService::new(db.clone(), hasher),
            tokens: Arc::new(tokens),
            db,
            started_at: Instant::now(),
            trust_proxy_headers: config.server.trust_proxy_headers,
        })
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub key: String,
    pub product: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(alias = "passwordRepeat")]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for creating a license. Omit `key` to have one generated.
#[derive(Debug, Deserialize)]
pub struct CreateLicenseRequest {
    pub key: Option<String>,
    pub product: String,
    pub owner_email: String,
    pub owner_name: String,
    /// Expiration date (ISO 8601, e.g. "2025-12-31T23:59:59Z" or "2025-12-31")
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListLicensesQuery {
    pub product: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub limit: Option<u32>,
}

/// Public view of an account. The password hash is never part of it.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            email: account.email,
            created_at: account.created_at.and_utc(),
            last_login: account.last_login.map(|t| t.and_utc()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub account: AccountResponse,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountResponse,
}

#[derive(Debug, Serialize)]
pub struct LicenseResponse {
    pub id: i64,
    pub key: String,
    pub product: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub owner_email: String,
    pub owner_name: String,
    pub is_activated: bool,
    pub created_at: DateTime<Utc>,
}

impl From<License> for LicenseResponse {
    fn from(license: License) -> Self {
        Self {
            id: license.id,
            key: license.key,
            product: license.product,
            expires_at: license.expires_at.map(|t| t.and_utc()),
            owner_email: license.owner_email,
            owner_name: license.owner_name,
            is_activated: license.is_activated,
            created_at: license.created_at.and_utc(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListLicensesResponse {
    pub product: String,
    pub total: usize,
    pub licenses: Vec<LicenseResponse>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub id: i64,
    pub action: String,
    pub license_key: String,
    pub product: String,
    pub changed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<AuditLogEntry> for AuditLogResponse {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            id: entry.id,
            action: entry.action,
            license_key: entry.license_key,
            product: entry.product,
            changed_at: entry.changed_at.and_utc(),
            details: entry.details,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteLicenseResponse {
    pub deleted: bool,
    pub key: String,
    pub product: String,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_request(rejection.body_text()))
}

/// Client address for login bookkeeping.
///
/// The header is client-controlled, so the first `X-Forwarded-For` hop is
/// only used when `trust_proxy_headers` is set; otherwise the socket peer.
fn client_ip(
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    trust_proxy_headers: bool,
) -> Option<String> {
    let forwarded = if trust_proxy_headers {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    } else {
        None
    };

    forwarded.or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /api/ping`
pub async fn ping_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.db.ping().await;
    Json(HealthResponse::new(
        connected,
        state.db.backend_name(),
        state.started_at.elapsed().as_secs(),
    ))
}

/// `POST /api/auth/register`
pub async fn register_handler(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let req = json_body(payload)?;
    validate_length(req.username.trim(), 1, MAX_USERNAME_LENGTH, "username")?;

    let account = state
        .accounts
        .register(Registration {
            username: req.username,
            email: req.email,
            password: req.password,
            password_confirm: req.password_confirm,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "registration successful".to_string(),
            account: account.into(),
        }),
    ))
}

/// `POST /api/auth/login`
pub async fn login_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let req = json_body(payload)?;
    let ip = client_ip(&headers, peer, state.trust_proxy_headers);

    let account = state.accounts.login(&req.email, req.password, ip).await?;
    let issued = state.tokens.issue(account.id)?;

    Ok(Json(LoginResponse {
        message: "login successful".to_string(),
        token: issued.token,
        expires_at: issued.expires_at,
        account: account.into(),
    }))
}

/// `GET /api/auth/me`
pub async fn me_handler(
    State(state): State<AppState>,
    auth: AuthenticatedAccount,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.accounts.get_account(auth.account_id).await?;
    Ok(Json(account.into()))
}

/// `POST /license/verify`
pub async fn verify_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let req = json_body(payload)?;
    let verification = state.licenses.verify(&req.key, &req.product).await?;
    Ok(Json(verification.into()))
}

/// `GET /license/audit-logs?limit=N`
pub async fn audit_logs_handler(
    State(state): State<AppState>,
    _auth: AuthenticatedAccount,
    query: Result<Query<AuditLogQuery>, QueryRejection>,
) -> Result<Json<Vec<AuditLogResponse>>, ApiError> {
    let Query(query) = query.map_err(|r| ApiError::invalid_request(r.body_text()))?;
    let limit = validate_limit(query.limit, DEFAULT_AUDIT_LIMIT, MAX_AUDIT_LIMIT, "limit")?;

    let entries = state.licenses.get_audit_logs(limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// `POST /api/licenses`
pub async fn create_license_handler(
    State(state): State<AppState>,
    auth: AuthenticatedAccount,
    payload: Result<Json<CreateLicenseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LicenseResponse>), ApiError> {
    let req = json_body(payload)?;
    validate_not_empty(&req.product, "product")?;
    validate_not_empty(&req.owner_name, "owner_name")?;
    validate_length(&req.product, 1, MAX_NAME_LENGTH, "product")?;
    validate_length(&req.owner_name, 1, MAX_NAME_LENGTH, "owner_name")?;

    let expires_at = req
        .expires_at
        .as_deref()
        .map(|s| parse_datetime(s, "expires_at"))
        .transpose()?;

    let license = state
        .licenses
        .add_license(NewLicense {
            key: resolve_license_key(req.key.as_deref()),
            product: req.product,
            owner_email: req.owner_email,
            owner_name: req.owner_name,
            expires_at,
        })
        .await?;

    info!(
        account_id = auth.account_id,
        license_key = %license.key,
        product = %license.product,
        "license created"
    );

    Ok((StatusCode::CREATED, Json(license.into())))
}

/// `GET /api/licenses?product=P`
pub async fn list_licenses_handler(
    State(state): State<AppState>,
    _auth: AuthenticatedAccount,
    query: Result<Query<ListLicensesQuery>, QueryRejection>,
) -> Result<Json<ListLicensesResponse>, ApiError> {
    let Query(query) = query.map_err(|r| ApiError::invalid_request(r.body_text()))?;
    validate_not_empty(&query.product, "product")?;

    let licenses = state.licenses.list_licenses(&query.product).await?;
    Ok(Json(ListLicensesResponse {
        product: query.product,
        total: licenses.len(),
        licenses: licenses.into_iter().map(Into::into).collect(),
    }))
}

/// `GET /api/licenses/:product/:key`
pub async fn get_license_handler(
    State(state): State<AppState>,
    _auth: AuthenticatedAccount,
    Path((product, key)): Path<(String, String)>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let license = state.licenses.get_license(&key, &product).await?;
    Ok(Json(license.into()))
}

/// `DELETE /api/licenses/:product/:key`
pub async fn delete_license_handler(
    State(state): State<AppState>,
    auth: AuthenticatedAccount,
    Path((product, key)): Path<(String, String)>,
) -> Result<Json<DeleteLicenseResponse>, ApiError> {
    state.licenses.delete_license(&key, &product).await?;

    info!(
        account_id = auth.account_id,
        license_key = %key,
        product = %product,
        "license deleted"
    );

    Ok(Json(DeleteLicenseResponse {
        deleted: true,
        key,
        product,
    }))
}

/// Fallback for unknown routes.
pub async fn not_found_handler() -> ApiError {
    ApiError::not_found("route")
}
