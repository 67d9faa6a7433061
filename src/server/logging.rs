//! Structured logging for keyhouse.
//!
//! - subscriber setup ([`init_tracing`])
//! - license events in a `license_event` span
//! - per-request span with an `X-Request-Id` response header
//! - the health check body served by `/api/ping`

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `level` when set. Logs go to stderr so CLI tables on
/// stdout stay clean. Calling this twice leaves the first subscriber in place.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// License lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    Added,
    Deleted,
    Verified,
    VerificationFailed,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Added => "added",
            LicenseEvent::Deleted => "deleted",
            LicenseEvent::Verified => "verified",
            LicenseEvent::VerificationFailed => "verification_failed",
        };
        write!(f, "{}", s)
    }
}

/// Log a license event for `key` under `product`.
///
/// Failed verifications are logged at `warn` with the reason.
pub fn log_license_event(event: LicenseEvent, key: &str, product: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %key,
        product = %product,
    );
    let _enter = span.enter();

    match (event, details) {
        (LicenseEvent::VerificationFailed, Some(d)) => warn!(reason = %d, "License event occurred"),
        (LicenseEvent::VerificationFailed, None) => warn!("License event occurred"),
        (_, Some(d)) => info!(details = %d, "License event occurred"),
        (_, None) => info!("License event occurred"),
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logs method, path, status and duration of every request and tags the
/// response with its request ID.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let duration = start.elapsed();

    let _enter = span.enter();
    info!(
        status = %response.status().as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" when the database is unreachable
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
    pub database: DatabaseHealth,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    /// sqlite or postgres
    pub db_type: String,
}

impl HealthResponse {
    pub fn new(db_connected: bool, db_type: &str, uptime_secs: u64) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: "keyhouse".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            timestamp: Utc::now(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            },
        }
    }
}
