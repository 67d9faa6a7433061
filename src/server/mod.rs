// src/server/mod.rs

//! Server-side components for keyhouse.
//!
//! This module contains:
//! - `database`     → DB abstraction over SQLite/Postgres, license and audit tables
//! - `accounts`     → account queries and the register/login service
//! - `password`     → Argon2id password hashing
//! - `licenses`     → license lifecycle service
//! - `verification` → pure license verification decision
//! - `tokens`       → JWT issuance and verification
//! - `auth`         → bearer token extractor for protected routes
//! - `handlers`     → Axum HTTP handlers and shared `AppState`
//! - `routes`       → Router builder
//! - `logging`      → tracing setup, request logging, health response
//! - `api_error`    → uniform JSON error body
//! - `validation`   → request field checks
//! - `rate_limit`   → per-IP rate limiting (requires `rate-limiting` feature)

pub mod accounts;
pub mod api_error;
pub mod auth;
pub mod database;
pub mod handlers;
pub mod licenses;
pub mod logging;
pub mod password;
pub mod routes;
pub mod tokens;
pub mod validation;
pub mod verification;

#[cfg(feature = "rate-limiting")]
pub mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::KeyhouseConfig;
use crate::errors::{LicenseError, LicenseResult};

pub use accounts::{Account, AccountService, Registration};
pub use api_error::{ApiError, ErrorCode};
pub use auth::AuthenticatedAccount;
pub use database::{AuditAction, AuditLogEntry, Database, License, NewLicense};
pub use handlers::AppState;
pub use licenses::LicenseService;
pub use password::{HashParams, PasswordHashing};
pub use routes::build_router;
pub use tokens::{Claims, IssuedToken, TokenIssuer};
pub use verification::{Verification, VerifyResponse};

/// Run the HTTP server until Ctrl-C.
///
/// Fails before binding if the JWT secret is missing.
pub async fn serve(config: &KeyhouseConfig, db: Arc<Database>) -> LicenseResult<()> {
    let state = AppState::new(db, config)?;
    let router = build_router(state, &config.rate_limit)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LicenseError::ConfigError(format!("failed to bind {addr}: {e}")))?;

    info!("keyhouse listening on http://{addr}");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| LicenseError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}
