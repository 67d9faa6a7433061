use axum::{
    middleware,
    routing::{get, post},
    Router,
};

#[cfg(not(feature = "rate-limiting"))]
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::errors::LicenseResult;
use crate::server::handlers::{
    audit_logs_handler, create_license_handler, delete_license_handler, get_license_handler,
    list_licenses_handler, login_handler, me_handler, not_found_handler, ping_handler,
    register_handler, verify_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

#[cfg(feature = "rate-limiting")]
use crate::server::rate_limit::{create_rate_limiter, RateLimitType};

/// Build the application router.
///
/// # Routes
///
/// ## Public
/// - `GET /api/ping` - Health check
/// - `POST /api/auth/register` - Create an account
/// - `POST /api/auth/login` - Exchange credentials for a bearer token
/// - `POST /license/verify` - Check a key for a product
///
/// ## Bearer token required
/// - `GET /api/auth/me` - The authenticated account
/// - `GET /license/audit-logs?limit=N` - Recent audit entries
/// - `POST /api/licenses` - Create a license
/// - `GET /api/licenses?product=P` - List licenses for a product
/// - `GET /api/licenses/:product/:key` - Get a license
/// - `DELETE /api/licenses/:product/:key` - Delete a license
pub fn build_router(state: AppState, rate_limit: &RateLimitConfig) -> LicenseResult<Router> {
    let verify_routes = Router::new().route("/license/verify", post(verify_handler));
    let auth_routes = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler));

    #[cfg(feature = "rate-limiting")]
    let (verify_routes, auth_routes) = if rate_limit.enabled {
        (
            verify_routes.layer(create_rate_limiter(rate_limit, RateLimitType::Verify)?),
            auth_routes.layer(create_rate_limiter(rate_limit, RateLimitType::Auth)?),
        )
    } else {
        (verify_routes, auth_routes)
    };

    #[cfg(not(feature = "rate-limiting"))]
    if rate_limit.enabled {
        warn!("rate_limit.enabled is set but keyhouse was built without the 'rate-limiting' feature");
    }

    let router = Router::new()
        .route("/api/ping", get(ping_handler))
        .route("/api/auth/me", get(me_handler))
        .route("/license/audit-logs", get(audit_logs_handler))
        .route(
            "/api/licenses",
            post(create_license_handler).get(list_licenses_handler),
        )
        .route(
            "/api/licenses/:product/:key",
            get(get_license_handler).delete(delete_license_handler),
        )
        .merge(verify_routes)
        .merge(auth_routes)
        .fallback(not_found_handler)
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state);

    Ok(router)
}
