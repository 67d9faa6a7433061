//! Bearer token authentication for protected routes.
//!
//! # Usage
//!
//! ```rust,ignore
//! use keyhouse::server::auth::AuthenticatedAccount;
//!
//! async fn protected_handler(auth: AuthenticatedAccount) -> String {
//!     format!("Hello, account {}!", auth.account_id)
//! }
//! ```
//!
//! A missing `Authorization` header is answered with `MISSING_TOKEN`; any
//! other problem (wrong scheme, bad signature, expiry) with `INVALID_TOKEN`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::errors::LicenseError;
use crate::server::api_error::ApiError;
use crate::server::handlers::AppState;

/// The account a request was authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedAccount {
    pub account_id: i64,
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(ApiError::missing_token)?
        .to_str()
        .map_err(|_| ApiError::from(LicenseError::InvalidToken))?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::from(LicenseError::InvalidToken))?;

    Ok(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedAccount {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let account_id = state.tokens.verify(token)?;
        Ok(AuthenticatedAccount { account_id })
    }
}
