//! Uniform JSON error responses for every keyhouse endpoint.
//!
//! # Response Format
//!
//! ```json
//! {
//!   "error": {
//!     "code": "DUPLICATE_KEY",
//!     "message": "license ABCD-1234-EFGH-5678 already exists for product Demo"
//!   }
//! }
//! ```
//!
//! Server-side failures carry a generic message; their detail only goes to
//! the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::LicenseError;
use crate::server::validation::ValidationError;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Validation Errors (400) ===
    InvalidKeyFormat,
    InvalidEmail,
    /// Request payload is invalid or malformed
    InvalidRequest,
    PasswordMismatch,

    // === Authentication Errors (401) ===
    /// Unknown email or wrong password
    InvalidCredentials,
    InvalidToken,
    MissingToken,

    // === Resource Errors (404/409) ===
    NotFound,
    DuplicateKey,
    DuplicateAccount,

    // === Server Errors (5xx) ===
    PersistenceFailure,
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidKeyFormat
            | ErrorCode::InvalidEmail
            | ErrorCode::InvalidRequest
            | ErrorCode::PasswordMismatch => StatusCode::BAD_REQUEST,

            ErrorCode::InvalidCredentials | ErrorCode::InvalidToken | ErrorCode::MissingToken => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::NotFound => StatusCode::NOT_FOUND,

            ErrorCode::DuplicateKey | ErrorCode::DuplicateAccount => StatusCode::CONFLICT,

            ErrorCode::PersistenceFailure | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidKeyFormat => "License key format is invalid",
            ErrorCode::InvalidEmail => "Email address is invalid",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::PasswordMismatch => "Password and confirmation do not match",
            ErrorCode::InvalidCredentials => "Invalid email or password",
            ErrorCode::InvalidToken => "Authentication token is invalid or expired",
            ErrorCode::MissingToken => "Authentication token is required",
            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::DuplicateKey => "License already exists for this product",
            ErrorCode::DuplicateAccount => "An account with this username or email already exists",
            ErrorCode::PersistenceFailure => "A storage error occurred",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    /// Additional context such as the offending field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

impl ApiError {
    /// Creates an error carrying the code's default message.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    pub fn not_found(resource: &str) -> Self {
        Self::with_message(ErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn missing_token() -> Self {
        Self::new(ErrorCode::MissingToken)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error.code, self.error.message)
    }
}

impl std::error::Error for ApiError {}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        if err.is_server_fault() {
            error!("request failed: {err}");
        }

        match err {
            LicenseError::InvalidKeyFormat(_) => {
                ApiError::with_message(ErrorCode::InvalidKeyFormat, err.to_string())
            }
            LicenseError::InvalidEmail(_) => {
                ApiError::with_message(ErrorCode::InvalidEmail, err.to_string())
            }
            LicenseError::InvalidInput(msg) => ApiError::invalid_request(msg),
            LicenseError::DuplicateKey { .. } => {
                ApiError::with_message(ErrorCode::DuplicateKey, err.to_string())
            }
            LicenseError::NotFound => ApiError::new(ErrorCode::NotFound),
            LicenseError::PasswordMismatch => ApiError::new(ErrorCode::PasswordMismatch),
            LicenseError::DuplicateAccount => ApiError::new(ErrorCode::DuplicateAccount),
            LicenseError::InvalidCredentials => ApiError::new(ErrorCode::InvalidCredentials),
            LicenseError::InvalidToken => ApiError::new(ErrorCode::InvalidToken),
            LicenseError::PersistenceFailure(_) => ApiError::new(ErrorCode::PersistenceFailure),
            LicenseError::ConfigError(_) | LicenseError::Internal(_) => {
                ApiError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_request(err.to_string())
            .details(serde_json::json!({ "field": err.field }))
    }
}
