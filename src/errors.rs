//! Error type shared by the services, the persistence layer and the CLI.
//!
//! Validation failures, missing records and duplicates are ordinary outcomes
//! that callers match on. `PersistenceFailure` wraps whatever the storage
//! engine reported; its detail is for server-side logs only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LicenseError {
    /// Key does not match `XXXX-XXXX-XXXX-XXXX` (uppercase alphanumeric)
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// Any other malformed input (blank product, bad timestamp, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("license {key} already exists for product {product}")]
    DuplicateKey { key: String, product: String },

    #[error("not found")]
    NotFound,

    #[error("password and confirmation do not match")]
    PasswordMismatch,

    #[error("an account with this username or email already exists")]
    DuplicateAccount,

    /// Returned for unknown emails and wrong passwords alike.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Returned for every token rejection, whatever check failed.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type LicenseResult<T> = Result<T, LicenseError>;

impl LicenseError {
    /// True for the kinds that indicate a server-side fault rather than a
    /// problem with the caller's input.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            LicenseError::PersistenceFailure(_)
                | LicenseError::ConfigError(_)
                | LicenseError::Internal(_)
        )
    }
}
