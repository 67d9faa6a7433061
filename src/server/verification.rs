//! License verification.
//!
//! The decision is a pure function of the stored license (if any) and the
//! current time, so it can be exercised without a database or a clock.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::server::database::License;

pub const REASON_NOT_FOUND: &str = "not found";
pub const REASON_EXPIRED: &str = "expired";

/// Outcome of checking a (key, product) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(License),
    NotFound,
    Expired(License),
}

impl Verification {
    /// Decide validity. A license is expired only once `now` is strictly
    /// past its expiry; a license without expiry never expires.
    pub fn evaluate(license: Option<License>, now: NaiveDateTime) -> Self {
        match license {
            None => Verification::NotFound,
            Some(license) => match license.expires_at {
                Some(expires_at) if now > expires_at => Verification::Expired(license),
                _ => Verification::Valid(license),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    /// Reason string for a failed verification.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Verification::Valid(_) => None,
            Verification::NotFound => Some(REASON_NOT_FOUND),
            Verification::Expired(_) => Some(REASON_EXPIRED),
        }
    }
}

/// JSON body returned by `POST /license/verify`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum VerifyResponse {
    Valid {
        valid: bool,
        key: String,
        product: String,
        expires_at: Option<DateTime<Utc>>,
        owner_email: String,
        owner_name: String,
        is_activated: bool,
    },
    Invalid {
        valid: bool,
        reason: String,
    },
}

impl From<Verification> for VerifyResponse {
    fn from(verification: Verification) -> Self {
        match verification {
            Verification::Valid(license) => VerifyResponse::Valid {
                valid: true,
                key: license.key,
                product: license.product,
                expires_at: license.expires_at.map(|t| t.and_utc()),
                owner_email: license.owner_email,
                owner_name: license.owner_name,
                is_activated: license.is_activated,
            },
            other => VerifyResponse::Invalid {
                valid: false,
                reason: other.reason().unwrap_or(REASON_NOT_FOUND).to_string(),
            },
        }
    }
}
