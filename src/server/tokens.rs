//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs whose subject is the account id. Every rejection
//! (bad signature, expired, wrong issuer or audience, malformed subject)
//! surfaces as the same `InvalidToken` error.
//!
//! # Configuration
//!
//! - `KEYHOUSE_JWT_SECRET` - Required secret key for HS256 signing
//! - `KEYHOUSE_JWT_ISSUER` - Issuer claim (default: "keyhouse")
//! - `KEYHOUSE_JWT_AUDIENCE` - Audience claim (default: "keyhouse-api")

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::errors::{LicenseError, LicenseResult};

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Account id, as a decimal string
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

/// A freshly signed token and the moment it stops being accepted.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and checks bearer tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    expiration_secs: u64,
}

impl TokenIssuer {
    /// Build the issuer from auth configuration.
    ///
    /// Fails with `ConfigError` if no secret is configured.
    pub fn from_config(config: &AuthConfig) -> LicenseResult<Self> {
        let secret = config.resolve_jwt_secret()?;

        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_issuer(&[&config.jwt_issuer]);
        validation.set_audience(&[&config.jwt_audience]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        validation.validate_exp = true;
        validation.leeway = 0;

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiration_secs: config.token_expiration_secs,
        })
    }

    /// Sign a token for `account_id`.
    pub fn issue(&self, account_id: i64) -> LicenseResult<IssuedToken> {
        let now = Utc::now();
        let iat = u64::try_from(now.timestamp())
            .map_err(|e| LicenseError::Internal(format!("system time error: {e}")))?;
        let exp = iat
            .checked_add(self.expiration_secs)
            .ok_or_else(|| LicenseError::Internal("token expiry out of range".to_string()))?;

        let claims = Claims {
            sub: account_id.to_string(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| LicenseError::Internal(format!("failed to create token: {e}")))?;

        let expires_at = i64::try_from(exp)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .ok_or_else(|| LicenseError::Internal("token expiry out of range".to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Check a token and return the account id it was issued for.
    pub fn verify(&self, token: &str) -> LicenseResult<i64> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("token rejected: {e}");
            LicenseError::InvalidToken
        })?;

        data.claims.sub.parse::<i64>().map_err(|_| {
            debug!("token rejected: non-numeric subject");
            LicenseError::InvalidToken
        })
    }

}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration_secs", &self.expiration_secs)
            .finish()
    }
}
