//! Password hashing with Argon2id.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$m=...`), so the salt and
//! cost parameters travel with the hash and old hashes keep verifying after
//! the configured cost changes.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::AuthConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Time cost (iterations).
    pub iterations: u32,
    /// Parallelism factor.
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl From<&AuthConfig> for HashParams {
    fn from(config: &AuthConfig) -> Self {
        Self {
            memory_kib: config.password_memory_kib,
            iterations: config.password_iterations,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies account passwords.
///
/// The work is CPU-bound, so the async entry points move it onto the
/// blocking thread pool.
#[derive(Debug, Clone)]
pub struct PasswordHashing {
    params: HashParams,
}

impl PasswordHashing {
    pub fn new(params: HashParams) -> Self {
        Self { params }
    }

    fn argon2(&self) -> LicenseResult<Argon2<'static>> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            None,
        )
        .map_err(|e| LicenseError::Internal(format!("invalid hash parameters: {e}")))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash `password` with a fresh random salt, returning a PHC string.
    pub fn hash_blocking(&self, password: &str) -> LicenseResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| LicenseError::Internal(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Check `password` against a stored PHC string.
    ///
    /// A malformed stored hash counts as a mismatch.
    pub fn verify_blocking(&self, password: &str, stored: &str) -> LicenseResult<bool> {
        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(_) => return Ok(false),
        };
        Ok(self
            .argon2()?
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    pub async fn hash(&self, password: String) -> LicenseResult<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&password))
            .await
            .map_err(|e| LicenseError::Internal(format!("hashing task failed: {e}")))?
    }

    pub async fn verify(&self, password: String, stored: String) -> LicenseResult<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_blocking(&password, &stored))
            .await
            .map_err(|e| LicenseError::Internal(format!("verification task failed: {e}")))?
    }

    /// Burn the same work as a real verification. Used when the account
    /// does not exist so that both login failures take equally long.
    pub async fn waste_verification(&self, password: String) -> LicenseResult<()> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&password).map(|_| ()))
            .await
            .map_err(|e| LicenseError::Internal(format!("hashing task failed: {e}")))?
    }
}
