//! License key generation and format checks.
//!
//! Keys are four groups of four uppercase alphanumeric characters separated
//! by dashes, e.g. `ABCD-1234-EFGH-5678`. Generated keys draw every character
//! uniformly from `A-Z0-9` using the thread-local CSPRNG.
//!
//! # Example
//!
//! ```rust
//! use keyhouse::license_key::{generate_license_key, is_valid_license_key};
//!
//! let key = generate_license_key();
//! assert!(is_valid_license_key(&key));
//! ```

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

use crate::errors::{LicenseError, LicenseResult};

/// Character set for generated keys.
const LICENSE_KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const SEGMENTS: usize = 4;
const SEGMENT_LENGTH: usize = 4;

/// Placeholder accepted by the CLI in place of a key to request a generated one.
pub const RANDOM_KEY_PLACEHOLDER: &str = "random";

static KEY_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}$").ok());

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").ok());

fn generate_segment(rng: &mut impl Rng) -> String {
    (0..SEGMENT_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..LICENSE_KEY_CHARSET.len());
            LICENSE_KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a new random license key in `XXXX-XXXX-XXXX-XXXX` form.
pub fn generate_license_key() -> String {
    let mut rng = rand::rng();
    let segments: Vec<String> = (0..SEGMENTS).map(|_| generate_segment(&mut rng)).collect();
    segments.join("-")
}

/// True if `key` matches the grouped key format exactly.
pub fn is_valid_license_key(key: &str) -> bool {
    KEY_PATTERN.as_ref().is_some_and(|re| re.is_match(key))
}

/// True if `email` has the `local@domain.tld` shape.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.as_ref().is_some_and(|re| re.is_match(email))
}

/// Check a license key, returning `InvalidKeyFormat` on mismatch.
pub fn validate_license_key(key: &str) -> LicenseResult<()> {
    if is_valid_license_key(key) {
        Ok(())
    } else {
        Err(LicenseError::InvalidKeyFormat(format!(
            "'{key}' (expected XXXX-XXXX-XXXX-XXXX, uppercase letters and digits)"
        )))
    }
}

/// Check an owner or account email, returning `InvalidEmail` on mismatch.
pub fn validate_email(email: &str) -> LicenseResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(LicenseError::InvalidEmail(format!("'{email}'")))
    }
}

/// Resolve a user-supplied key: `None`, empty or `random` yields a fresh key.
pub fn resolve_license_key(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        None | Some("") => generate_license_key(),
        Some(k) if k.eq_ignore_ascii_case(RANDOM_KEY_PLACEHOLDER) => generate_license_key(),
        Some(k) => k.to_string(),
    }
}
