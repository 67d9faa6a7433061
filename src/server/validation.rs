//! Request validation helpers for the HTTP layer.
//!
//! Domain rules (key format, email shape) live in [`crate::license_key`];
//! the checks here cover request fields and query parameters.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = Result<T, ValidationError>;

fn invalid(field_name: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field_name.to_string(),
        message: message.into(),
    }
}

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use keyhouse::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "name").is_ok());
/// assert!(validate_not_empty("   ", "name").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(invalid(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate string length (in characters) is within bounds.
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    let len = value.chars().count();
    if len < min {
        Err(invalid(field_name, format!("must be at least {} characters", min)))
    } else if len > max {
        Err(invalid(field_name, format!("must be at most {} characters", max)))
    } else {
        Ok(())
    }
}

/// Resolve an optional page size, applying `default` and rejecting values
/// outside `1..=max`.
pub fn validate_limit(
    value: Option<u32>,
    default: u32,
    max: u32,
    field_name: &str,
) -> ValidationResult<u32> {
    match value {
        None => Ok(default),
        Some(n) if (1..=max).contains(&n) => Ok(n),
        Some(_) => Err(invalid(field_name, format!("must be between 1 and {max}"))),
    }
}

/// Parse a timestamp, interpreting values without an offset as UTC.
///
/// Accepts formats:
/// - RFC 3339: `2025-12-31T23:59:59Z`
/// - Date only: `2025-12-31` (midnight UTC)
/// - Without timezone: `2025-12-31T23:59:59`
pub fn parse_datetime(value: &str, field_name: &str) -> ValidationResult<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }

    if let Some(dt) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(dt);
    }

    Err(invalid(
        field_name,
        "invalid datetime format (expected: ISO 8601, e.g., '2025-12-31T23:59:59Z' or '2025-12-31')",
    ))
}
