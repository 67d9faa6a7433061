//! Per-IP rate limiting for the public endpoints.
//!
//! Only compiled with the `rate-limiting` feature, and only applied when
//! `rate_limit.enabled` is set.
//!
//! # Configuration
//!
//! ```toml
//! [rate_limit]
//! enabled = true
//! verify_rpm = 120   # /license/verify: 120 requests per minute
//! auth_rpm = 10      # /api/auth/register and /api/auth/login
//! burst_size = 5     # Allow short bursts above the limit
//! ```
//!
//! Rejected requests get `429 Too Many Requests`. The server must be run
//! with `into_make_service_with_connect_info::<SocketAddr>()` so the peer
//! address is available when no forwarding header is present.

use governor::middleware::NoOpMiddleware;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;

pub use tower_governor::key_extractor::SmartIpKeyExtractor;
pub use tower_governor::GovernorLayer;

use crate::config::RateLimitConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Rate limiter types for different endpoint categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitType {
    /// `/license/verify`
    Verify,
    /// `/api/auth/*`
    Auth,
}

/// Replenish interval in milliseconds for a requests-per-minute budget.
fn interval_ms(rpm: u64) -> u64 {
    if rpm > 0 {
        (60_000 / rpm).max(1)
    } else {
        60_000
    }
}

/// Create a rate limiting layer for the given endpoint category.
pub fn create_rate_limiter(
    config: &RateLimitConfig,
    limit_type: RateLimitType,
) -> LicenseResult<GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware>> {
    let rpm = match limit_type {
        RateLimitType::Verify => config.verify_rpm,
        RateLimitType::Auth => config.auth_rpm,
    };

    let governor_config = GovernorConfigBuilder::default()
        .per_millisecond(interval_ms(rpm))
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| {
            LicenseError::ConfigError(
                "rate_limit.burst_size and request rates must be greater than 0".to_string(),
            )
        })?;

    Ok(GovernorLayer {
        config: Arc::new(governor_config),
    })
}
