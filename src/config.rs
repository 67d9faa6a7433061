//! Configuration for keyhouse.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `keyhouse.toml` file, or the file passed with `--config`
//! 3. Default values (lowest priority)
//!
//! The loaded [`KeyhouseConfig`] is built once at startup and handed to the
//! components that need it. There is no global configuration.
//!
//! # Environment Variables
//!
//! - `KEYHOUSE_SERVER_HOST` - Server bind address
//! - `KEYHOUSE_SERVER_PORT` - Server port
//! - `KEYHOUSE_TRUST_PROXY_HEADERS` - Read client addresses from `X-Forwarded-For`
//! - `KEYHOUSE_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `KEYHOUSE_DATABASE_URL` - Database connection URL (routed by scheme)
//! - `KEYHOUSE_DATABASE_MAX_CONNECTIONS` - Pool size
//! - `KEYHOUSE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `KEYHOUSE_JWT_SECRET` - Secret for signing bearer tokens (required by `serve`)
//! - `KEYHOUSE_JWT_ISSUER` - JWT issuer claim
//! - `KEYHOUSE_JWT_AUDIENCE` - JWT audience claim
//! - `KEYHOUSE_TOKEN_EXPIRATION_SECS` - Token lifetime in seconds
//! - `KEYHOUSE_RATE_LIMIT_ENABLED` - Enable per-IP rate limiting

use std::env;
use std::path::Path;

use config::Config;
use serde::Deserialize;

use crate::errors::{LicenseError, LicenseResult};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "keyhouse";

/// Upper bound for `auth.token_expiration_secs` (one year).
pub const MAX_TOKEN_EXPIRATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeyhouseConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Take the client address from `X-Forwarded-For`. Only enable this
    /// behind a reverse proxy that overwrites the header.
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            trust_proxy_headers: false,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://keyhouse.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/keyhouse".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Bearer token and password hashing configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JWT secret key (use `env:VAR_NAME` to read from another variable)
    pub jwt_secret: String,
    /// JWT issuer claim (iss)
    pub jwt_issuer: String,
    /// JWT audience claim (aud)
    pub jwt_audience: String,
    /// Token lifetime in seconds (default: 24 hours)
    pub token_expiration_secs: u64,
    /// Argon2 memory cost in KiB
    pub password_memory_kib: u32,
    /// Argon2 iterations
    pub password_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "keyhouse".to_string(),
            jwt_audience: "keyhouse-api".to_string(),
            token_expiration_secs: 24 * 60 * 60,
            password_memory_kib: 19 * 1024,
            password_iterations: 3,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secret = if self.jwt_secret.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &secret)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("token_expiration_secs", &self.token_expiration_secs)
            .field("password_memory_kib", &self.password_memory_kib)
            .field("password_iterations", &self.password_iterations)
            .finish()
    }
}

/// Per-IP rate limiting (only effective with the `rate-limiting` feature).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// `/license/verify`: requests per minute
    pub verify_rpm: u64,
    /// `/api/auth/*`: requests per minute
    pub auth_rpm: u64,
    /// Allowed burst above the steady rate
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verify_rpm: 120,
            auth_rpm: 10,
            burst_size: 5,
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl KeyhouseConfig {
    /// Load configuration from `path`, or from `keyhouse.toml` in the working
    /// directory when `path` is `None`, then apply environment overrides.
    ///
    /// An explicit path must exist; the default file is optional. The result
    /// is validated before it is returned.
    pub fn load_from(path: Option<&Path>) -> LicenseResult<Self> {
        let defaults = KeyhouseConfig::default();

        let file_source = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host.as_str())
            .map_err(config_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_err)?
            .set_default(
                "server.trust_proxy_headers",
                defaults.server.trust_proxy_headers,
            )
            .map_err(config_err)?
            .set_default("database.db_type", defaults.database.db_type.as_str())
            .map_err(config_err)?
            .set_default("database.sqlite_url", defaults.database.sqlite_url.as_str())
            .map_err(config_err)?
            .set_default(
                "database.postgres_url",
                defaults.database.postgres_url.as_str(),
            )
            .map_err(config_err)?
            .set_default(
                "database.max_connections",
                i64::from(defaults.database.max_connections),
            )
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level.as_str())
            .map_err(config_err)?
            .set_default("auth.jwt_secret", "")
            .map_err(config_err)?
            .set_default("auth.jwt_issuer", defaults.auth.jwt_issuer.as_str())
            .map_err(config_err)?
            .set_default("auth.jwt_audience", defaults.auth.jwt_audience.as_str())
            .map_err(config_err)?
            .set_default(
                "auth.token_expiration_secs",
                defaults.auth.token_expiration_secs as i64,
            )
            .map_err(config_err)?
            .set_default(
                "auth.password_memory_kib",
                i64::from(defaults.auth.password_memory_kib),
            )
            .map_err(config_err)?
            .set_default(
                "auth.password_iterations",
                i64::from(defaults.auth.password_iterations),
            )
            .map_err(config_err)?
            .set_default("rate_limit.enabled", defaults.rate_limit.enabled)
            .map_err(config_err)?
            .set_default("rate_limit.verify_rpm", defaults.rate_limit.verify_rpm as i64)
            .map_err(config_err)?
            .set_default("rate_limit.auth_rpm", defaults.rate_limit.auth_rpm as i64)
            .map_err(config_err)?
            .set_default(
                "rate_limit.burst_size",
                i64::from(defaults.rate_limit.burst_size),
            )
            .map_err(config_err)?
            .add_source(file_source)
            // Override with environment variables
            .set_override_option("server.host", env::var("KEYHOUSE_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option("server.port", env_parsed::<i64>("KEYHOUSE_SERVER_PORT"))
            .map_err(config_err)?
            .set_override_option(
                "server.trust_proxy_headers",
                env_parsed::<bool>("KEYHOUSE_TRUST_PROXY_HEADERS"),
            )
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("KEYHOUSE_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.sqlite_url",
                env::var("KEYHOUSE_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.postgres_url",
                env::var("KEYHOUSE_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.max_connections",
                env_parsed::<i64>("KEYHOUSE_DATABASE_MAX_CONNECTIONS"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("KEYHOUSE_LOG_LEVEL").ok())
            .map_err(config_err)?
            .set_override_option("auth.jwt_secret", env::var("KEYHOUSE_JWT_SECRET").ok())
            .map_err(config_err)?
            .set_override_option("auth.jwt_issuer", env::var("KEYHOUSE_JWT_ISSUER").ok())
            .map_err(config_err)?
            .set_override_option("auth.jwt_audience", env::var("KEYHOUSE_JWT_AUDIENCE").ok())
            .map_err(config_err)?
            .set_override_option(
                "auth.token_expiration_secs",
                env_parsed::<i64>("KEYHOUSE_TOKEN_EXPIRATION_SECS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "rate_limit.enabled",
                env_parsed::<bool>("KEYHOUSE_RATE_LIMIT_ENABLED"),
            )
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        let config: KeyhouseConfig = settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// The JWT secret is not checked here: only `serve` needs it, and the
    /// token issuer refuses to build without one.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(LicenseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if self.auth.token_expiration_secs == 0
            || self.auth.token_expiration_secs > MAX_TOKEN_EXPIRATION_SECS
        {
            return Err(LicenseError::ConfigError(format!(
                "auth.token_expiration_secs must be between 1 and {MAX_TOKEN_EXPIRATION_SECS}"
            )));
        }
        if self.auth.password_iterations == 0 || self.auth.password_memory_kib < 8 {
            return Err(LicenseError::ConfigError(
                "auth.password_iterations must be > 0 and auth.password_memory_kib >= 8"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl AuthConfig {
    /// Resolve the signing secret, following an `env:VAR` indirection.
    pub fn resolve_jwt_secret(&self) -> LicenseResult<String> {
        if self.jwt_secret.is_empty() {
            return Err(LicenseError::ConfigError(
                "auth.jwt_secret is required (set KEYHOUSE_JWT_SECRET)".to_string(),
            ));
        }

        let secret = match self.jwt_secret.strip_prefix("env:") {
            Some(var) => env::var(var).map_err(|_| {
                LicenseError::ConfigError(format!(
                    "environment variable '{var}' not found for auth.jwt_secret"
                ))
            })?,
            None => self.jwt_secret.clone(),
        };

        if secret.is_empty() {
            return Err(LicenseError::ConfigError(
                "auth.jwt_secret resolved to an empty value".to_string(),
            ));
        }
        Ok(secret)
    }
}
