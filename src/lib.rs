//! keyhouse - license key issuing, verification and audit service
//!
//! Licenses are random `XXXX-XXXX-XXXX-XXXX` keys bound to a product and an
//! owner. Every change is recorded in an append-only audit log in the same
//! transaction as the change itself. Accounts register with a password and
//! log in for a bearer token that unlocks the management endpoints.
//!
//! The same services back two front ends: an HTTP API (`keyhouse serve`)
//! and the `add`/`delete`/`list`/`logs` subcommands of the CLI.
//!
//! # Features
//!
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//! - `rate-limiting` - Per-IP rate limiting on verify and auth endpoints.
//!
//! ```toml
//! # Server with PostgreSQL
//! keyhouse = { version = "0.1", default-features = false, features = ["postgres"] }
//! ```

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("keyhouse needs at least one database backend: enable 'sqlite' or 'postgres'");

pub mod cli;
pub mod config;
pub mod errors;
pub mod license_key;
pub mod server;

pub use config::KeyhouseConfig;
pub use errors::{LicenseError, LicenseResult};
