use chrono::{NaiveDateTime, Utc};
use sqlx::{query, query_as, FromRow};
use tracing::{error, info};

#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[cfg(feature = "postgres")]
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DatabaseConfig;
use crate::errors::{LicenseError, LicenseResult};

/// A license row from the `licenses` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct License {
    pub id: i64,
    #[sqlx(rename = "license_key")]
    pub key: String,
    pub product: String,
    pub expires_at: Option<NaiveDateTime>,
    pub owner_email: String,
    pub owner_name: String,
    pub is_activated: bool,
    pub created_at: NaiveDateTime,
}

/// Fields supplied by the caller when creating a license.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub key: String,
    pub product: String,
    pub owner_email: String,
    pub owner_name: String,
    pub expires_at: Option<NaiveDateTime>,
}

/// The kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Add,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Add => "ADD",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the append-only `audit_log` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    /// `ADD` or `DELETE`
    pub action: String,
    pub license_key: String,
    pub product: String,
    pub changed_at: NaiveDateTime,
    pub details: Option<String>,
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        license_key TEXT NOT NULL,
        product TEXT NOT NULL,
        expires_at TEXT,
        owner_email TEXT NOT NULL,
        owner_name TEXT NOT NULL,
        is_activated BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (license_key, product)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        action TEXT NOT NULL,
        license_key TEXT NOT NULL,
        product TEXT NOT NULL,
        changed_at TEXT NOT NULL,
        details TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_login TEXT,
        last_login_ip TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_licenses_product ON licenses (product)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_changed_at ON audit_log (changed_at)",
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id BIGSERIAL PRIMARY KEY,
        license_key TEXT NOT NULL,
        product TEXT NOT NULL,
        expires_at TIMESTAMP,
        owner_email TEXT NOT NULL,
        owner_name TEXT NOT NULL,
        is_activated BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMP NOT NULL,
        UNIQUE (license_key, product)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id BIGSERIAL PRIMARY KEY,
        action TEXT NOT NULL,
        license_key TEXT NOT NULL,
        product TEXT NOT NULL,
        changed_at TIMESTAMP NOT NULL,
        details TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL,
        last_login TIMESTAMP,
        last_login_ip TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_licenses_product ON licenses (product)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_changed_at ON audit_log (changed_at)",
];

/// Log a storage failure and wrap it.
pub(crate) fn db_error(op: &str, e: sqlx::Error) -> LicenseError {
    error!(operation = op, "database error: {e}");
    LicenseError::PersistenceFailure(e)
}

/// Map an insert failure, turning a unique violation into `on_conflict`.
fn insert_error(op: &str, e: sqlx::Error, on_conflict: LicenseError) -> LicenseError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => on_conflict,
        _ => db_error(op, e),
    }
}

impl Database {
    /// Open a connection pool for the configured backend.
    pub async fn connect(config: &DatabaseConfig) -> LicenseResult<Self> {
        match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::PersistenceFailure(e)
                    })?;

                Ok(Database::SQLite(pool))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::PersistenceFailure(e)
                    })?;

                Ok(Database::Postgres(pool))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Connect and create the schema if it does not exist yet.
    pub async fn open(config: &DatabaseConfig) -> LicenseResult<Self> {
        let db = Self::connect(config).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Create the tables and indexes. Safe to run on every startup.
    pub async fn migrate(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| db_error("migrate", e))?;
                }
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                for statement in POSTGRES_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| db_error("migrate", e))?;
                }
            }
        }

        info!("database schema ready");
        Ok(())
    }

    /// Backend name as used in `database.db_type`.
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Round-trip a trivial query; used by the health endpoint.
    pub async fn ping(&self) -> bool {
        let result = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("SELECT 1").execute(pool).await.map(|_| ()),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query("SELECT 1").execute(pool).await.map(|_| ()),
        };
        result.is_ok()
    }

    /// Insert a license together with its `ADD` audit entry.
    ///
    /// Both rows are written in one transaction. A second license with the
    /// same (key, product) pair fails with `DuplicateKey` and leaves no
    /// audit entry behind.
    pub async fn insert_license_with_audit(&self, new: &NewLicense) -> LicenseResult<License> {
        let now = Utc::now().naive_utc();
        let details = format!("Owner: {} ({})", new.owner_name, new.owner_email);
        let duplicate = || LicenseError::DuplicateKey {
            key: new.key.clone(),
            product: new.product.clone(),
        };

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool.begin().await.map_err(|e| db_error("begin", e))?;

                let license = query_as::<_, License>(
                    r#"
                    INSERT INTO licenses
                        (license_key, product, expires_at, owner_email, owner_name, is_activated, created_at)
                    VALUES (?, ?, ?, ?, ?, 0, ?)
                    RETURNING *
                    "#,
                )
                .bind(&new.key)
                .bind(&new.product)
                .bind(new.expires_at)
                .bind(&new.owner_email)
                .bind(&new.owner_name)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| insert_error("insert_license", e, duplicate()))?;

                query(
                    "INSERT INTO audit_log (action, license_key, product, changed_at, details) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(AuditAction::Add.as_str())
                .bind(&new.key)
                .bind(&new.product)
                .bind(now)
                .bind(&details)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("insert_audit", e))?;

                tx.commit().await.map_err(|e| db_error("commit", e))?;
                Ok(license)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(|e| db_error("begin", e))?;

                let license = query_as::<_, License>(
                    r#"
                    INSERT INTO licenses
                        (license_key, product, expires_at, owner_email, owner_name, is_activated, created_at)
                    VALUES ($1, $2, $3, $4, $5, FALSE, $6)
                    RETURNING *
                    "#,
                )
                .bind(&new.key)
                .bind(&new.product)
                .bind(new.expires_at)
                .bind(&new.owner_email)
                .bind(&new.owner_name)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| insert_error("insert_license", e, duplicate()))?;

                query(
                    "INSERT INTO audit_log (action, license_key, product, changed_at, details) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(AuditAction::Add.as_str())
                .bind(&new.key)
                .bind(&new.product)
                .bind(now)
                .bind(&details)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("insert_audit", e))?;

                tx.commit().await.map_err(|e| db_error("commit", e))?;
                Ok(license)
            }
        }
    }

    /// Fetch a license by (key, product).
    pub async fn get_license(&self, key: &str, product: &str) -> LicenseResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, License>(
                    "SELECT * FROM licenses WHERE license_key = ? AND product = ?",
                )
                .bind(key)
                .bind(product)
                .fetch_optional(pool)
                .await
                .map_err(|e| db_error("get_license", e))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, License>(
                    "SELECT * FROM licenses WHERE license_key = $1 AND product = $2",
                )
                .bind(key)
                .bind(product)
                .fetch_optional(pool)
                .await
                .map_err(|e| db_error("get_license", e))
            }
        }
    }

    /// Delete a license and append a `DELETE` audit entry.
    ///
    /// Returns `NotFound` when nothing matched; in that case no audit entry
    /// is written. If the audit insert fails the delete is rolled back.
    pub async fn delete_license_with_audit(&self, key: &str, product: &str) -> LicenseResult<()> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool.begin().await.map_err(|e| db_error("begin", e))?;

                let result = query("DELETE FROM licenses WHERE license_key = ? AND product = ?")
                    .bind(key)
                    .bind(product)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_error("delete_license", e))?;

                if result.rows_affected() == 0 {
                    return Err(LicenseError::NotFound);
                }

                query(
                    "INSERT INTO audit_log (action, license_key, product, changed_at, details) VALUES (?, ?, ?, ?, NULL)",
                )
                .bind(AuditAction::Delete.as_str())
                .bind(key)
                .bind(product)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("insert_audit", e))?;

                tx.commit().await.map_err(|e| db_error("commit", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(|e| db_error("begin", e))?;

                let result = query("DELETE FROM licenses WHERE license_key = $1 AND product = $2")
                    .bind(key)
                    .bind(product)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_error("delete_license", e))?;

                if result.rows_affected() == 0 {
                    return Err(LicenseError::NotFound);
                }

                query(
                    "INSERT INTO audit_log (action, license_key, product, changed_at, details) VALUES ($1, $2, $3, $4, NULL)",
                )
                .bind(AuditAction::Delete.as_str())
                .bind(key)
                .bind(product)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("insert_audit", e))?;

                tx.commit().await.map_err(|e| db_error("commit", e))?;
            }
        }

        Ok(())
    }

    /// All licenses for a product, oldest first.
    pub async fn list_licenses(&self, product: &str) -> LicenseResult<Vec<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, License>("SELECT * FROM licenses WHERE product = ? ORDER BY id")
                    .bind(product)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| db_error("list_licenses", e))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, License>("SELECT * FROM licenses WHERE product = $1 ORDER BY id")
                    .bind(product)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| db_error("list_licenses", e))
            }
        }
    }

    /// The `limit` most recent audit entries, newest first.
    pub async fn get_audit_logs(&self, limit: i64) -> LicenseResult<Vec<AuditLogEntry>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, AuditLogEntry>(
                "SELECT * FROM audit_log ORDER BY changed_at DESC, id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| db_error("get_audit_logs", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, AuditLogEntry>(
                "SELECT * FROM audit_log ORDER BY changed_at DESC, id DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| db_error("get_audit_logs", e)),
        }
    }
}
