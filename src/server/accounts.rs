//! Account registration and login.
//!
//! Passwords are hashed with Argon2id (see [`crate::server::password`]).
//! Login failures never reveal whether the email exists: an unknown email and
//! a wrong password both return `InvalidCredentials` after the same amount of
//! hashing work.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use sqlx::{query, query_as, FromRow};
use tracing::{info, warn};

use crate::errors::{LicenseError, LicenseResult};
use crate::license_key::validate_email;
use crate::server::database::{db_error, Database};
use crate::server::password::PasswordHashing;

/// An account row from the `accounts` table.
#[derive(Clone, PartialEq, Eq, FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// PHC string; never serialized or logged
    pub password_hash: String,
    pub created_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
    pub last_login_ip: Option<String>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("last_login", &self.last_login)
            .field("last_login_ip", &self.last_login_ip)
            .finish()
    }
}

impl Database {
    /// Insert a new account. A taken username or email yields `DuplicateAccount`.
    pub async fn insert_account(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> LicenseResult<Account> {
        let now = Utc::now().naive_utc();

        let result = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, Account>(
                    "INSERT INTO accounts (username, email, password_hash, created_at) VALUES (?, ?, ?, ?) RETURNING *",
                )
                .bind(username)
                .bind(email)
                .bind(password_hash)
                .bind(now)
                .fetch_one(pool)
                .await
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, Account>(
                    "INSERT INTO accounts (username, email, password_hash, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
                )
                .bind(username)
                .bind(email)
                .bind(password_hash)
                .bind(now)
                .fetch_one(pool)
                .await
            }
        };

        result.map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => LicenseError::DuplicateAccount,
            _ => db_error("insert_account", e),
        })
    }

    pub async fn find_account_by_email(&self, email: &str) -> LicenseResult<Option<Account>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Account>("SELECT * FROM accounts WHERE email = ?")
                .bind(email)
                .fetch_optional(pool)
                .await
                .map_err(|e| db_error("find_account_by_email", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
                    .bind(email)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| db_error("find_account_by_email", e))
            }
        }
    }

    pub async fn get_account(&self, id: i64) -> LicenseResult<Option<Account>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .map_err(|e| db_error("get_account", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await
                .map_err(|e| db_error("get_account", e)),
        }
    }

    /// Stamp the last successful login time and client address.
    pub async fn record_login(
        &self,
        id: i64,
        at: NaiveDateTime,
        ip: Option<&str>,
    ) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("UPDATE accounts SET last_login = ?, last_login_ip = ? WHERE id = ?")
                    .bind(at)
                    .bind(ip)
                    .bind(id)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("record_login", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("UPDATE accounts SET last_login = $1, last_login_ip = $2 WHERE id = $3")
                    .bind(at)
                    .bind(ip)
                    .bind(id)
                    .execute(pool)
                    .await
                    .map_err(|e| db_error("record_login", e))?;
            }
        }
        Ok(())
    }
}

/// Registration input as submitted by the caller.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Clone)]
pub struct AccountService {
    db: Arc<Database>,
    hasher: PasswordHashing,
}

impl AccountService {
    pub fn new(db: Arc<Database>, hasher: PasswordHashing) -> Self {
        Self { db, hasher }
    }

    /// Create an account.
    ///
    /// All input checks run before any hashing or database access, so a
    /// mismatched confirmation never touches storage.
    pub async fn register(&self, registration: Registration) -> LicenseResult<Account> {
        let Registration {
            username,
            email,
            password,
            password_confirm,
        } = registration;

        if password != password_confirm {
            return Err(LicenseError::PasswordMismatch);
        }
        let username = username.trim().to_string();
        if username.is_empty() {
            return Err(LicenseError::InvalidInput("username cannot be empty".to_string()));
        }
        if password.is_empty() {
            return Err(LicenseError::InvalidInput("password cannot be empty".to_string()));
        }
        let email = email.trim().to_string();
        validate_email(&email)?;

        let hash = self.hasher.hash(password).await?;
        let account = self.db.insert_account(&username, &email, &hash).await?;

        info!(account_id = account.id, username = %account.username, "account registered");
        Ok(account)
    }

    /// Check credentials and record the login.
    ///
    /// Updating `last_login` is best-effort: if it fails the login still
    /// succeeds and the failure is logged.
    pub async fn login(
        &self,
        email: &str,
        password: String,
        client_ip: Option<String>,
    ) -> LicenseResult<Account> {
        let Some(mut account) = self.db.find_account_by_email(email.trim()).await? else {
            self.hasher.waste_verification(password).await?;
            warn!("login rejected");
            return Err(LicenseError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify(password, account.password_hash.clone())
            .await?
        {
            warn!(account_id = account.id, "login rejected");
            return Err(LicenseError::InvalidCredentials);
        }

        let now = Utc::now().naive_utc();
        match self
            .db
            .record_login(account.id, now, client_ip.as_deref())
            .await
        {
            Ok(()) => {
                account.last_login = Some(now);
                account.last_login_ip = client_ip;
            }
            Err(e) => warn!(account_id = account.id, "failed to record login: {e}"),
        }

        info!(account_id = account.id, "login succeeded");
        Ok(account)
    }

    pub async fn get_account(&self, id: i64) -> LicenseResult<Account> {
        self.db.get_account(id).await?.ok_or(LicenseError::NotFound)
    }
}
