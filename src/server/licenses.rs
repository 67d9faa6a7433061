//! License lifecycle: add, look up, delete, list, audit trail and verify.
//!
//! Input is validated here before it reaches the database; every mutation
//! and its audit entry are written in one transaction by [`Database`].

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};

use crate::errors::{LicenseError, LicenseResult};
use crate::license_key::{validate_email, validate_license_key};
use crate::server::database::{AuditLogEntry, Database, License, NewLicense};
use crate::server::logging::{log_license_event, LicenseEvent};
use crate::server::verification::Verification;

#[derive(Debug, Clone)]
pub struct LicenseService {
    db: Arc<Database>,
}

impl LicenseService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a license and record an `ADD` audit entry.
    pub async fn add_license(&self, new: NewLicense) -> LicenseResult<License> {
        validate_license_key(&new.key)?;
        validate_email(&new.owner_email)?;
        if new.product.trim().is_empty() {
            return Err(LicenseError::InvalidInput(
                "product cannot be empty".to_string(),
            ));
        }

        let license = self.db.insert_license_with_audit(&new).await?;
        log_license_event(
            LicenseEvent::Added,
            &license.key,
            &license.product,
            Some(&license.owner_email),
        );
        Ok(license)
    }

    pub async fn get_license(&self, key: &str, product: &str) -> LicenseResult<License> {
        self.db
            .get_license(key, product)
            .await?
            .ok_or(LicenseError::NotFound)
    }

    /// Remove a license permanently and record a `DELETE` audit entry.
    pub async fn delete_license(&self, key: &str, product: &str) -> LicenseResult<()> {
        self.db.delete_license_with_audit(key, product).await?;
        log_license_event(LicenseEvent::Deleted, key, product, None);
        Ok(())
    }

    pub async fn list_licenses(&self, product: &str) -> LicenseResult<Vec<License>> {
        self.db.list_licenses(product).await
    }

    /// Most recent audit entries first.
    pub async fn get_audit_logs(&self, limit: u32) -> LicenseResult<Vec<AuditLogEntry>> {
        self.db.get_audit_logs(i64::from(limit)).await
    }

    /// Check a (key, product) pair against the current time.
    pub async fn verify(&self, key: &str, product: &str) -> LicenseResult<Verification> {
        self.verify_at(key, product, Utc::now().naive_utc()).await
    }

    pub async fn verify_at(
        &self,
        key: &str,
        product: &str,
        now: NaiveDateTime,
    ) -> LicenseResult<Verification> {
        let license = self.db.get_license(key, product).await?;
        let verification = Verification::evaluate(license, now);

        match verification.reason() {
            None => log_license_event(LicenseEvent::Verified, key, product, None),
            Some(reason) => {
                log_license_event(LicenseEvent::VerificationFailed, key, product, Some(reason))
            }
        }
        Ok(verification)
    }
}
