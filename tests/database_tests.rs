#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use keyhouse::errors::{LicenseError, LicenseResult};
use keyhouse::server::database::{Database, NewLicense};

/// Helper: in-memory SQLite database with the schema applied.
///
/// One connection only, so every query sees the same in-memory database.
async fn setup_in_memory_db() -> LicenseResult<(Arc<Database>, SqlitePool)> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    let db = Database::SQLite(pool.clone());
    db.migrate().await?;
    Ok((Arc::new(db), pool))
}

fn new_license(key: &str, product: &str) -> NewLicense {
    NewLicense {
        key: key.to_string(),
        product: product.to_string(),
        owner_email: "a@b.com".to_string(),
        owner_name: "A B".to_string(),
        expires_at: None,
    }
}

fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[tokio::test]
async fn insert_and_get_license() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;

    let stored = db
        .insert_license_with_audit(&new_license("ABCD-1234-EFGH-5678", "Demo"))
        .await?;
    assert_eq!(stored.key, "ABCD-1234-EFGH-5678");
    assert!(!stored.is_activated);

    let fetched = db
        .get_license("ABCD-1234-EFGH-5678", "Demo")
        .await?
        .expect("license should exist");
    assert_eq!(fetched, stored);
    assert_eq!(fetched.owner_email, "a@b.com");
    assert_eq!(fetched.owner_name, "A B");
    assert_eq!(fetched.expires_at, None);

    Ok(())
}

#[tokio::test]
async fn expiry_round_trips() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;

    let mut new = new_license("ABCD-1234-EFGH-5678", "Demo");
    new.expires_at = Some(ts(2030, 1, 31));
    db.insert_license_with_audit(&new).await?;

    let fetched = db.get_license("ABCD-1234-EFGH-5678", "Demo").await?.unwrap();
    assert_eq!(fetched.expires_at, Some(ts(2030, 1, 31)));
    Ok(())
}

#[tokio::test]
async fn get_missing_license_returns_none() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    assert!(db.get_license("ZZZZ-9999-ZZZZ-9999", "Demo").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn insert_appends_add_audit_entry() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    db.insert_license_with_audit(&new_license("ABCD-1234-EFGH-5678", "Demo"))
        .await?;

    let logs = db.get_audit_logs(10).await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "ADD");
    assert_eq!(logs[0].license_key, "ABCD-1234-EFGH-5678");
    assert_eq!(logs[0].product, "Demo");
    assert_eq!(logs[0].details.as_deref(), Some("Owner: A B (a@b.com)"));
    Ok(())
}

#[tokio::test]
async fn duplicate_pair_is_rejected_without_side_effects() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    let new = new_license("ABCD-1234-EFGH-5678", "Demo");

    db.insert_license_with_audit(&new).await?;
    let err = db.insert_license_with_audit(&new).await.unwrap_err();
    match err {
        LicenseError::DuplicateKey { key, product } => {
            assert_eq!(key, "ABCD-1234-EFGH-5678");
            assert_eq!(product, "Demo");
        }
        other => panic!("expected DuplicateKey, got {other:?}"),
    }

    assert_eq!(db.list_licenses("Demo").await?.len(), 1);
    assert_eq!(db.get_audit_logs(10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn same_key_for_different_products_is_allowed() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    db.insert_license_with_audit(&new_license("ABCD-1234-EFGH-5678", "Demo"))
        .await?;
    db.insert_license_with_audit(&new_license("ABCD-1234-EFGH-5678", "Other"))
        .await?;

    assert_eq!(db.list_licenses("Demo").await?.len(), 1);
    assert_eq!(db.list_licenses("Other").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn delete_missing_license_is_not_found_and_not_audited() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;

    let result = db.delete_license_with_audit("ZZZZ-9999-ZZZZ-9999", "Demo").await;
    assert!(matches!(result, Err(LicenseError::NotFound)));
    assert!(db.get_audit_logs(10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_removes_license_and_appends_delete_entry() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    db.insert_license_with_audit(&new_license("ABCD-1234-EFGH-5678", "Demo"))
        .await?;

    db.delete_license_with_audit("ABCD-1234-EFGH-5678", "Demo")
        .await?;

    assert!(db.get_license("ABCD-1234-EFGH-5678", "Demo").await?.is_none());

    let logs = db.get_audit_logs(10).await?;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].action, "DELETE");
    assert_eq!(logs[0].details, None);
    assert_eq!(logs[1].action, "ADD");
    Ok(())
}

#[tokio::test]
async fn failed_audit_insert_rolls_back_delete() -> LicenseResult<()> {
    let (db, pool) = setup_in_memory_db().await?;
    db.insert_license_with_audit(&new_license("ABCD-1234-EFGH-5678", "Demo"))
        .await?;

    sqlx::query("DROP TABLE audit_log").execute(&pool).await?;

    let result = db.delete_license_with_audit("ABCD-1234-EFGH-5678", "Demo").await;
    assert!(matches!(result, Err(LicenseError::PersistenceFailure(_))));

    let still_there = db.get_license("ABCD-1234-EFGH-5678", "Demo").await?;
    assert!(still_there.is_some(), "delete must roll back with its audit entry");
    Ok(())
}

#[tokio::test]
async fn failed_audit_insert_rolls_back_add() -> LicenseResult<()> {
    let (db, pool) = setup_in_memory_db().await?;
    sqlx::query("DROP TABLE audit_log").execute(&pool).await?;

    let result = db
        .insert_license_with_audit(&new_license("ABCD-1234-EFGH-5678", "Demo"))
        .await;
    assert!(matches!(result, Err(LicenseError::PersistenceFailure(_))));
    assert!(db.get_license("ABCD-1234-EFGH-5678", "Demo").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn list_is_filtered_by_product_in_insertion_order() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    for key in ["CCCC-0000-0000-0000", "AAAA-0000-0000-0000", "BBBB-0000-0000-0000"] {
        db.insert_license_with_audit(&new_license(key, "Demo")).await?;
    }
    db.insert_license_with_audit(&new_license("DDDD-0000-0000-0000", "Other"))
        .await?;

    let keys: Vec<String> = db
        .list_licenses("Demo")
        .await?
        .into_iter()
        .map(|l| l.key)
        .collect();
    assert_eq!(
        keys,
        vec![
            "CCCC-0000-0000-0000",
            "AAAA-0000-0000-0000",
            "BBBB-0000-0000-0000"
        ]
    );
    assert!(db.list_licenses("Nothing").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn audit_logs_are_newest_first_and_limited() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    for key in ["AAAA-0000-0000-0000", "BBBB-0000-0000-0000", "CCCC-0000-0000-0000"] {
        db.insert_license_with_audit(&new_license(key, "Demo")).await?;
    }

    let logs = db.get_audit_logs(2).await?;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].license_key, "CCCC-0000-0000-0000");
    assert_eq!(logs[1].license_key, "BBBB-0000-0000-0000");
    assert!(logs[0].changed_at >= logs[1].changed_at);
    Ok(())
}

#[tokio::test]
async fn migrate_is_idempotent() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    db.insert_license_with_audit(&new_license("ABCD-1234-EFGH-5678", "Demo"))
        .await?;

    db.migrate().await?;
    assert_eq!(db.list_licenses("Demo").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn ping_reports_connectivity() -> LicenseResult<()> {
    let (db, _pool) = setup_in_memory_db().await?;
    assert!(db.ping().await);
    assert_eq!(db.backend_name(), "sqlite");
    Ok(())
}
