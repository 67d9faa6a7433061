//! Command-line interface.
//!
//! ```text
//! keyhouse add --key random --product Demo --email a@b.com --name "A B" --hours 720
//! keyhouse delete ABCD-1234-EFGH-5678 Demo
//! keyhouse list Demo
//! keyhouse logs 20
//! keyhouse serve
//! ```
//!
//! Each subcommand renders its result as a string so the output can be
//! checked without a terminal.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};

use crate::config::KeyhouseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::license_key::{resolve_license_key, RANDOM_KEY_PLACEHOLDER};
use crate::server::database::{AuditLogEntry, Database, License, NewLicense};
use crate::server::licenses::LicenseService;

/// Default number of audit entries shown by `keyhouse logs`.
pub const DEFAULT_LOG_LIMIT: u32 = 10;

#[derive(Debug, Parser)]
#[command(name = "keyhouse")]
#[command(author, version, about = "License key issuing, verification and audit service", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (default: ./keyhouse.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a license
    Add {
        /// License key, or "random" to generate one
        #[arg(short, long, default_value = RANDOM_KEY_PLACEHOLDER)]
        key: String,

        /// Product the license is for
        #[arg(short, long)]
        product: String,

        /// Owner email
        #[arg(short, long)]
        email: String,

        /// Owner name
        #[arg(short, long)]
        name: String,

        /// Hours until the license expires (omit for no expiry)
        #[arg(long)]
        hours: Option<i64>,
    },

    /// Delete a license
    Delete {
        /// License key
        key: String,

        /// Product name
        product: String,
    },

    /// List licenses for a product
    List {
        /// Product name
        product: String,
    },

    /// Show recent audit log entries
    Logs {
        /// Number of entries to show
        #[arg(default_value_t = DEFAULT_LOG_LIMIT)]
        limit: u32,
    },

    /// Run the HTTP server
    Serve,
}

/// Run a parsed command against an open database.
///
/// Returns the text to print on stdout. `serve` blocks until shutdown and
/// returns an empty string.
pub async fn run(
    command: Commands,
    config: &KeyhouseConfig,
    db: Arc<Database>,
) -> LicenseResult<String> {
    let licenses = LicenseService::new(db.clone());

    match command {
        Commands::Add {
            key,
            product,
            email,
            name,
            hours,
        } => {
            let expires_at = expiry_from_hours(hours, Utc::now().naive_utc())?;
            let license = licenses
                .add_license(NewLicense {
                    key: resolve_license_key(Some(&key)),
                    product,
                    owner_email: email,
                    owner_name: name,
                    expires_at,
                })
                .await?;
            Ok(render_added(&license))
        }
        Commands::Delete { key, product } => {
            licenses.delete_license(&key, &product).await?;
            Ok(format!("License {key} for {product} deleted.\n"))
        }
        Commands::List { product } => {
            let rows = licenses.list_licenses(&product).await?;
            Ok(render_licenses(&rows))
        }
        Commands::Logs { limit } => {
            if limit == 0 {
                return Err(LicenseError::InvalidInput(
                    "limit must be greater than 0".to_string(),
                ));
            }
            let entries = licenses.get_audit_logs(limit).await?;
            Ok(render_audit_logs(&entries))
        }
        Commands::Serve => {
            crate::server::serve(config, db).await?;
            Ok(String::new())
        }
    }
}

/// Turn `--hours` into an absolute expiry.
pub fn expiry_from_hours(
    hours: Option<i64>,
    now: NaiveDateTime,
) -> LicenseResult<Option<NaiveDateTime>> {
    match hours {
        None => Ok(None),
        Some(h) if h > 0 => Duration::try_hours(h)
            .and_then(|d| now.checked_add_signed(d))
            .map(Some)
            .ok_or_else(|| LicenseError::InvalidInput(format!("--hours {h} is out of range"))),
        Some(h) => Err(LicenseError::InvalidInput(format!(
            "--hours must be positive, got {h}"
        ))),
    }
}

fn format_time(t: &NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn render_added(license: &License) -> String {
    let rule = "───────────────────────────────────────────";
    let expires = license
        .expires_at
        .as_ref()
        .map(format_time)
        .unwrap_or_else(|| "never".to_string());

    format!(
        "License added successfully!\n{rule}\nKey:     {}\nProduct: {}\nOwner:   {} ({})\nExpires: {}\n{rule}\n",
        license.key, license.product, license.owner_name, license.owner_email, expires
    )
}

/// Render rows as a left-aligned table with a header rule.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        padded.join(" | ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers.to_vec()));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    out.push_str(&rule.join("─┼─"));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

/// Table for `keyhouse list`.
pub fn render_licenses(licenses: &[License]) -> String {
    if licenses.is_empty() {
        return "No licenses found for this product.\n".to_string();
    }

    let rows: Vec<Vec<String>> = licenses
        .iter()
        .map(|l| {
            vec![
                l.key.clone(),
                l.owner_name.clone(),
                l.owner_email.clone(),
                if l.is_activated { "yes" } else { "no" }.to_string(),
                l.expires_at
                    .as_ref()
                    .map(format_time)
                    .unwrap_or_else(|| "never".to_string()),
            ]
        })
        .collect();

    render_table(&["Key", "Owner", "Email", "Active", "Expires"], &rows)
}

/// Table for `keyhouse logs`.
pub fn render_audit_logs(entries: &[AuditLogEntry]) -> String {
    if entries.is_empty() {
        return "No audit log entries.\n".to_string();
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                format_time(&e.changed_at),
                e.action.clone(),
                e.license_key.clone(),
                e.product.clone(),
                e.details.clone().unwrap_or_default(),
            ]
        })
        .collect();

    render_table(&["Date", "Action", "License", "Product", "Details"], &rows)
}
