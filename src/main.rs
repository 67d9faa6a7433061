//! keyhouse CLI entrypoint.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use keyhouse::cli::{self, Cli};
use keyhouse::server::database::Database;
use keyhouse::server::logging::init_tracing;
use keyhouse::{KeyhouseConfig, LicenseResult};

async fn run(cli: Cli) -> LicenseResult<String> {
    let config = KeyhouseConfig::load_from(cli.config.as_deref())?;
    init_tracing(&config.logging.level);

    let db = Arc::new(Database::open(&config.database).await?);
    cli::run(cli.command, &config, db).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
