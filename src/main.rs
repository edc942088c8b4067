//! Noah Portal
//!
//! Connectivity check for the portal database: loads the configuration,
//! counts the rows visible in every table and shuts the client down.

use anyhow::Context;
use noah_portal::db::{Database, Filters, SelectOptions};
use noah_portal::{config, telemetry, Table};
use serde_json::Value;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = config::load_config().context("Failed to load configuration")?;

    // Initialize logger
    telemetry::init_tracing(&config.logging).context("Failed to initialize logging")?;

    // Connect to database
    let database = Database::connect(&config.database).context("Failed to create database client")?;

    let mut failures = 0;
    for table in Table::ALL {
        let options = SelectOptions::default().limit(1);
        match database
            .select::<Value>(table, "id", &Filters::new(), &options)
            .await
        {
            Ok(page) => info!(%table, rows = page.count, "Table reachable"),
            Err(err) => {
                failures += 1;
                error!(%table, code = %err.code, message = %err.message, "Table check failed");
            }
        }
    }

    database.close().await;

    if failures > 0 {
        anyhow::bail!("{} of {} tables failed the check", failures, Table::ALL.len());
    }
    Ok(())
}
