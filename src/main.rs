//! Command-line entry point for the occupancy sync backend
//!
//! `tenant-sync sync` runs one full cycle; `tenant-sync fetch-only` stops
//! after extraction and writes diagnostics without touching the stores.

use anyhow::{Context, Result};
use tracing::info;

use tenant_sync_lib::application::SyncService;
use tenant_sync_lib::infrastructure::{
    init_logging_with_config, ConfigManager, DatabaseConnection,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config().await?;
    init_logging_with_config(&config.logging)?;
    info!("Configuration loaded from {:?}", config_manager.config_path());

    let db = DatabaseConnection::with_max_connections(
        &config.database.url,
        config.database.max_connections,
    )
    .await
    .context("Failed to open database")?;
    db.migrate().await.context("Failed to run migrations")?;

    let service = SyncService::new(config, db.pool().clone())?;

    let command = std::env::args().nth(1).unwrap_or_else(|| "sync".to_string());
    match command.as_str() {
        "sync" => {
            let summary = service.run_sync().await?;
            info!(
                "Cycle {} done: {} record(s), snapshot {}+/{}-, reconciliation: {:?}",
                summary.cycle_id,
                summary.records_extracted,
                summary.snapshot.upserted,
                summary.snapshot.deleted,
                summary.reconciliation
            );
        }
        "fetch-only" => {
            let summary = service.run_fetch_only().await?;
            info!(
                "Fetch-only cycle {} done: {} record(s) over {} page(s)",
                summary.cycle_id, summary.records_extracted, summary.pages_fetched
            );
        }
        other => {
            anyhow::bail!("Unknown command '{other}' (expected 'sync' or 'fetch-only')");
        }
    }

    Ok(())
}
