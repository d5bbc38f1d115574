mod analyze;
mod error;
mod fetch;
mod indicators;
mod report;
mod series;
mod signal;
mod storage;
mod tickers;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use storage::StorageManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let storage = StorageManager::new("data").await?;

    if std::env::args().nth(1).as_deref() == Some("clean") {
        let removed = storage.clean_tables().await?;
        info!(removed, "removed raw and analyzed tables");
        return Ok(());
    }

    let config = storage.load_config().await;

    // Step 1: Ticker universe
    info!("--- Step 1: Loading Tickers ---");
    let universe = match tickers::load_universe(&storage).await {
        Ok(universe) => {
            info!(count = universe.len(), "ticker universe loaded");
            universe
        }
        Err(e) => {
            error!(error = ?e, "failed to load ticker universe");
            return Err(e);
        }
    };

    // Step 2: Download Candles
    info!("--- Step 2: Fetching Candles ---");
    if let Err(e) = fetch::run(&storage, &config, &universe).await {
        error!(error = ?e, "fetch step failed");
    }

    // Step 3: Analyze Data
    info!("--- Step 3: Analyzing Instruments ---");
    if let Err(e) = analyze::run(&storage).await {
        error!(error = ?e, "analysis step failed");
    }

    // Step 4: Display Results
    info!("--- Step 4: Displaying Report ---");
    if let Err(e) = report::run(&storage, &config).await {
        error!(error = ?e, "report step failed");
    }

    Ok(())
}
