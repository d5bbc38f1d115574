//! Extraction step: downloads per-instrument candle history from the Yahoo
//! Finance chart API and persists one raw CSV per instrument.
//!
//! Instruments are fetched concurrently in bounded batches. A failed
//! instrument is logged and skipped; the batch keeps going.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::storage::{RAW_DIR, AppConfig, StorageManager};
use crate::tickers::Ticker;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

// Yahoo rejects requests with the default library user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Quote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Renders one instrument's chart payload as the raw CSV schema
/// (`datetime,open,high,low,close,volume`, empty cells for nulls).
fn to_raw_csv(result: &ChartResult) -> Result<Vec<u8>> {
    let quote = result
        .indicators
        .quote
        .first()
        .ok_or_else(|| anyhow!("chart payload carries no quote block"))?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["datetime", "open", "high", "low", "close", "volume"])?;

    let fmt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();

    for (i, &ts) in result.timestamp.iter().enumerate() {
        let datetime = DateTime::<Utc>::from_timestamp(ts, 0)
            .ok_or_else(|| anyhow!("timestamp {ts} out of range"))?
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        writer.write_record([
            datetime,
            fmt(quote.open.get(i).copied().flatten()),
            fmt(quote.high.get(i).copied().flatten()),
            fmt(quote.low.get(i).copied().flatten()),
            fmt(quote.close.get(i).copied().flatten()),
            fmt(quote.volume.get(i).copied().flatten()),
        ])?;
    }

    writer.into_inner().context("failed to flush CSV writer")
}

async fn fetch_one(
    client: &Client,
    storage: &StorageManager,
    config: &AppConfig,
    ticker: &Ticker,
) -> Result<usize> {
    let period1 = config
        .start_date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default();
    let period2 = Utc::now().timestamp();

    let url = format!("{CHART_URL}/{}", ticker.fetch_symbol);
    let response = client
        .get(&url)
        .query(&[
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", config.interval.clone()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let payload: ChartResponse = response.json().await?;

    if let Some(err) = payload.chart.error {
        return Err(anyhow!("data source error: {err}"));
    }
    let result = payload
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| anyhow!("empty chart result"))?;

    let rows = result.timestamp.len();
    let bytes = to_raw_csv(&result)?;
    storage.save_table(RAW_DIR, &ticker.fetch_symbol, bytes).await?;

    Ok(rows)
}

/// Downloads candles for the whole universe.
pub async fn run(storage: &StorageManager, config: &AppConfig, universe: &[Ticker]) -> Result<()> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("building HTTP client")?;

    let mut fetched = 0usize;
    let mut failed = 0usize;

    let batch_size = config.batch_size.max(1);
    for batch in universe.chunks(batch_size) {
        let tasks: Vec<_> = batch
            .iter()
            .map(|t| fetch_one(&client, storage, config, t))
            .collect();
        let results = futures::future::join_all(tasks).await;

        for (ticker, result) in batch.iter().zip(results) {
            match result {
                Ok(rows) => {
                    info!(symbol = %ticker.fetch_symbol, rows, "raw candles saved");
                    fetched += 1;
                }
                Err(e) => {
                    warn!(symbol = %ticker.fetch_symbol, error = %e, "fetch failed");
                    failed += 1;
                }
            }
        }
    }

    info!(fetched, failed, "extraction finished");
    Ok(())
}
