//! Analysis step: raw candles in, analyzed daily table out.
//!
//! Per instrument the flow is ingest raw CSV -> normalize to daily bars ->
//! append derived columns -> persist analyzed CSV. Instruments run
//! concurrently and independently; a structural failure in one is reported
//! with its symbol and never aborts the rest of the batch.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::indicators;
use crate::series::{DailyBar, RawObservation, normalize_daily};
use crate::storage::{ANALYZED_DIR, RAW_DIR, StorageManager};
use crate::tickers::trim_symbol;

/// One row of the persisted analyzed table. Field order is the column
/// order of the artifact. Derived values are `None` while their window is
/// still warming up (serialized as empty cells, never zeros).
///
/// Deployment policy: `open` and `volume` are dropped here; the analyzed
/// artifact carries exactly the display column set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalyzedRow {
    pub date: NaiveDate,
    pub close: f64,
    pub pct_change: Option<f64>,
    pub cci_25: Option<f64>,
    pub rsi_14: Option<f64>,
    pub ma_9: Option<f64>,
    pub ma_14: Option<f64>,
    pub ma_50: Option<f64>,
}

fn not_nan(v: f64) -> Option<f64> {
    if v.is_nan() { None } else { Some(v) }
}

/// Appends the derived columns to a normalized daily series. One bar in,
/// one row out, order preserved; no look-ahead.
pub fn analyze_series(bars: &[DailyBar]) -> Vec<AnalyzedRow> {
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let low: Vec<f64> = bars.iter().map(|b| b.low).collect();

    let pct = indicators::pct_change(&close);
    let cci = indicators::cci(&high, &low, &close, 25);
    let rsi = indicators::rsi(&close, 14);
    let ma_9 = indicators::sma(&close, 9);
    let ma_14 = indicators::sma(&close, 14);
    let ma_50 = indicators::sma(&close, 50);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| AnalyzedRow {
            date: bar.date,
            close: bar.close,
            pct_change: not_nan(pct[i]),
            cci_25: not_nan(cci[i]),
            rsi_14: not_nan(rsi[i]),
            ma_9: not_nan(ma_9[i]),
            ma_14: not_nan(ma_14[i]),
            ma_50: not_nan(ma_50[i]),
        })
        .collect()
}

/// Full per-instrument pipeline on an in-memory observation sequence.
/// Deterministic: the same input always yields the same rows.
pub fn analyze_instrument(observations: Vec<RawObservation>) -> Result<Vec<AnalyzedRow>, PipelineError> {
    let bars = normalize_daily(observations)?;
    Ok(analyze_series(&bars))
}

// RAW CSV INGESTION

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    // Timezone-aware exports truncate to their local wall-clock day.
    if let Ok(dt) = chrono::DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.naive_local());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

fn parse_price_cell(s: &str) -> Result<Option<f64>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("unparseable number `{s}`"))
}

/// Parses a raw candle CSV into observations.
///
/// Recognized columns (case-insensitive): `datetime` or `date`, `close`,
/// `high`, `low`, and optionally `open`, `volume`. A missing required
/// column or a malformed row is a hard error for this instrument, never a
/// silent drop.
pub fn parse_raw_csv(bytes: &[u8]) -> Result<Vec<RawObservation>, PipelineError> {
    let mut reader = csv::Reader::from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let ts_idx = column("datetime")
        .or_else(|| column("date"))
        .ok_or(PipelineError::MissingColumn("datetime"))?;
    let close_idx = column("close").ok_or(PipelineError::MissingColumn("close"))?;
    let high_idx = column("high").ok_or(PipelineError::MissingColumn("high"))?;
    let low_idx = column("low").ok_or(PipelineError::MissingColumn("low"))?;
    let open_idx = column("open");
    let volume_idx = column("volume");

    let malformed = |line: usize, reason: String| PipelineError::MalformedRow { line, reason };

    let mut observations = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        // Line 1 is the header.
        let line = i + 2;

        let ts_raw = record.get(ts_idx).unwrap_or_default();
        let timestamp = parse_timestamp(ts_raw)
            .ok_or_else(|| malformed(line, format!("unparseable timestamp `{ts_raw}`")))?;

        let cell = |idx: Option<usize>| -> Result<Option<f64>, PipelineError> {
            let Some(idx) = idx else { return Ok(None) };
            parse_price_cell(record.get(idx).unwrap_or_default())
                .map_err(|reason| malformed(line, reason))
        };

        observations.push(RawObservation {
            timestamp,
            open: cell(open_idx)?,
            high: cell(Some(high_idx))?,
            low: cell(Some(low_idx))?,
            close: cell(Some(close_idx))?,
            volume: cell(volume_idx)?,
        });
    }

    Ok(observations)
}

// ANALYZED CSV CODEC

pub fn to_analyzed_csv(rows: &[AnalyzedRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.into_inner().context("failed to flush CSV writer")
}

pub fn from_analyzed_csv(bytes: &[u8]) -> Result<Vec<AnalyzedRow>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

// BATCH RUNNER

async fn analyze_one(storage: &StorageManager, fetch_symbol: &str) -> Result<usize> {
    let bytes = storage
        .load_table(RAW_DIR, fetch_symbol)
        .await
        .context("reading raw table")?;
    let observations = parse_raw_csv(&bytes)?;
    let rows = analyze_instrument(observations)?;
    let out = to_analyzed_csv(&rows)?;
    storage
        .save_table(ANALYZED_DIR, trim_symbol(fetch_symbol), out)
        .await?;
    Ok(rows.len())
}

/// Analyzes every instrument with a raw table on disk. Per-instrument
/// failures are collected and logged with their symbol; the step itself
/// only fails when nothing can even be listed.
pub async fn run(storage: &StorageManager) -> Result<()> {
    let symbols = storage.list_symbols(RAW_DIR).await?;

    let tasks: Vec<_> = symbols.iter().map(|s| analyze_one(storage, s)).collect();
    let results = futures::future::join_all(tasks).await;

    let mut analyzed = 0usize;
    let mut failed = 0usize;
    for (symbol, result) in symbols.iter().zip(results) {
        match result {
            Ok(rows) => {
                info!(symbol = %symbol, rows, "analyzed table saved");
                analyzed += 1;
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "analysis failed");
                failed += 1;
            }
        }
    }

    info!(analyzed, failed, "analysis finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn daily_obs(days: usize, close: impl Fn(usize) -> f64) -> Vec<RawObservation> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        (0..days)
            .map(|i| {
                let c = close(i);
                RawObservation {
                    timestamp: (start + chrono::Days::new(i as u64))
                        .and_hms_opt(15, 0, 0)
                        .unwrap(),
                    open: Some(c),
                    high: Some(c + 1.0),
                    low: Some(c - 1.0),
                    close: Some(c),
                    volume: Some(100.0),
                }
            })
            .collect()
    }

    #[test]
    fn one_bar_in_one_row_out() {
        let rows = analyze_instrument(daily_obs(60, |i| 100.0 + i as f64)).unwrap();
        assert_eq!(rows.len(), 60);
    }

    #[test]
    fn derived_columns_appear_at_their_warmup_edge() {
        let rows = analyze_instrument(daily_obs(60, |i| 100.0 + (i as f64 * 0.9).sin())).unwrap();

        assert!(rows[0].pct_change.is_none());
        assert!(rows[1].pct_change.is_some());

        assert!(rows[7].ma_9.is_none());
        assert!(rows[8].ma_9.is_some());

        assert!(rows[12].ma_14.is_none());
        assert!(rows[13].ma_14.is_some());

        assert!(rows[13].rsi_14.is_none());
        assert!(rows[14].rsi_14.is_some());

        assert!(rows[23].cci_25.is_none());
        assert!(rows[24].cci_25.is_some());

        assert!(rows[48].ma_50.is_none());
        assert!(rows[49].ma_50.is_some());
    }

    #[test]
    fn single_observation_has_no_indicators() {
        let rows = analyze_instrument(daily_obs(1, |_| 100.0)).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(row.pct_change.is_none());
        assert!(row.cci_25.is_none());
        assert!(row.rsi_14.is_none());
        assert!(row.ma_9.is_none());
        assert!(row.ma_14.is_none());
        assert!(row.ma_50.is_none());
    }

    #[test]
    fn analysis_is_idempotent() {
        let obs = daily_obs(80, |i| 100.0 + (i as f64 * 1.3).cos() * 7.0);
        let first = to_analyzed_csv(&analyze_instrument(obs.clone()).unwrap()).unwrap();
        let second = to_analyzed_csv(&analyze_instrument(obs).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn analyzed_header_is_the_display_column_order() {
        let rows = analyze_instrument(daily_obs(2, |i| 100.0 + i as f64)).unwrap();
        let bytes = to_analyzed_csv(&rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text.lines().next(),
            Some("date,close,pct_change,cci_25,rsi_14,ma_9,ma_14,ma_50")
        );
    }

    #[test]
    fn warmup_cells_serialize_empty() {
        let rows = analyze_instrument(daily_obs(1, |_| 100.0)).unwrap();
        let bytes = to_analyzed_csv(&rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().nth(1), Some("2025-01-01,100.0,,,,,,"));
    }

    #[test]
    fn raw_csv_round_trip_through_normalizer() {
        let csv = b"datetime,open,high,low,close,volume\n\
                    2025-01-03 09:00:00,10,11,9,10.5,100\n\
                    2025-01-03 15:00:00,10.5,11.5,10,11,200\n\
                    2025-01-06 09:00:00,11,12,10.5,11.5,300\n";
        let obs = parse_raw_csv(csv).unwrap();
        let rows = analyze_instrument(obs).unwrap();

        // Jan 3 through Jan 6, last intraday candle wins, weekend filled.
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].close, 11.0);
        assert_eq!(rows[1].close, 11.0);
        assert_eq!(rows[2].close, 11.0);
        assert_eq!(rows[3].close, 11.5);
    }

    #[test]
    fn date_only_timestamps_are_accepted() {
        let csv = b"date,high,low,close\n2025-01-03,11,9,10\n";
        let obs = parse_raw_csv(csv).unwrap();
        assert_eq!(obs[0].timestamp.date(), NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        assert_eq!(obs[0].open, None);
        assert_eq!(obs[0].volume, None);
    }

    #[test]
    fn missing_close_column_is_reported() {
        let csv = b"datetime,high,low\n2025-01-03 09:00:00,11,9\n";
        assert!(matches!(
            parse_raw_csv(csv),
            Err(PipelineError::MissingColumn("close"))
        ));
    }

    #[test]
    fn malformed_row_carries_its_line_number() {
        let csv = b"datetime,high,low,close\n\
                    2025-01-03 09:00:00,11,9,10\n\
                    not-a-date,11,9,10\n";
        match parse_raw_csv(csv) {
            Err(PipelineError::MalformedRow { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected MalformedRow, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_price_is_malformed_not_dropped() {
        let csv = b"datetime,high,low,close\n2025-01-03 09:00:00,11,9,oops\n";
        assert!(matches!(
            parse_raw_csv(csv),
            Err(PipelineError::MalformedRow { line: 2, .. })
        ));
    }
}
