//! Report step: loads the analyzed tables, classifies each row against the
//! configured thresholds, filters, and renders a terminal table.

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_BORDERS_ONLY,
};
use tracing::{info, warn};

use crate::analyze::{AnalyzedRow, from_analyzed_csv};
use crate::signal::{Signal, Thresholds, classify};
use crate::storage::{ANALYZED_DIR, AppConfig, StorageManager};

/// One classified, displayable row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub symbol: String,
    pub signal: Signal,
    pub row: AnalyzedRow,
}

/// Classifies and filters rows from all instruments.
///
/// Keeps rows no older than `since`, then classifies each one. Rows whose
/// oscillators are still warming up cannot be classified and are excluded
/// outright (not folded into hold). The optional criteria/symbol filters
/// narrow the result; an empty filter means "everything". Rows come back
/// sorted by date descending, then symbol ascending.
pub fn build_report(
    tables: Vec<(String, Vec<AnalyzedRow>)>,
    since: NaiveDate,
    thresholds: &Thresholds,
    criteria: &[Signal],
    symbols: &[String],
) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = tables
        .into_iter()
        .filter(|(symbol, _)| symbols.is_empty() || symbols.contains(symbol))
        .flat_map(|(symbol, table)| {
            table
                .into_iter()
                .filter(|row| row.date >= since)
                .filter_map(|row| {
                    let (rsi, cci) = (row.rsi_14?, row.cci_25?);
                    Some(ReportRow {
                        symbol: symbol.clone(),
                        signal: classify(rsi, cci, thresholds),
                        row,
                    })
                })
                .collect::<Vec<_>>()
        })
        .filter(|r| criteria.is_empty() || criteria.contains(&r.signal))
        .collect();

    rows.sort_by(|a, b| {
        b.row
            .date
            .cmp(&a.row.date)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    rows
}

fn signal_cell(signal: Signal) -> Cell {
    let color = match signal {
        Signal::Buy => Color::Green,
        Signal::Sell => Color::Red,
        Signal::Hold => Color::DarkGrey,
    };
    Cell::new(signal.as_str()).fg(color)
}

fn value_cell(value: Option<f64>) -> Cell {
    match value {
        Some(v) => Cell::new(format!("{v:.2}")).set_alignment(CellAlignment::Right),
        None => Cell::new("-").set_alignment(CellAlignment::Right),
    }
}

pub fn render_table(rows: &[ReportRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            vec![
                "Date", "Symbol", "Signal", "Close", "Pct Change", "CCI 25", "RSI 14", "MA 9",
                "MA 14", "MA 50",
            ]
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
        );

    for r in rows {
        table.add_row(vec![
            Cell::new(r.row.date.format("%Y-%m-%d")),
            Cell::new(&r.symbol).add_attribute(Attribute::Bold),
            signal_cell(r.signal),
            value_cell(Some(r.row.close)),
            value_cell(r.row.pct_change),
            value_cell(r.row.cci_25),
            value_cell(r.row.rsi_14),
            value_cell(r.row.ma_9),
            value_cell(r.row.ma_14),
            value_cell(r.row.ma_50),
        ]);
    }
    table
}

/// Loads every analyzed table, builds the filtered report, and prints it.
pub async fn run(storage: &StorageManager, config: &AppConfig) -> Result<()> {
    let symbols = storage.list_symbols(ANALYZED_DIR).await?;
    if symbols.is_empty() {
        info!("no analyzed tables found, nothing to report");
        return Ok(());
    }

    let mut tables = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let bytes = storage.load_table(ANALYZED_DIR, &symbol).await?;
        match from_analyzed_csv(&bytes) {
            Ok(rows) => tables.push((symbol, rows)),
            Err(e) => warn!(symbol = %symbol, error = %e, "skipping unreadable analyzed table"),
        }
    }

    let since = Utc::now().date_naive() - Duration::days(config.report_days);
    let rows = build_report(
        tables,
        since,
        &config.thresholds,
        &config.criteria,
        &config.symbols,
    );

    if rows.is_empty() {
        info!("no rows match the current filters");
        return Ok(());
    }

    println!("{}", render_table(&rows));
    Ok(())
}
