//! Ticker universe: display symbols, exchange codes, and their Yahoo
//! Finance spellings.

use std::collections::BTreeMap;

use anyhow::Context;

use crate::storage::StorageManager;

/// One instrument to screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticker {
    /// Symbol used for artifact names and display, e.g. "VUAA".
    pub symbol: String,
    /// Symbol the data source understands, e.g. "VUAA.DE".
    pub fetch_symbol: String,
}

/// Maps an exchange code to the Yahoo Finance symbol suffix. Unrecognized
/// exchanges pass the symbol through unchanged.
fn to_yahoo_symbol(symbol: &str, exchange: &str) -> String {
    let suffix = match exchange {
        "AEX" => ".AS",   // Euronext Amsterdam
        "XETRA" => ".DE", // Deutsche Boerse XETRA
        "PAR" => ".PA",   // Euronext Paris
        _ => return symbol.to_string(),
    };
    format!("{symbol}{suffix}")
}

/// The part of a fetch symbol before the first `.`; analyzed artifacts are
/// named by this.
pub fn trim_symbol(fetch_symbol: &str) -> &str {
    fetch_symbol.split('.').next().unwrap_or(fetch_symbol)
}

/// Loads `tickers.json` (a `{ "SYMBOL": "EXCHANGE" }` map) and resolves
/// each entry to its fetchable spelling, sorted by symbol.
pub async fn load_universe(storage: &StorageManager) -> anyhow::Result<Vec<Ticker>> {
    let raw: BTreeMap<String, String> = storage
        .load_json("tickers")
        .await
        .context("reading tickers.json")?;

    Ok(raw
        .into_iter()
        .map(|(symbol, exchange)| {
            let fetch_symbol = to_yahoo_symbol(&symbol, &exchange);
            Ticker { symbol, fetch_symbol }
        })
        .collect())
}
