use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use chrono::NaiveDate;

use crate::signal::{Signal, Thresholds};

// CONFIGURATION

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// First day of the extraction window, e.g. "2025-01-01".
    pub start_date: NaiveDate,
    /// Candle interval requested from the data source, e.g. "60m".
    pub interval: String,
    /// How many instruments to download concurrently.
    pub batch_size: usize,
    /// The report keeps rows from the trailing N days.
    pub report_days: i64,
    pub thresholds: Thresholds,
    /// Labels to show in the report. Empty means all three.
    pub criteria: Vec<Signal>,
    /// Symbols to show in the report. Empty means all.
    pub symbols: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or(NaiveDate::MIN),
            interval: "60m".to_string(),
            batch_size: 8,
            report_days: 4,
            thresholds: Thresholds::default(),
            criteria: Vec::new(),
            symbols: Vec::new(),
        }
    }
}

// STORAGE MANAGER

/// Owns the on-disk layout: `<base>/config.json`, `<base>/tickers.json`,
/// `<base>/tickers/<SYMBOL>.csv` (raw candles) and
/// `<base>/analyzed/<SYMBOL>.csv` (derived tables).
pub struct StorageManager {
    pub base_dir: PathBuf,
}

pub const RAW_DIR: &str = "tickers";
pub const ANALYZED_DIR: &str = "analyzed";

impl StorageManager {
    /// Creates the manager and the directory tree it needs up front, so
    /// save paths never have to check for missing folders later.
    pub async fn new<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        for dir in [base_dir.clone(), base_dir.join(RAW_DIR), base_dir.join(ANALYZED_DIR)] {
            if !dir.exists() {
                fs::create_dir_all(&dir).await?;
            }
        }
        Ok(Self { base_dir })
    }

    /// Saves any `Serialize` value as pretty JSON, atomically: write to a
    /// `.tmp` sibling first, then rename over the final name so a crash
    /// mid-write never leaves a torn file.
    pub async fn save_json<T: Serialize>(&self, name: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{name}.json");
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{file_name}.tmp"));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;
        Ok(())
    }

    pub async fn load_json<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{name}.json"));
        // Raw bytes; serde_json scans them anyway, no need for a UTF-8 pass.
        let content = fs::read(path).await?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Loads `config.json`. A missing or unreadable file falls back to
    /// defaults, which are written out so there is a file to edit.
    pub async fn load_config(&self) -> AppConfig {
        match self.load_json("config").await {
            Ok(config) => config,
            Err(e) => {
                debug!(error = %e, "no usable config.json, seeding defaults");
                let config = AppConfig::default();
                if let Err(e) = self.save_json("config", &config).await {
                    warn!(error = %e, "could not write default config");
                }
                config
            }
        }
    }

    /// Writes one instrument's CSV artifact with the same tmp+rename
    /// strategy as the JSON path.
    pub async fn save_table(&self, dir: &str, symbol: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let file_name = format!("{symbol}.csv");
        let final_path = self.base_dir.join(dir).join(&file_name);
        let tmp_path = self.base_dir.join(dir).join(format!("{file_name}.tmp"));

        fs::write(&tmp_path, bytes).await?;
        fs::rename(tmp_path, final_path).await?;
        Ok(())
    }

    pub async fn load_table(&self, dir: &str, symbol: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.base_dir.join(dir).join(format!("{symbol}.csv"));
        Ok(fs::read(path).await?)
    }

    /// Symbols with a persisted table in `dir`, derived from the file names.
    pub async fn list_symbols(&self, dir: &str) -> anyhow::Result<Vec<String>> {
        let mut symbols = Vec::new();
        let mut entries = fs::read_dir(self.base_dir.join(dir)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Deletes every per-instrument artifact, raw and analyzed. The config
    /// and ticker map stay.
    pub async fn clean_tables(&self) -> anyhow::Result<usize> {
        let mut removed = 0;
        for dir in [RAW_DIR, ANALYZED_DIR] {
            let path = self.base_dir.join(dir);
            if !path.exists() {
                continue;
            }
            let mut entries = fs::read_dir(&path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    fs::remove_file(entry.path()).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
