//! Market data providers
//!
//! The engine only needs bar history and a live price. `CsvMarketData` serves
//! both from local files named `<instrument>_<timeframe>.csv` with columns
//! `timestamp,open,high,low,close,volume`. Timestamps may be RFC 3339 or
//! unix seconds/milliseconds.

use crate::types::{InstrumentSeries, PriceBar, Timeframe};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait MarketData: Send + Sync {
    /// The newest `count` bars, oldest first
    async fn get_bars(&self, instrument: &str, timeframe: Timeframe, count: usize) -> Result<InstrumentSeries>;

    async fn get_live_price(&self, instrument: &str) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        // Millisecond epochs are 13 digits for any date after 1973
        let ts = if n.abs() >= 100_000_000_000 {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        };
        return ts.with_context(|| format!("Timestamp out of range: {}", raw));
    }
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Failed to parse timestamp: {}", raw))?
        .with_timezone(&Utc))
}

/// Parse bars from CSV text
pub fn parse_bars<R: std::io::Read>(reader: R) -> Result<Vec<PriceBar>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();

    for (line, result) in csv_reader.deserialize().enumerate() {
        let row: CsvRow = result.with_context(|| format!("Failed to parse CSV row {}", line + 1))?;
        if row.high < row.low {
            bail!("Row {}: high {} below low {}", line + 1, row.high, row.low);
        }
        bars.push(PriceBar::new(
            parse_timestamp(&row.timestamp)?,
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume,
        ));
    }

    Ok(bars)
}

/// Load one bar file into a series
pub fn load_series(path: &Path, instrument: &str, timeframe: Timeframe) -> Result<InstrumentSeries> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    let bars = parse_bars(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to load bars from {:?}", path))?;
    Ok(InstrumentSeries::from_bars(instrument, timeframe, bars))
}

/// File-backed provider
#[derive(Debug, Clone)]
pub struct CsvMarketData {
    dir: PathBuf,
    /// Timeframe whose last close is reported as the live price
    live_timeframe: Timeframe,
}

impl CsvMarketData {
    pub fn new(dir: impl Into<PathBuf>, live_timeframe: Timeframe) -> Self {
        Self {
            dir: dir.into(),
            live_timeframe,
        }
    }

    pub fn path_for(&self, instrument: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", instrument, timeframe))
    }

    async fn read_series(&self, instrument: &str, timeframe: Timeframe) -> Result<InstrumentSeries> {
        let path = self.path_for(instrument, timeframe);
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let bars = parse_bars(raw.as_slice()).with_context(|| format!("Failed to load bars from {:?}", path))?;
        Ok(InstrumentSeries::from_bars(instrument, timeframe, bars))
    }

    /// Instruments with a file for `timeframe` in the data directory
    pub fn instruments(&self, timeframe: Timeframe) -> Result<Vec<String>> {
        let suffix = format!("_{}.csv", timeframe);
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir).with_context(|| format!("Failed to list {:?}", self.dir))? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(instrument) = name.strip_suffix(&suffix) {
                names.push(instrument.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl MarketData for CsvMarketData {
    async fn get_bars(&self, instrument: &str, timeframe: Timeframe, count: usize) -> Result<InstrumentSeries> {
        let series = self.read_series(instrument, timeframe).await?;
        let start = series.len().saturating_sub(count);
        Ok(InstrumentSeries::from_bars(instrument, timeframe, series.bars()[start..].to_vec()))
    }

    async fn get_live_price(&self, instrument: &str) -> Result<f64> {
        self.read_series(instrument, self.live_timeframe)
            .await?
            .last_close()
            .with_context(|| format!("No bars for {} {}", instrument, self.live_timeframe))
    }
}
