//! Shared market and trade types
//!
//! Bars and series are produced by a market data collaborator and consumed
//! read-only by the indicator library and the detectors. `TradeLevels` is the
//! committed entry/stop/target triple that every signal carries unchanged for
//! its whole life.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One OHLCV bar. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    /// Close above open
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Close below open
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Absolute body size
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// High - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True range against the previous close
    pub fn true_range(&self, prev_close: f64) -> f64 {
        (self.high - self.low)
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }
}

/// Bar timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::M1),
            "5m" | "5min" => Ok(Timeframe::M5),
            "15m" | "15min" => Ok(Timeframe::M15),
            "1h" | "60m" => Ok(Timeframe::H1),
            "4h" | "240m" => Ok(Timeframe::H4),
            "1d" | "d" | "daily" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

/// Ordered bars for one (instrument, timeframe) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSeries {
    pub instrument: String,
    pub timeframe: Timeframe,
    bars: Vec<PriceBar>,
}

impl InstrumentSeries {
    pub fn new(instrument: &str, timeframe: Timeframe) -> Self {
        Self {
            instrument: instrument.to_string(),
            timeframe,
            bars: Vec::new(),
        }
    }

    /// Build from bars in any order; they are sorted chronologically
    pub fn from_bars(instrument: &str, timeframe: Timeframe, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self {
            instrument: instrument.to_string(),
            timeframe,
            bars,
        }
    }

    /// Append a bar. Bars older than the last recorded one are ignored.
    pub fn push(&mut self, bar: PriceBar) -> bool {
        if let Some(last) = self.bars.last() {
            if bar.timestamp < last.timestamp {
                return false;
            }
        }
        self.bars.push(bar);
        true
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// Close of the latest bar
    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// The stop farther from entry on the adverse side
    pub fn more_conservative_stop(&self, a: f64, b: f64) -> f64 {
        match self {
            Direction::Long => a.min(b),
            Direction::Short => a.max(b),
        }
    }

    /// The target closer to entry on the favourable side
    pub fn more_conservative_target(&self, a: f64, b: f64) -> f64 {
        match self {
            Direction::Long => a.min(b),
            Direction::Short => a.max(b),
        }
    }

    /// Has `price` reached `target`?
    pub fn target_reached(&self, price: f64, target: f64) -> bool {
        match self {
            Direction::Long => price >= target,
            Direction::Short => price <= target,
        }
    }

    /// Has `price` reached `stop`?
    pub fn stop_reached(&self, price: f64, stop: f64) -> bool {
        match self {
            Direction::Long => price <= stop,
            Direction::Short => price >= stop,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Entry, stop and target of a trade idea
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
}

impl TradeLevels {
    pub fn new(entry: f64, stop: f64, target: f64) -> Self {
        Self { entry, stop, target }
    }

    pub fn risk(&self) -> f64 {
        (self.entry - self.stop).abs()
    }

    pub fn reward(&self) -> f64 {
        (self.target - self.entry).abs()
    }

    /// Reward divided by risk; 0.0 when risk is zero
    pub fn reward_risk(&self) -> f64 {
        let risk = self.risk();
        if risk > 0.0 {
            self.reward() / risk
        } else {
            0.0
        }
    }

    /// Stop on the adverse side of entry and target on the favourable side
    pub fn is_coherent(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.stop < self.entry && self.target > self.entry,
            Direction::Short => self.stop > self.entry && self.target < self.entry,
        }
    }

    /// Signed distance from entry to `exit`, positive when in favour
    pub fn realized_distance(&self, direction: Direction, exit: f64) -> f64 {
        (exit - self.entry) * direction.sign()
    }
}
