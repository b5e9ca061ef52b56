//! Candle-colour confirmation and relative volume

use crate::types::{Direction, PriceBar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleConfig {
    /// Newest bars inspected
    pub window: usize,
    /// Bars of the dominant colour required inside the window
    pub majority: usize,
    /// Minimum body / range of the last bar
    pub min_body_ratio: f64,
}

impl Default for CandleConfig {
    fn default() -> Self {
        Self {
            window: 3,
            majority: 2,
            min_body_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandlePattern {
    Bullish,
    Bearish,
}

impl CandlePattern {
    pub fn direction(&self) -> Direction {
        match self {
            CandlePattern::Bullish => Direction::Long,
            CandlePattern::Bearish => Direction::Short,
        }
    }
}

/// Majority colour in the window plus a strong last body of the same colour
pub fn candle_confirmation(bars: &[PriceBar], config: &CandleConfig) -> Option<CandlePattern> {
    if config.window == 0 || bars.len() < config.window {
        return None;
    }

    let window = &bars[bars.len() - config.window..];
    let last = window[window.len() - 1];
    let range = last.range();
    if range <= 0.0 || last.body() < range * config.min_body_ratio {
        return None;
    }

    let bullish = window.iter().filter(|b| b.is_bullish()).count();
    let bearish = window.iter().filter(|b| b.is_bearish()).count();

    if bullish >= config.majority && last.is_bullish() {
        Some(CandlePattern::Bullish)
    } else if bearish >= config.majority && last.is_bearish() {
        Some(CandlePattern::Bearish)
    } else {
        None
    }
}

/// Last bar volume over the mean volume of the newest `lookback` bars
pub fn volume_ratio(bars: &[PriceBar], lookback: usize) -> Option<f64> {
    if lookback == 0 || bars.len() < lookback {
        return None;
    }
    let window = &bars[bars.len() - lookback..];
    let mean = window.iter().map(|b| b.volume).sum::<f64>() / lookback as f64;
    if mean <= 0.0 {
        return None;
    }
    Some(window[window.len() - 1].volume / mean)
}
