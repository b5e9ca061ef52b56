//! Liquidity sweep detection
//!
//! Equal highs (lows) near the extreme of the recent window mark resting
//! liquidity. A sweep is a price push through that cluster by more than a
//! fraction of ATR. The latest bar is excluded from the window so that the
//! push itself cannot define the level it is sweeping.

use super::volatility::{atr, ATR_PERIOD};
use crate::types::{Direction, PriceBar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Bars before the latest one scanned for equal highs/lows
    pub lookback: usize,
    /// Relative distance from the window extreme counted as "equal"
    pub equal_tolerance_pct: f64,
    /// Equal touches needed before a level counts as liquidity
    pub min_equal_touches: u32,
    /// Penetration beyond the level, in ATR multiples
    pub penetration_atr_mult: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            equal_tolerance_pct: 0.002,
            min_equal_touches: 2,
            penetration_atr_mult: 0.1,
        }
    }
}

/// Which side of the book was swept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepSide {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepEvent {
    pub level: f64,
    pub side: SweepSide,
    /// Number of equal touches in the cluster
    pub strength: u32,
    /// Distance of the current price beyond the level
    pub penetration: f64,
}

impl SweepEvent {
    /// Reversal direction implied by the sweep
    pub fn reversal(&self) -> Direction {
        match self.side {
            SweepSide::High => Direction::Short,
            SweepSide::Low => Direction::Long,
        }
    }
}

pub fn detect_sweep(bars: &[PriceBar], current_price: f64, config: &SweepConfig) -> Option<SweepEvent> {
    if config.lookback == 0 || bars.len() < config.lookback + 1 {
        return None;
    }

    let end = bars.len() - 1;
    let window = &bars[end - config.lookback..end];
    let min_move = config.penetration_atr_mult * atr(bars, ATR_PERIOD);

    let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let equal_highs = window
        .iter()
        .filter(|b| highest > 0.0 && (b.high - highest).abs() / highest <= config.equal_tolerance_pct)
        .count() as u32;
    if equal_highs >= config.min_equal_touches && current_price - highest > min_move {
        return Some(SweepEvent {
            level: highest,
            side: SweepSide::High,
            strength: equal_highs,
            penetration: current_price - highest,
        });
    }

    let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let equal_lows = window
        .iter()
        .filter(|b| lowest > 0.0 && (b.low - lowest).abs() / lowest <= config.equal_tolerance_pct)
        .count() as u32;
    if equal_lows >= config.min_equal_touches && lowest - current_price > min_move {
        return Some(SweepEvent {
            level: lowest,
            side: SweepSide::Low,
            strength: equal_lows,
            penetration: lowest - current_price,
        });
    }

    None
}
