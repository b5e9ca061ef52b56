//! Momentum measures
//!
//! `momentum_pct` + `classify` give the plain fixed-threshold reading.
//! `momentum_significance` compares the current short-window momentum with
//! its own trailing distribution instead of a fixed threshold.

use crate::types::{Direction, PriceBar};
use serde::{Deserialize, Serialize};

/// z-score beyond which momentum counts as significant
pub const SIGNIFICANCE_Z: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomentumBias {
    Bullish,
    Bearish,
    Sideways,
}

impl MomentumBias {
    /// Direction the bias supports, if any
    pub fn direction(&self) -> Option<Direction> {
        match self {
            MomentumBias::Bullish => Some(Direction::Long),
            MomentumBias::Bearish => Some(Direction::Short),
            MomentumBias::Sideways => None,
        }
    }
}

/// Percent change of the last close versus the close `lookback` bars earlier
pub fn momentum_pct(bars: &[PriceBar], lookback: usize) -> Option<f64> {
    if lookback == 0 || bars.len() < lookback + 1 {
        return None;
    }
    let last = bars[bars.len() - 1].close;
    let base = bars[bars.len() - 1 - lookback].close;
    if base <= 0.0 {
        return None;
    }
    Some((last - base) / base * 100.0)
}

pub fn classify(pct: f64, threshold_pct: f64) -> MomentumBias {
    if pct > threshold_pct {
        MomentumBias::Bullish
    } else if pct < -threshold_pct {
        MomentumBias::Bearish
    } else {
        MomentumBias::Sideways
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumSignificance {
    pub bias: MomentumBias,
    pub z_score: f64,
    /// |z| / 1.5, capped at 3
    pub confidence: f64,
}

/// Significance of the latest `window`-bar momentum against the preceding
/// `sample` momentum readings.
///
/// Returns `None` when there are fewer than `window + sample + 1` closes or
/// the trailing distribution has no spread.
pub fn momentum_significance(closes: &[f64], window: usize, sample: usize) -> Option<MomentumSignificance> {
    if window == 0 || sample < 2 || closes.len() < window + sample + 1 {
        return None;
    }

    let readings: Vec<f64> = (window..closes.len())
        .filter(|&i| closes[i - window] > 0.0)
        .map(|i| (closes[i] - closes[i - window]) / closes[i - window])
        .collect();
    let (current, history) = readings.split_last()?;
    if history.len() < sample {
        return None;
    }
    let history = &history[history.len() - sample..];

    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let variance = history.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();
    if !std.is_finite() || std <= f64::EPSILON {
        return None;
    }

    let z_score = (current - mean) / std;
    let bias = if z_score > SIGNIFICANCE_Z {
        MomentumBias::Bullish
    } else if z_score < -SIGNIFICANCE_Z {
        MomentumBias::Bearish
    } else {
        MomentumBias::Sideways
    };

    Some(MomentumSignificance {
        bias,
        z_score,
        confidence: (z_score.abs() / SIGNIFICANCE_Z).min(3.0),
    })
}
