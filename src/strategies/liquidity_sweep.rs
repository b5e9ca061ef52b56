//! Liquidity-sweep momentum detector
//!
//! A push through a cluster of equal highs (lows) that is expected to
//! reverse. HIGH sweeps propose SHORT, LOW sweeps propose LONG. Oscillator
//! extremes, shorter-timeframe momentum and a sweep against the prevailing
//! trend all add to the score.

use super::{check_levels, AnalysisContext, Candidate, Detector, Strategy};
use crate::error::Rejection;
use crate::indicators::levels::{support_resistance, LevelConfig};
use crate::indicators::momentum::{classify, momentum_pct, momentum_significance, MomentumBias};
use crate::indicators::oscillator::rsi;
use crate::indicators::sweep::{detect_sweep, SweepConfig, SweepEvent};
use crate::indicators::volatility::{atr, ATR_PERIOD};
use crate::indicators::{candle_confirmation, CandleConfig};
use crate::types::{Direction, InstrumentSeries, PriceBar, TradeLevels};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquiditySweepConfig {
    pub min_bars: usize,
    pub sweep: SweepConfig,
    pub levels: LevelConfig,
    pub candle: CandleConfig,

    pub strength_cap: u32,
    pub strength_weight: f64,

    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub rsi_weight: f64,

    /// Confirmation-timeframe momentum
    pub momentum_lookback: usize,
    pub momentum_threshold_pct: f64,
    pub momentum_weight: f64,
    pub significance_window: usize,
    pub significance_sample: usize,

    /// Primary-timeframe trend used for the counter-trend check
    pub trend_lookback: usize,
    pub trend_weight: f64,

    pub min_score: f64,

    /// Stop distance beyond the sweep extreme, in ATR
    pub stop_atr_buffer: f64,
    pub target_atr_mult: f64,
    /// Target kept this far short of the next level
    pub next_level_buffer_pct: f64,
    pub min_reward_risk: f64,
}

impl Default for LiquiditySweepConfig {
    fn default() -> Self {
        Self {
            min_bars: 50,
            sweep: SweepConfig::default(),
            levels: LevelConfig::default(),
            candle: CandleConfig::default(),
            strength_cap: 3,
            strength_weight: 1.0,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            rsi_weight: 3.0,
            momentum_lookback: 20,
            momentum_threshold_pct: 2.0,
            momentum_weight: 2.0,
            significance_window: 10,
            significance_sample: 100,
            trend_lookback: 40,
            trend_weight: 2.0,
            min_score: 6.0,
            stop_atr_buffer: 0.25,
            target_atr_mult: 2.0,
            next_level_buffer_pct: 0.002,
            min_reward_risk: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiquiditySweepDetector {
    config: LiquiditySweepConfig,
}

impl LiquiditySweepDetector {
    pub fn new(config: LiquiditySweepConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LiquiditySweepConfig {
        &self.config
    }

    /// Momentum bias on the shorter timeframe. The adaptive z-score reading
    /// is used when there is enough history, the fixed threshold otherwise.
    fn confirmation_bias(&self, confirmation: &InstrumentSeries) -> Option<MomentumBias> {
        let c = &self.config;
        let closes = confirmation.closes();
        if let Some(sig) = momentum_significance(&closes, c.significance_window, c.significance_sample) {
            return Some(sig.bias);
        }
        momentum_pct(confirmation.bars(), c.momentum_lookback).map(|pct| classify(pct, c.momentum_threshold_pct))
    }

    fn trade_levels(&self, sweep: &SweepEvent, bars: &[PriceBar], price: f64, atr: f64) -> TradeLevels {
        let c = &self.config;
        let sr = support_resistance(bars, &c.levels);
        let latest = bars.last();
        let entry = price;

        match sweep.reversal() {
            Direction::Short => {
                let extreme = latest.map_or(price, |b| b.high).max(price).max(sweep.level);
                let stop = extreme + c.stop_atr_buffer * atr;
                let mut target = entry - c.target_atr_mult * atr;
                if let Some(next) = sr.nearest_below(sweep.level) {
                    target = target.max(next.price * (1.0 + c.next_level_buffer_pct));
                }
                TradeLevels::new(entry, stop, target)
            }
            Direction::Long => {
                let extreme = latest.map_or(price, |b| b.low).min(price).min(sweep.level);
                let stop = extreme - c.stop_atr_buffer * atr;
                let mut target = entry + c.target_atr_mult * atr;
                if let Some(next) = sr.nearest_above(sweep.level) {
                    target = target.min(next.price * (1.0 - c.next_level_buffer_pct));
                }
                TradeLevels::new(entry, stop, target)
            }
        }
    }
}

impl Detector for LiquiditySweepDetector {
    fn strategy(&self) -> Strategy {
        Strategy::LiquiditySweep
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>) -> Result<Candidate, Rejection> {
        let c = &self.config;
        ctx.require_bars(c.min_bars)?;
        let bars = ctx.series.bars();
        let price = ctx.current_price;

        let sweep = detect_sweep(bars, price, &c.sweep).ok_or(Rejection::NoSetup("no liquidity sweep"))?;
        let direction = sweep.reversal();

        if let Some(pattern) = candle_confirmation(bars, &c.candle) {
            if pattern.direction() != direction {
                return Err(Rejection::NoDirectionalBias);
            }
        }

        let mut rationale = vec![format!(
            "{:?} sweep of {:.5} ({} equal touches)",
            sweep.side, sweep.level, sweep.strength
        )];
        let mut score = sweep.strength.min(c.strength_cap) as f64 * c.strength_weight;

        let osc = rsi(&ctx.series.closes(), c.rsi_period);
        let extreme = match direction {
            Direction::Short => osc >= c.rsi_overbought,
            Direction::Long => osc <= c.rsi_oversold,
        };
        if extreme {
            score += c.rsi_weight;
            rationale.push(format!("RSI {:.1}", osc));
        }

        if let Some(bias) = ctx.confirmation.and_then(|s| self.confirmation_bias(s)) {
            if bias.direction() == Some(direction) {
                score += c.momentum_weight;
                rationale.push(format!("{} momentum {:?}", ctx.confirmation.map_or("", |s| s.timeframe.as_str()), bias));
            }
        }

        if let Some(pct) = momentum_pct(bars, c.trend_lookback) {
            let trend = classify(pct, c.momentum_threshold_pct);
            if trend.direction() == Some(direction) {
                score += c.trend_weight;
                rationale.push(format!("counter-trend sweep, trend {:+.2}%", pct));
            }
        }

        let score = score.min(10.0);
        if score < c.min_score {
            return Err(Rejection::ScoreBelowMinimum { score, minimum: c.min_score });
        }

        let levels = self.trade_levels(&sweep, bars, price, atr(bars, ATR_PERIOD));
        check_levels(direction, &levels, c.min_reward_risk)?;

        Ok(Candidate {
            instrument: ctx.instrument.to_string(),
            direction,
            levels,
            score,
            rationale,
            strategy: Strategy::LiquiditySweep,
            key_level: sweep.level,
        })
    }
}
