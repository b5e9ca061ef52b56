//! Breakout-retest detector
//!
//! Price closes beyond a clustered support/resistance level, ideally after
//! coming back to test it, with the last candles leaning the same way.
//! The score rewards well-touched levels, a retest, candle confirmation and
//! above-average volume.

use super::{check_levels, AnalysisContext, Candidate, Detector, Strategy};
use crate::error::Rejection;
use crate::indicators::levels::{support_resistance, Level, LevelConfig, SupportResistance};
use crate::indicators::volatility::{atr, ATR_PERIOD};
use crate::indicators::{candle_confirmation, volume_ratio, CandleConfig};
use crate::types::{Direction, PriceBar, TradeLevels};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutRetestConfig {
    pub min_bars: usize,
    pub levels: LevelConfig,
    pub candle: CandleConfig,

    /// Price must clear the level by this fraction
    pub breakout_tolerance_pct: f64,
    pub retest_window: usize,
    pub retest_tolerance_pct: f64,
    /// Reject when no retest happened
    pub require_retest: bool,
    /// Reject when the candles do not confirm
    pub require_candle: bool,

    pub touch_cap: u32,
    pub touch_weight: f64,
    pub retest_weight: f64,
    pub candle_weight: f64,
    pub volume_weight: f64,
    pub volume_lookback: usize,
    /// Volume ratio that earns the volume weight
    pub volume_threshold: f64,
    pub min_score: f64,

    /// Entry placed at least this far beyond the level
    pub entry_offset_pct: f64,
    /// Stop placed this far back through the level
    pub stop_buffer_pct: f64,
    pub target_atr_mult: f64,
    /// Target kept this far short of the next level
    pub next_level_buffer_pct: f64,
    pub min_reward_risk: f64,
}

impl Default for BreakoutRetestConfig {
    fn default() -> Self {
        Self {
            min_bars: 50,
            levels: LevelConfig::default(),
            candle: CandleConfig::default(),
            breakout_tolerance_pct: 0.001,
            retest_window: 10,
            retest_tolerance_pct: 0.003,
            require_retest: false,
            require_candle: false,
            touch_cap: 4,
            touch_weight: 1.0,
            retest_weight: 3.0,
            candle_weight: 2.0,
            volume_weight: 1.0,
            volume_lookback: 20,
            volume_threshold: 1.2,
            min_score: 7.0,
            entry_offset_pct: 0.001,
            stop_buffer_pct: 0.003,
            target_atr_mult: 2.0,
            next_level_buffer_pct: 0.005,
            min_reward_risk: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BreakoutRetestDetector {
    config: BreakoutRetestConfig,
}

/// A level the current price has cleared
#[derive(Debug, Clone, Copy)]
struct Breakout {
    level: Level,
    direction: Direction,
}

impl BreakoutRetestDetector {
    pub fn new(config: BreakoutRetestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BreakoutRetestConfig {
        &self.config
    }

    /// Resistances are checked first, in rank order
    fn find_breakout(&self, sr: &SupportResistance, price: f64) -> Option<Breakout> {
        let tol = self.config.breakout_tolerance_pct;
        sr.resistances
            .iter()
            .find(|l| price > l.price * (1.0 + tol))
            .map(|level| Breakout { level: *level, direction: Direction::Long })
            .or_else(|| {
                sr.supports
                    .iter()
                    .find(|l| price < l.price * (1.0 - tol))
                    .map(|level| Breakout { level: *level, direction: Direction::Short })
            })
    }

    fn retested(&self, bars: &[PriceBar], level: f64) -> bool {
        if bars.len() < self.config.retest_window {
            return false;
        }
        let tol = self.config.retest_tolerance_pct;
        bars[bars.len() - self.config.retest_window..].iter().any(|b| {
            (b.low - level).abs() / level < tol || (b.high - level).abs() / level < tol
        })
    }

    fn trade_levels(&self, breakout: &Breakout, sr: &SupportResistance, price: f64, atr: f64) -> TradeLevels {
        let c = &self.config;
        let level = breakout.level.price;
        match breakout.direction {
            Direction::Long => {
                let entry = price.max(level * (1.0 + c.entry_offset_pct));
                let stop = level * (1.0 - c.stop_buffer_pct);
                let mut target = entry + c.target_atr_mult * atr;
                if let Some(next) = sr
                    .resistances
                    .iter()
                    .filter(|l| l.price > price)
                    .min_by(|a, b| a.price.total_cmp(&b.price))
                {
                    target = target.min(next.price * (1.0 - c.next_level_buffer_pct));
                }
                TradeLevels::new(entry, stop, target)
            }
            Direction::Short => {
                let entry = price.min(level * (1.0 - c.entry_offset_pct));
                let stop = level * (1.0 + c.stop_buffer_pct);
                let mut target = entry - c.target_atr_mult * atr;
                if let Some(next) = sr
                    .supports
                    .iter()
                    .filter(|l| l.price < price)
                    .max_by(|a, b| a.price.total_cmp(&b.price))
                {
                    target = target.max(next.price * (1.0 + c.next_level_buffer_pct));
                }
                TradeLevels::new(entry, stop, target)
            }
        }
    }
}

impl Detector for BreakoutRetestDetector {
    fn strategy(&self) -> Strategy {
        Strategy::BreakoutRetest
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>) -> Result<Candidate, Rejection> {
        let c = &self.config;
        ctx.require_bars(c.min_bars)?;
        let bars = ctx.series.bars();
        let price = ctx.current_price;

        let sr = support_resistance(bars, &c.levels);
        if sr.is_empty() {
            return Err(Rejection::NoSetup("no support/resistance levels"));
        }

        let breakout = self
            .find_breakout(&sr, price)
            .ok_or(Rejection::NoSetup("no breakout"))?;
        let direction = breakout.direction;
        let level = breakout.level;

        let retest = self.retested(bars, level.price);
        if c.require_retest && !retest {
            return Err(Rejection::NoSetup("retest required"));
        }

        let pattern = candle_confirmation(bars, &c.candle);
        let candle_agrees = match pattern {
            Some(p) if p.direction() != direction => return Err(Rejection::NoDirectionalBias),
            Some(_) => true,
            None => false,
        };
        if c.require_candle && !candle_agrees {
            return Err(Rejection::NoSetup("candle confirmation required"));
        }

        let mut rationale = Vec::new();
        let mut score = level.touches.min(c.touch_cap) as f64 * c.touch_weight;
        rationale.push(format!(
            "{} break of {:.5} ({} touches)",
            direction, level.price, level.touches
        ));
        if retest {
            score += c.retest_weight;
            rationale.push("retest confirmed".to_string());
        }
        if candle_agrees {
            score += c.candle_weight;
            rationale.push("candle confirmation".to_string());
        }
        if let Some(ratio) = volume_ratio(bars, c.volume_lookback) {
            if ratio > c.volume_threshold {
                score += c.volume_weight;
                rationale.push(format!("volume {:.1}x", ratio));
            }
        }
        let score = score.min(10.0);

        if score < c.min_score {
            return Err(Rejection::ScoreBelowMinimum { score, minimum: c.min_score });
        }

        let levels = self.trade_levels(&breakout, &sr, price, atr(bars, ATR_PERIOD));
        check_levels(direction, &levels, c.min_reward_risk)?;

        Ok(Candidate {
            instrument: ctx.instrument.to_string(),
            direction,
            levels,
            score,
            rationale,
            strategy: Strategy::BreakoutRetest,
            key_level: level.price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::fixtures::{bar, series};

    /// Zig-zag between 90 and 110 for 48 bars, one bar in the middle, then
    /// a final bar breaking out above 110.
    fn breakout_bars() -> Vec<PriceBar> {
        let mut bars: Vec<PriceBar> = (0..48)
            .map(|i| match i % 4 {
                0 => bar(i, 95.5, 101.0, 90.0, 95.5, 10.0),
                2 => bar(i, 104.5, 110.0, 99.0, 104.5, 10.0),
                _ => bar(i, 100.0, 105.0, 95.0, 100.0, 10.0),
            })
            .collect();
        bars.push(bar(48, 100.0, 105.0, 95.0, 100.0, 10.0));
        bars.push(bar(49, 109.0, 111.3, 108.9, 111.2, 10.0));
        bars
    }

    /// Mirror image: final bar breaks down through 90
    fn breakdown_bars() -> Vec<PriceBar> {
        let mut bars: Vec<PriceBar> = (0..48)
            .map(|i| match i % 4 {
                0 => bar(i, 104.5, 110.0, 99.0, 104.5, 10.0),
                2 => bar(i, 95.5, 101.0, 90.0, 95.5, 10.0),
                _ => bar(i, 100.0, 105.0, 95.0, 100.0, 10.0),
            })
            .collect();
        bars.push(bar(48, 100.0, 105.0, 95.0, 100.0, 10.0));
        bars.push(bar(49, 91.0, 91.1, 88.7, 88.8, 10.0));
        bars
    }

    #[test]
    fn test_long_breakout_with_retest() {
        let s = series(breakout_bars());
        let ctx = AnalysisContext::new(&s, None).unwrap();
        let candidate = BreakoutRetestDetector::default().analyze(&ctx).unwrap();

        assert_eq!(candidate.direction, Direction::Long);
        assert_eq!(candidate.strategy, Strategy::BreakoutRetest);
        assert!((candidate.key_level - 110.0).abs() < 1e-9);
        assert!(candidate.score >= 7.0);
        assert!((candidate.levels.entry - 111.2).abs() < 1e-9);
        assert!((candidate.levels.stop - 110.0 * 0.997).abs() < 1e-9);
        assert!(candidate.levels.target > candidate.levels.entry);
        assert!(candidate.reward_risk() >= 1.5);
    }

    #[test]
    fn test_short_breakdown() {
        let s = series(breakdown_bars());
        let ctx = AnalysisContext::new(&s, None).unwrap();
        let candidate = BreakoutRetestDetector::default().analyze(&ctx).unwrap();

        assert_eq!(candidate.direction, Direction::Short);
        assert!((candidate.key_level - 90.0).abs() < 1e-9);
        assert!(candidate.levels.stop > candidate.levels.entry);
        assert!(candidate.levels.target < candidate.levels.entry);
    }

    #[test]
    fn test_no_breakout_inside_range() {
        let s = series(breakout_bars());
        let ctx = AnalysisContext::new(&s, None).unwrap().with_price(100.0);
        let err = BreakoutRetestDetector::default().analyze(&ctx).unwrap_err();
        assert_eq!(err, Rejection::NoSetup("no breakout"));
    }

    #[test]
    fn test_short_history_is_insufficient() {
        let s = series(breakout_bars().into_iter().take(20).collect());
        let ctx = AnalysisContext::new(&s, None).unwrap();
        let err = BreakoutRetestDetector::default().analyze(&ctx).unwrap_err();
        assert_eq!(err, Rejection::InsufficientData { needed: 50, got: 20 });
    }

    #[test]
    fn test_opposing_candles_reject() {
        let mut bars = breakout_bars();
        bars.truncate(47);
        bars.push(bar(47, 106.0, 106.1, 103.9, 104.0, 10.0));
        bars.push(bar(48, 104.0, 104.1, 101.9, 102.0, 10.0));
        bars.push(bar(49, 102.0, 102.1, 99.9, 100.0, 10.0));
        let s = series(bars);
        let ctx = AnalysisContext::new(&s, None).unwrap().with_price(111.2);
        let err = BreakoutRetestDetector::default().analyze(&ctx).unwrap_err();
        assert_eq!(err, Rejection::NoDirectionalBias);
    }

    #[test]
    fn test_required_candle_missing() {
        let config = BreakoutRetestConfig { require_candle: true, ..Default::default() };
        let s = series(breakout_bars());
        let ctx = AnalysisContext::new(&s, None).unwrap();
        let err = BreakoutRetestDetector::new(config).analyze(&ctx).unwrap_err();
        assert_eq!(err, Rejection::NoSetup("candle confirmation required"));
    }

    /// Same range, but the last ten bars stay mid-range before the break,
    /// so nothing comes back to 110.
    fn unretested_breakout_bars() -> Vec<PriceBar> {
        let mut bars = breakout_bars();
        bars.truncate(40);
        for i in 40..49 {
            bars.push(bar(i, 100.0, 105.0, 95.0, 100.0, 10.0));
        }
        bars.push(bar(49, 109.0, 111.3, 108.9, 111.2, 10.0));
        bars
    }

    #[test]
    fn test_required_retest() {
        let config = BreakoutRetestConfig { require_retest: true, ..Default::default() };
        let detector = BreakoutRetestDetector::new(config);

        let s = series(unretested_breakout_bars());
        let ctx = AnalysisContext::new(&s, None).unwrap();
        assert_eq!(detector.analyze(&ctx).unwrap_err(), Rejection::NoSetup("retest required"));

        let s = series(breakout_bars());
        let ctx = AnalysisContext::new(&s, None).unwrap();
        assert_eq!(detector.analyze(&ctx).unwrap().direction, Direction::Long);
    }

    #[test]
    fn test_high_minimum_score_rejects() {
        let config = BreakoutRetestConfig { min_score: 9.5, ..Default::default() };
        let s = series(breakout_bars());
        let ctx = AnalysisContext::new(&s, None).unwrap();
        let err = BreakoutRetestDetector::new(config).analyze(&ctx).unwrap_err();
        assert!(matches!(err, Rejection::ScoreBelowMinimum { .. }));
    }
}
