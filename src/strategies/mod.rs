//! Pattern detectors
//!
//! Each detector looks at the same bar history independently and either
//! proposes a directional `Candidate` or explains why not with a `Rejection`.

pub mod breakout_retest;
pub mod liquidity_sweep;

use crate::error::Rejection;
use crate::types::{Direction, InstrumentSeries, TradeLevels};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use breakout_retest::{BreakoutRetestConfig, BreakoutRetestDetector};
pub use liquidity_sweep::{LiquiditySweepConfig, LiquiditySweepDetector};

/// Detector identity. The ordering fixes how combined labels are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strategy {
    BreakoutRetest,
    LiquiditySweep,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::BreakoutRetest => "BREAKOUT_RETEST",
            Strategy::LiquiditySweep => "LIQUIDITY_SWEEP",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A detector's proposal. Transient: it either becomes part of a Signal or
/// is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub instrument: String,
    pub direction: Direction,
    pub levels: TradeLevels,
    /// 0-10
    pub score: f64,
    pub rationale: Vec<String>,
    pub strategy: Strategy,
    /// Price level the setup is anchored on (broken level, swept level)
    pub key_level: f64,
}

impl Candidate {
    pub fn reward_risk(&self) -> f64 {
        self.levels.reward_risk()
    }
}

/// Everything a detector may look at for one analysis pass
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub instrument: &'a str,
    /// Primary timeframe
    pub series: &'a InstrumentSeries,
    /// Optional shorter timeframe used for momentum confirmation
    pub confirmation: Option<&'a InstrumentSeries>,
    pub current_price: f64,
}

impl<'a> AnalysisContext<'a> {
    /// Context priced at the last close of the primary series
    pub fn new(series: &'a InstrumentSeries, confirmation: Option<&'a InstrumentSeries>) -> Result<Self, Rejection> {
        let current_price = series
            .last_close()
            .ok_or(Rejection::InsufficientData { needed: 1, got: 0 })?;
        Ok(Self {
            instrument: &series.instrument,
            series,
            confirmation,
            current_price,
        })
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.current_price = price;
        self
    }

    pub(crate) fn require_bars(&self, needed: usize) -> Result<(), Rejection> {
        let got = self.series.len();
        if got < needed {
            return Err(Rejection::InsufficientData { needed, got });
        }
        Ok(())
    }
}

pub trait Detector: Send + Sync {
    fn strategy(&self) -> Strategy;

    fn analyze(&self, ctx: &AnalysisContext<'_>) -> Result<Candidate, Rejection>;
}

/// Shared final gate: coherent levels and a minimum reward:risk
pub(crate) fn check_levels(direction: Direction, levels: &TradeLevels, min_reward_risk: f64) -> Result<(), Rejection> {
    if !levels.is_coherent(direction) {
        return Err(Rejection::IncoherentLevels);
    }
    let reward_risk = levels.reward_risk();
    if reward_risk < min_reward_risk {
        return Err(Rejection::RewardRiskBelowMinimum {
            reward_risk,
            minimum: min_reward_risk,
        });
    }
    Ok(())
}
