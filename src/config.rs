//! Engine configuration
//!
//! Every threshold, weight and bonus used by the detectors, the combiner and
//! the cache is a named field here. All sections are `#[serde(default)]`, so
//! a JSON file only needs the values it overrides.

use crate::lifecycle::CacheConfig;
use crate::signals::CombinerConfig;
use crate::strategies::{BreakoutRetestConfig, LiquiditySweepConfig};
use crate::types::Timeframe;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeframe both detectors analyze
    pub primary_timeframe: Timeframe,
    /// Shorter timeframe for momentum confirmation
    pub confirmation_timeframe: Option<Timeframe>,
    /// Bars requested per analysis cycle
    pub bar_count: usize,
    pub breakout_retest: BreakoutRetestConfig,
    pub liquidity_sweep: LiquiditySweepConfig,
    pub combiner: CombinerConfig,
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            primary_timeframe: Timeframe::M15,
            confirmation_timeframe: Some(Timeframe::M5),
            bar_count: 200,
            breakout_retest: BreakoutRetestConfig::default(),
            liquidity_sweep: LiquiditySweepConfig::default(),
            combiner: CombinerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Wider tolerances for crypto pairs on hourly bars
    pub fn crypto() -> Self {
        let mut config = Self {
            primary_timeframe: Timeframe::H1,
            confirmation_timeframe: Some(Timeframe::M15),
            ..Default::default()
        };

        let br = &mut config.breakout_retest;
        br.levels.tolerance_pct = 0.015;       // 1.5% level clustering
        br.breakout_tolerance_pct = 0.008;
        br.entry_offset_pct = 0.005;
        br.stop_buffer_pct = 0.008;
        br.next_level_buffer_pct = 0.01;

        let ls = &mut config.liquidity_sweep;
        ls.levels.tolerance_pct = 0.015;
        ls.sweep.lookback = 24;                // one day of hourly bars
        ls.sweep.equal_tolerance_pct = 0.01;
        ls.next_level_buffer_pct = 0.01;

        config
    }

    /// Load overrides from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
