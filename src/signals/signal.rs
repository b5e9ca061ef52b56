//! Finalized trade signal

use crate::types::{Direction, TradeLevels};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Active,
    Completed,
}

/// A vetted trade recommendation.
///
/// Entry, stop and target are fixed at construction. There are getters but
/// no setters, so nothing downstream can move them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    id: Uuid,
    instrument: String,
    direction: Direction,
    levels: TradeLevels,
    reliability_score: f64,
    strategy_label: String,
    rationale: Vec<String>,
    created_at: DateTime<Utc>,
    status: SignalStatus,
}

impl Signal {
    pub fn new(
        instrument: &str,
        direction: Direction,
        levels: TradeLevels,
        reliability_score: f64,
        strategy_label: String,
        rationale: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            direction,
            levels,
            reliability_score: reliability_score.clamp(0.0, 10.0),
            strategy_label,
            rationale,
            created_at,
            status: SignalStatus::Active,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn levels(&self) -> TradeLevels {
        self.levels
    }

    pub fn entry(&self) -> f64 {
        self.levels.entry
    }

    pub fn stop(&self) -> f64 {
        self.levels.stop
    }

    pub fn target(&self) -> f64 {
        self.levels.target
    }

    pub fn reward_risk(&self) -> f64 {
        self.levels.reward_risk()
    }

    pub fn reliability_score(&self) -> f64 {
        self.reliability_score
    }

    pub fn strategy_label(&self) -> &str {
        &self.strategy_label
    }

    pub fn rationale(&self) -> &[String] {
        &self.rationale
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> SignalStatus {
        self.status
    }

    pub(crate) fn into_completed(mut self) -> Self {
        self.status = SignalStatus::Completed;
        self
    }
}
