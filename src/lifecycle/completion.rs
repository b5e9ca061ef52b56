//! Completion evaluation
//!
//! A signal completes on the first observed price at or beyond its target
//! (WIN) or its stop (LOSS). Target is checked before stop.

use crate::signals::Signal;
use crate::types::{Direction, TradeLevels};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeResult {
    Win,
    Loss,
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeResult::Win => write!(f, "WIN"),
            TradeResult::Loss => write!(f, "LOSS"),
        }
    }
}

/// Outcome of a completed signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub signal_id: Uuid,
    pub instrument: String,
    pub direction: Direction,
    pub strategy_label: String,
    pub reliability_score: f64,
    /// Levels as committed at creation
    pub levels: TradeLevels,
    pub result: TradeResult,
    /// The observed price that crossed
    pub exit_price: f64,
    /// Signed distance from entry to exit, positive when in favour
    pub realized_distance: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: i64,
}

/// Check `price` against the signal's target and stop
pub fn evaluate(signal: &Signal, price: f64, observed_at: DateTime<Utc>) -> Option<CompletionRecord> {
    let direction = signal.direction();
    let levels = signal.levels();

    let result = if direction.target_reached(price, levels.target) {
        TradeResult::Win
    } else if direction.stop_reached(price, levels.stop) {
        TradeResult::Loss
    } else {
        return None;
    };

    Some(CompletionRecord {
        signal_id: signal.id(),
        instrument: signal.instrument().to_string(),
        direction,
        strategy_label: signal.strategy_label().to_string(),
        reliability_score: signal.reliability_score(),
        levels,
        result,
        exit_price: price,
        realized_distance: levels.realized_distance(direction, price),
        created_at: signal.created_at(),
        completed_at: observed_at,
        duration_secs: (observed_at - signal.created_at()).num_seconds().max(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signal(direction: Direction, entry: f64, stop: f64, target: f64) -> Signal {
        Signal::new(
            "ETHUSDT",
            direction,
            TradeLevels::new(entry, stop, target),
            8.0,
            "BREAKOUT_RETEST".to_string(),
            Vec::new(),
            Utc::now(),
        )
    }

    #[test]
    fn test_long_outcomes() {
        let s = signal(Direction::Long, 100.0, 98.0, 106.0);
        let now = s.created_at() + Duration::minutes(30);
        assert!(evaluate(&s, 103.0, now).is_none());

        let win = evaluate(&s, 106.0, now).unwrap();
        assert_eq!(win.result, TradeResult::Win);
        assert_eq!(win.realized_distance, 6.0);
        assert_eq!(win.duration_secs, 1800);

        let loss = evaluate(&s, 97.9, now).unwrap();
        assert_eq!(loss.result, TradeResult::Loss);
        assert!((loss.realized_distance + 2.1).abs() < 1e-9);
    }

    #[test]
    fn test_short_outcomes() {
        let s = signal(Direction::Short, 100.0, 102.0, 95.0);
        let now = Utc::now();
        assert_eq!(evaluate(&s, 94.0, now).unwrap().result, TradeResult::Win);
        assert_eq!(evaluate(&s, 102.0, now).unwrap().result, TradeResult::Loss);
        assert!(evaluate(&s, 99.0, now).is_none());
        assert!(evaluate(&s, 94.0, now).unwrap().realized_distance > 0.0);
    }
}
