//! Error types
//!
//! `Rejection` is the normal "no trade" outcome of a detector or the combiner.
//! It is never surfaced as a failure, only logged at debug. `EngineError`
//! covers the faults that must never happen silently.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("insufficient data: need {needed} bars, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("no setup: {0}")]
    NoSetup(&'static str),

    #[error("score {score:.2} below minimum {minimum:.2}")]
    ScoreBelowMinimum { score: f64, minimum: f64 },

    #[error("reward:risk {reward_risk:.2} below minimum {minimum:.2}")]
    RewardRiskBelowMinimum { reward_risk: f64, minimum: f64 },

    #[error("stop/target on the wrong side of entry")]
    IncoherentLevels,

    #[error("no directional bias")]
    NoDirectionalBias,

    #[error("candidates disagree on direction")]
    ConflictingDirections,

    #[error("both candidates come from the same strategy")]
    DuplicateStrategy,

    #[error("no candidates")]
    NoCandidates,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invariant violation: {instrument} already has active signal {active_id}")]
    InvariantViolation { instrument: String, active_id: Uuid },

    #[error("worker for {0} has shut down")]
    WorkerClosed(String),

    #[error("statistics task has shut down")]
    StatisticsClosed,
}
