//! Confirmation combiner
//!
//! Fuses independently computed candidates into one signal. A lone candidate
//! must clear stricter standalone thresholds. Two candidates must agree on
//! direction and come from different detectors; their levels are reconciled
//! conservatively and the combined score earns bonuses for agreement, level
//! confluence and reward:risk harmony.
//!
//! Candidates are sorted by strategy before anything is computed, so the
//! result does not depend on the order they were passed in.

use super::signal::Signal;
use crate::error::Rejection;
use crate::strategies::Candidate;
use crate::types::TradeLevels;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    pub standalone_min_score: f64,
    pub standalone_min_reward_risk: f64,
    pub agreement_bonus: f64,
    /// Key-level distance / entry
    pub confluence_tight_pct: f64,
    pub confluence_tight_bonus: f64,
    pub confluence_loose_pct: f64,
    pub confluence_loose_bonus: f64,
    pub harmony_min_reward_risk: f64,
    pub harmony_bonus: f64,
    pub min_combined_score: f64,
    pub min_reward_risk: f64,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            standalone_min_score: 8.0,
            standalone_min_reward_risk: 2.0,
            agreement_bonus: 1.5,
            confluence_tight_pct: 0.002,   // within 0.2%
            confluence_tight_bonus: 1.0,
            confluence_loose_pct: 0.005,   // within 0.5%
            confluence_loose_bonus: 0.5,
            harmony_min_reward_risk: 2.0,
            harmony_bonus: 0.5,
            min_combined_score: 7.0,
            min_reward_risk: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Combiner {
    config: CombinerConfig,
}

impl Combiner {
    pub fn new(config: CombinerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CombinerConfig {
        &self.config
    }

    /// Fuse `candidates`, logging the reason at debug when nothing qualifies
    pub fn combine(&self, candidates: &[Candidate], created_at: DateTime<Utc>) -> Option<Signal> {
        match self.evaluate(candidates, created_at) {
            Ok(signal) => Some(signal),
            Err(rejection) => {
                let instrument = candidates.first().map_or("-", |c| c.instrument.as_str());
                debug!("{} combiner rejected: {}", instrument, rejection);
                None
            }
        }
    }

    pub fn evaluate(&self, candidates: &[Candidate], created_at: DateTime<Utc>) -> Result<Signal, Rejection> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| c.strategy);

        match ordered.as_slice() {
            [] => Err(Rejection::NoCandidates),
            [single] => self.promote(single, created_at),
            many => self.fuse(many, created_at),
        }
    }

    fn promote(&self, candidate: &Candidate, created_at: DateTime<Utc>) -> Result<Signal, Rejection> {
        let c = &self.config;
        if candidate.score < c.standalone_min_score {
            return Err(Rejection::ScoreBelowMinimum {
                score: candidate.score,
                minimum: c.standalone_min_score,
            });
        }
        if !candidate.levels.is_coherent(candidate.direction) {
            return Err(Rejection::IncoherentLevels);
        }
        let reward_risk = candidate.reward_risk();
        if reward_risk < c.standalone_min_reward_risk {
            return Err(Rejection::RewardRiskBelowMinimum {
                reward_risk,
                minimum: c.standalone_min_reward_risk,
            });
        }

        Ok(Signal::new(
            &candidate.instrument,
            candidate.direction,
            candidate.levels,
            candidate.score,
            candidate.strategy.label().to_string(),
            candidate.rationale.clone(),
            created_at,
        ))
    }

    fn fuse(&self, candidates: &[&Candidate], created_at: DateTime<Utc>) -> Result<Signal, Rejection> {
        let c = &self.config;
        let first = candidates[0];
        let direction = first.direction;

        if candidates.iter().any(|cand| cand.direction != direction) {
            return Err(Rejection::ConflictingDirections);
        }
        if candidates.windows(2).any(|pair| pair[0].strategy == pair[1].strategy) {
            return Err(Rejection::DuplicateStrategy);
        }

        let n = candidates.len() as f64;
        let entry = candidates.iter().map(|cand| cand.levels.entry).sum::<f64>() / n;
        let stop = candidates
            .iter()
            .map(|cand| cand.levels.stop)
            .reduce(|a, b| direction.more_conservative_stop(a, b))
            .unwrap_or(first.levels.stop);
        let target = candidates
            .iter()
            .map(|cand| cand.levels.target)
            .reduce(|a, b| direction.more_conservative_target(a, b))
            .unwrap_or(first.levels.target);
        let levels = TradeLevels::new(entry, stop, target);

        let mut score = candidates.iter().map(|cand| cand.score).sum::<f64>() / n + c.agreement_bonus;

        let key_min = candidates.iter().map(|cand| cand.key_level).fold(f64::MAX, f64::min);
        let key_max = candidates.iter().map(|cand| cand.key_level).fold(f64::MIN, f64::max);
        let confluence = if entry > 0.0 { (key_max - key_min) / entry } else { f64::MAX };
        if confluence <= c.confluence_tight_pct {
            score += c.confluence_tight_bonus;
        } else if confluence <= c.confluence_loose_pct {
            score += c.confluence_loose_bonus;
        }

        if candidates.iter().all(|cand| cand.reward_risk() >= c.harmony_min_reward_risk) {
            score += c.harmony_bonus;
        }
        let score = score.min(10.0);

        if score < c.min_combined_score {
            return Err(Rejection::ScoreBelowMinimum {
                score,
                minimum: c.min_combined_score,
            });
        }
        if !levels.is_coherent(direction) {
            return Err(Rejection::IncoherentLevels);
        }
        let reward_risk = levels.reward_risk();
        if reward_risk < c.min_reward_risk {
            return Err(Rejection::RewardRiskBelowMinimum {
                reward_risk,
                minimum: c.min_reward_risk,
            });
        }

        let label = candidates
            .iter()
            .map(|cand| cand.strategy.label())
            .collect::<Vec<_>>()
            .join("+");
        let rationale = candidates
            .iter()
            .flat_map(|cand| {
                cand.rationale
                    .iter()
                    .map(move |line| format!("{}: {}", cand.strategy.label(), line))
            })
            .chain(std::iter::once(format!("key-level confluence {:.3}%", confluence * 100.0)))
            .collect();

        Ok(Signal::new(&first.instrument, direction, levels, score, label, rationale, created_at))
    }
}
