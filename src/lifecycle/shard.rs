//! Per-instrument state owned by a single worker

use super::completion::{evaluate, CompletionRecord};
use crate::error::EngineError;
use crate::signals::Signal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

/// A signal held in the cache together with what has been observed since
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSignal {
    pub signal: Signal,
    pub last_price: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
}

impl ActiveSignal {
    /// Signed distance from entry to the last observed price
    pub fn unrealized(&self) -> Option<f64> {
        let levels = self.signal.levels();
        self.last_price
            .map(|price| levels.realized_distance(self.signal.direction(), price))
    }
}

#[derive(Debug)]
pub struct InstrumentShard {
    instrument: String,
    active: Option<ActiveSignal>,
}

impl InstrumentShard {
    pub fn new(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            active: None,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn active(&self) -> Option<&ActiveSignal> {
        self.active.as_ref()
    }

    /// Store a new signal. A second signal while one is active is a hard error.
    pub fn submit(&mut self, signal: Signal) -> Result<(), EngineError> {
        if let Some(existing) = &self.active {
            let err = EngineError::InvariantViolation {
                instrument: self.instrument.clone(),
                active_id: existing.signal.id(),
            };
            error!("{} rejected {}: {}", self.instrument, signal.id(), err);
            return Err(err);
        }
        self.store(signal);
        Ok(())
    }

    /// Store `signal` only when nothing is active. Losing the race to another
    /// signal is not an error.
    pub fn submit_if_vacant(&mut self, signal: Signal) -> bool {
        if let Some(existing) = &self.active {
            debug!(
                "{} already holds {}, dropping {}",
                self.instrument,
                existing.signal.id(),
                signal.id()
            );
            return false;
        }
        self.store(signal);
        true
    }

    fn store(&mut self, signal: Signal) {
        info!(
            "SIGNAL: {} {} {} | entry {:.5} stop {:.5} target {:.5} | score {:.1} | {}",
            self.instrument,
            signal.direction(),
            signal.id(),
            signal.entry(),
            signal.stop(),
            signal.target(),
            signal.reliability_score(),
            signal.strategy_label()
        );
        self.active = Some(ActiveSignal {
            signal,
            last_price: None,
            last_update: None,
        });
    }

    /// Record a price and complete the active signal if it crossed
    pub fn observe(&mut self, price: f64, observed_at: DateTime<Utc>) -> Option<CompletionRecord> {
        let active = self.active.as_mut()?;
        active.last_price = Some(price);
        active.last_update = Some(observed_at);

        let record = evaluate(&active.signal, price, observed_at)?;
        let finished = self.active.take().map(|a| a.signal.into_completed());
        if let Some(signal) = finished {
            info!(
                "COMPLETED: {} {} {} @ {:.5} | {:+.5} | {}",
                self.instrument,
                signal.id(),
                record.result,
                record.exit_price,
                record.realized_distance,
                signal.strategy_label()
            );
        }
        Some(record)
    }

    /// Remove the active signal if it matches `id`
    pub fn evict(&mut self, id: Uuid) -> Option<Signal> {
        match &self.active {
            Some(active) if active.signal.id() == id => self.active.take().map(|a| a.signal),
            _ => None,
        }
    }
}
