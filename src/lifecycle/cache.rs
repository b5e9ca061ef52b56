//! Signal lifecycle cache
//!
//! Routes commands to per-instrument workers, spawning a worker the first
//! time an instrument receives a signal. A shared `ActiveIndex` orders every
//! active signal by creation time so capacity overflow can evict the oldest
//! across all instruments.

use super::completion::CompletionRecord;
use super::config::CacheConfig;
use super::shard::ActiveSignal;
use super::stats::StatsHandle;
use super::worker::{spawn_worker, ShardCommand};
use crate::error::EngineError;
use crate::signals::Signal;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Active signals ordered by (created_at, id)
#[derive(Debug, Clone, Default)]
pub struct ActiveIndex {
    inner: Arc<Mutex<BTreeMap<(DateTime<Utc>, Uuid), String>>>,
}

impl ActiveIndex {
    pub async fn insert(&self, created_at: DateTime<Utc>, id: Uuid, instrument: &str) {
        self.inner.lock().await.insert((created_at, id), instrument.to_string());
    }

    pub async fn remove(&self, created_at: DateTime<Utc>, id: Uuid) {
        self.inner.lock().await.remove(&(created_at, id));
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Take the oldest entries until at most `max` remain
    pub async fn pop_over_capacity(&self, max: usize) -> Vec<(Uuid, String)> {
        let mut map = self.inner.lock().await;
        let mut popped = Vec::new();
        while map.len() > max {
            match map.pop_first() {
                Some(((_, id), instrument)) => popped.push((id, instrument)),
                None => break,
            }
        }
        popped
    }
}

pub struct SignalCache {
    config: CacheConfig,
    workers: RwLock<HashMap<String, mpsc::Sender<ShardCommand>>>,
    index: ActiveIndex,
    stats: StatsHandle,
}

impl SignalCache {
    pub fn new(config: CacheConfig, stats: StatsHandle) -> Self {
        Self {
            config,
            workers: RwLock::new(HashMap::new()),
            index: ActiveIndex::default(),
            stats,
        }
    }

    pub fn stats(&self) -> &StatsHandle {
        &self.stats
    }

    async fn existing_worker(&self, instrument: &str) -> Option<mpsc::Sender<ShardCommand>> {
        self.workers.read().await.get(instrument).cloned()
    }

    async fn worker_for(&self, instrument: &str) -> mpsc::Sender<ShardCommand> {
        if let Some(tx) = self.existing_worker(instrument).await {
            return tx;
        }
        let mut workers = self.workers.write().await;
        workers
            .entry(instrument.to_string())
            .or_insert_with(|| {
                spawn_worker(
                    instrument,
                    self.config.channel_capacity,
                    self.index.clone(),
                    self.stats.clone(),
                )
            })
            .clone()
    }

    async fn send(&self, tx: &mpsc::Sender<ShardCommand>, instrument: &str, cmd: ShardCommand) -> Result<(), EngineError> {
        tx.send(cmd)
            .await
            .map_err(|_| EngineError::WorkerClosed(instrument.to_string()))
    }

    /// Hand a new signal to its instrument's worker, then enforce capacity
    pub async fn submit(&self, signal: Signal) -> Result<(), EngineError> {
        let instrument = signal.instrument().to_string();
        let tx = self.worker_for(&instrument).await;
        let (reply, rx) = oneshot::channel();
        self.send(&tx, &instrument, ShardCommand::Submit { signal, reply }).await?;
        rx.await
            .map_err(|_| EngineError::WorkerClosed(instrument.clone()))??;

        self.enforce_capacity().await;
        Ok(())
    }

    /// Like `submit`, but an instrument that already holds a signal is a
    /// normal outcome. Returns whether `signal` was stored.
    pub async fn submit_if_vacant(&self, signal: Signal) -> Result<bool, EngineError> {
        let instrument = signal.instrument().to_string();
        let tx = self.worker_for(&instrument).await;
        let (reply, rx) = oneshot::channel();
        self.send(&tx, &instrument, ShardCommand::SubmitIfVacant { signal, reply }).await?;
        let stored = rx.await.map_err(|_| EngineError::WorkerClosed(instrument))?;

        if stored {
            self.enforce_capacity().await;
        }
        Ok(stored)
    }

    /// Feed a price to the instrument's worker. Instruments that never held a
    /// signal have no worker and nothing to evaluate.
    pub async fn observe(
        &self,
        instrument: &str,
        price: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<CompletionRecord>, EngineError> {
        let Some(tx) = self.existing_worker(instrument).await else {
            return Ok(None);
        };
        let (reply, rx) = oneshot::channel();
        self.send(&tx, instrument, ShardCommand::Observe { price, observed_at, reply }).await?;
        rx.await.map_err(|_| EngineError::WorkerClosed(instrument.to_string()))
    }

    pub async fn evict(&self, instrument: &str, id: Uuid) -> Result<Option<Signal>, EngineError> {
        let Some(tx) = self.existing_worker(instrument).await else {
            return Ok(None);
        };
        let (reply, rx) = oneshot::channel();
        self.send(&tx, instrument, ShardCommand::Evict { id, reply }).await?;
        rx.await.map_err(|_| EngineError::WorkerClosed(instrument.to_string()))
    }

    pub async fn snapshot(&self, instrument: &str) -> Result<Option<ActiveSignal>, EngineError> {
        let Some(tx) = self.existing_worker(instrument).await else {
            return Ok(None);
        };
        let (reply, rx) = oneshot::channel();
        self.send(&tx, instrument, ShardCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| EngineError::WorkerClosed(instrument.to_string()))
    }

    /// Every active signal, oldest first
    pub async fn snapshots(&self) -> Vec<ActiveSignal> {
        let instruments: Vec<String> = self.workers.read().await.keys().cloned().collect();
        let mut active = Vec::new();
        for instrument in instruments {
            match self.snapshot(&instrument).await {
                Ok(Some(snapshot)) => active.push(snapshot),
                Ok(None) => {}
                Err(e) => warn!("Snapshot of {} failed: {}", instrument, e),
            }
        }
        active.sort_by_key(|a| (a.signal.created_at(), a.signal.id()));
        active
    }

    pub async fn active_count(&self) -> usize {
        self.index.len().await
    }

    async fn enforce_capacity(&self) {
        let overflow = self.index.pop_over_capacity(self.config.max_active_signals).await;
        for (id, instrument) in overflow {
            match self.evict(&instrument, id).await {
                Ok(Some(_)) => {}
                Ok(None) => debug!("{} {} completed before eviction", instrument, id),
                Err(e) => warn!("Eviction of {} {} failed: {}", instrument, id, e),
            }
        }
    }
}
