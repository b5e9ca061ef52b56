//! Per-instrument worker task
//!
//! Each instrument gets one task that owns its `InstrumentShard` and handles
//! commands strictly in arrival order. Completions are sent to the statistics
//! task before the caller gets its reply.

use super::cache::ActiveIndex;
use super::completion::CompletionRecord;
use super::shard::{ActiveSignal, InstrumentShard};
use super::stats::StatsHandle;
use crate::error::EngineError;
use crate::signals::Signal;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug)]
pub enum ShardCommand {
    Submit {
        signal: Signal,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Store only when the instrument is vacant, replying whether it was
    SubmitIfVacant {
        signal: Signal,
        reply: oneshot::Sender<bool>,
    },
    Observe {
        price: f64,
        observed_at: DateTime<Utc>,
        reply: oneshot::Sender<Option<CompletionRecord>>,
    },
    Evict {
        id: Uuid,
        reply: oneshot::Sender<Option<Signal>>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<ActiveSignal>>,
    },
}

/// Spawn the worker for `instrument` and return its command queue
pub fn spawn_worker(
    instrument: &str,
    capacity: usize,
    index: ActiveIndex,
    stats: StatsHandle,
) -> mpsc::Sender<ShardCommand> {
    let (tx, mut rx) = mpsc::channel::<ShardCommand>(capacity.max(1));
    let mut shard = InstrumentShard::new(instrument);

    tokio::spawn(async move {
        debug!("Worker for {} started", shard.instrument());

        while let Some(cmd) = rx.recv().await {
            match cmd {
                ShardCommand::Submit { signal, reply } => {
                    let created_at = signal.created_at();
                    let id = signal.id();
                    let result = shard.submit(signal);
                    if result.is_ok() {
                        index.insert(created_at, id, shard.instrument()).await;
                    }
                    let _ = reply.send(result);
                }
                ShardCommand::SubmitIfVacant { signal, reply } => {
                    let created_at = signal.created_at();
                    let id = signal.id();
                    let stored = shard.submit_if_vacant(signal);
                    if stored {
                        index.insert(created_at, id, shard.instrument()).await;
                    }
                    let _ = reply.send(stored);
                }
                ShardCommand::Observe { price, observed_at, reply } => {
                    let record = shard.observe(price, observed_at);
                    if let Some(rec) = &record {
                        index.remove(rec.created_at, rec.signal_id).await;
                        if let Err(e) = stats.record(rec.clone()) {
                            error!("{} completion {} not recorded: {}", shard.instrument(), rec.signal_id, e);
                        }
                    }
                    let _ = reply.send(record);
                }
                ShardCommand::Evict { id, reply } => {
                    let evicted = shard.evict(id);
                    if let Some(signal) = &evicted {
                        index.remove(signal.created_at(), id).await;
                        warn!(
                            "EVICTED: {} {} (created {}) to stay within capacity",
                            shard.instrument(),
                            id,
                            signal.created_at()
                        );
                        if let Err(e) = stats.abandoned(id) {
                            error!("{} eviction {} not recorded: {}", shard.instrument(), id, e);
                        }
                    }
                    let _ = reply.send(evicted);
                }
                ShardCommand::Snapshot { reply } => {
                    let _ = reply.send(shard.active().cloned());
                }
            }
        }

        debug!("Worker for {} stopped", shard.instrument());
    });

    tx
}
