//! Statistics aggregation
//!
//! The aggregator runs as its own task fed by an unbounded queue, so workers
//! never block or drop a record. Records are de-duplicated by signal id.
//! Queries travel through the same queue and therefore observe every record
//! sent before them.

use super::completion::{CompletionRecord, TradeResult};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

/// Completions needed before a strategy can be named best
pub const BEST_STRATEGY_MIN_SAMPLES: u32 = 3;

/// Floor on the number of signal ids remembered for de-duplication
pub const SEEN_IDS_MIN: usize = 1024;

fn win_rate(wins: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub total: u32,
    pub wins: u32,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentStatistics {
    pub instrument: String,
    pub total_signals: u32,
    pub wins: u32,
    pub losses: u32,
    /// Percent
    pub win_rate: f64,
    pub cumulative_distance: f64,
    pub average_reliability: f64,
    pub strategies: BTreeMap<String, StrategyPerformance>,
    pub best_strategy: Option<String>,
}

impl InstrumentStatistics {
    fn new(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            ..Default::default()
        }
    }

    fn apply(&mut self, record: &CompletionRecord) {
        let previous = self.total_signals as f64;
        self.total_signals += 1;
        match record.result {
            TradeResult::Win => self.wins += 1,
            TradeResult::Loss => self.losses += 1,
        }
        self.win_rate = win_rate(self.wins, self.total_signals);
        self.cumulative_distance += record.realized_distance;
        self.average_reliability =
            (self.average_reliability * previous + record.reliability_score) / self.total_signals as f64;

        let perf = self.strategies.entry(record.strategy_label.clone()).or_default();
        perf.total += 1;
        if record.result == TradeResult::Win {
            perf.wins += 1;
        }
        perf.win_rate = win_rate(perf.wins, perf.total);

        // Highest win rate wins; ties go to the label that sorts first
        self.best_strategy = self
            .strategies
            .iter()
            .filter(|(_, p)| p.total >= BEST_STRATEGY_MIN_SAMPLES)
            .fold(None::<(&String, f64)>, |best, (label, p)| match best {
                Some((_, rate)) if rate >= p.win_rate => best,
                _ => Some((label, p.win_rate)),
            })
            .map(|(label, _)| label.clone());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStatistics {
    pub total_signals: u32,
    pub wins: u32,
    pub losses: u32,
    /// Percent
    pub win_rate: f64,
    pub cumulative_distance: f64,
    /// Instruments with at least one completion
    pub instruments: usize,
    /// Signals evicted for capacity, never counted as completions
    pub abandoned: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum StatisticsReport {
    Global(GlobalStatistics),
    Instrument(InstrumentStatistics),
}

#[derive(Debug)]
pub struct StatisticsAggregator {
    seen: HashSet<Uuid>,
    /// Insertion order of `seen`, oldest first
    seen_order: VecDeque<Uuid>,
    seen_limit: usize,
    global: GlobalStatistics,
    instruments: HashMap<String, InstrumentStatistics>,
    history: VecDeque<CompletionRecord>,
    history_limit: usize,
}

impl StatisticsAggregator {
    pub fn new(history_limit: usize) -> Self {
        Self {
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            seen_limit: history_limit.max(SEEN_IDS_MIN),
            global: GlobalStatistics::default(),
            instruments: HashMap::new(),
            history: VecDeque::with_capacity(history_limit.min(1024)),
            history_limit,
        }
    }

    /// Remember `id`, forgetting the oldest id past `seen_limit`. False when
    /// already remembered.
    fn mark_seen(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.seen_order.push_back(id);
        while self.seen_order.len() > self.seen_limit {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Apply a completion once. Returns false for a duplicate.
    pub fn record(&mut self, record: CompletionRecord) -> bool {
        if !self.mark_seen(record.signal_id) {
            warn!("Duplicate completion for {} ignored", record.signal_id);
            return false;
        }

        let g = &mut self.global;
        g.total_signals += 1;
        match record.result {
            TradeResult::Win => g.wins += 1,
            TradeResult::Loss => g.losses += 1,
        }
        g.win_rate = win_rate(g.wins, g.total_signals);
        g.cumulative_distance += record.realized_distance;

        self.instruments
            .entry(record.instrument.clone())
            .or_insert_with(|| InstrumentStatistics::new(&record.instrument))
            .apply(&record);
        self.global.instruments = self.instruments.len();

        if self.history_limit > 0 {
            if self.history.len() >= self.history_limit {
                self.history.pop_front();
            }
            self.history.push_back(record);
        }
        true
    }

    /// Count an eviction once
    pub fn record_abandoned(&mut self, signal_id: Uuid) -> bool {
        if !self.mark_seen(signal_id) {
            return false;
        }
        self.global.abandoned += 1;
        true
    }

    pub fn global(&self) -> GlobalStatistics {
        self.global.clone()
    }

    /// Per-instrument figures; all zero for an instrument never completed
    pub fn instrument(&self, instrument: &str) -> InstrumentStatistics {
        self.instruments
            .get(instrument)
            .cloned()
            .unwrap_or_else(|| InstrumentStatistics::new(instrument))
    }

    pub fn report(&self, instrument: Option<&str>) -> StatisticsReport {
        match instrument {
            Some(name) => StatisticsReport::Instrument(self.instrument(name)),
            None => StatisticsReport::Global(self.global()),
        }
    }

    /// Newest `n` completions, oldest first
    pub fn recent(&self, n: usize) -> Vec<CompletionRecord> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }
}

#[derive(Debug)]
pub enum StatsCommand {
    Record(CompletionRecord),
    Abandoned(Uuid),
    Query {
        instrument: Option<String>,
        reply: oneshot::Sender<StatisticsReport>,
    },
    Recent {
        n: usize,
        reply: oneshot::Sender<Vec<CompletionRecord>>,
    },
}

/// Cloneable sender side of the statistics task
#[derive(Debug, Clone)]
pub struct StatsHandle {
    tx: mpsc::UnboundedSender<StatsCommand>,
}

impl StatsHandle {
    pub fn record(&self, record: CompletionRecord) -> Result<(), EngineError> {
        self.tx
            .send(StatsCommand::Record(record))
            .map_err(|_| EngineError::StatisticsClosed)
    }

    pub fn abandoned(&self, signal_id: Uuid) -> Result<(), EngineError> {
        self.tx
            .send(StatsCommand::Abandoned(signal_id))
            .map_err(|_| EngineError::StatisticsClosed)
    }

    pub async fn query(&self, instrument: Option<&str>) -> Result<StatisticsReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StatsCommand::Query {
                instrument: instrument.map(str::to_string),
                reply,
            })
            .map_err(|_| EngineError::StatisticsClosed)?;
        rx.await.map_err(|_| EngineError::StatisticsClosed)
    }

    pub async fn recent(&self, n: usize) -> Result<Vec<CompletionRecord>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StatsCommand::Recent { n, reply })
            .map_err(|_| EngineError::StatisticsClosed)?;
        rx.await.map_err(|_| EngineError::StatisticsClosed)
    }
}

/// Spawn the aggregator task. Must be called inside a tokio runtime.
pub fn spawn_statistics(history_limit: usize) -> StatsHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut aggregator = StatisticsAggregator::new(history_limit);
        while let Some(cmd) = rx.recv().await {
            match cmd {
                StatsCommand::Record(record) => {
                    aggregator.record(record);
                }
                StatsCommand::Abandoned(id) => {
                    aggregator.record_abandoned(id);
                }
                StatsCommand::Query { instrument, reply } => {
                    let _ = reply.send(aggregator.report(instrument.as_deref()));
                }
                StatsCommand::Recent { n, reply } => {
                    let _ = reply.send(aggregator.recent(n));
                }
            }
        }
        debug!("Statistics task stopped");
    });

    StatsHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TradeLevels};
    use chrono::Utc;

    fn record(instrument: &str, label: &str, result: TradeResult, distance: f64) -> CompletionRecord {
        let now = Utc::now();
        CompletionRecord {
            signal_id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            direction: Direction::Long,
            strategy_label: label.to_string(),
            reliability_score: 8.0,
            levels: TradeLevels::new(100.0, 98.0, 106.0),
            result,
            exit_price: 100.0 + distance,
            realized_distance: distance,
            created_at: now,
            completed_at: now,
            duration_secs: 0,
        }
    }

    #[test]
    fn test_global_and_instrument_counters() {
        let mut agg = StatisticsAggregator::new(10);
        agg.record(record("BTCUSDT", "A", TradeResult::Win, 6.0));
        agg.record(record("BTCUSDT", "A", TradeResult::Loss, -2.0));
        agg.record(record("ETHUSDT", "B", TradeResult::Win, 3.0));

        let g = agg.global();
        assert_eq!(g.total_signals, 3);
        assert_eq!(g.wins, 2);
        assert_eq!(g.losses, 1);
        assert!((g.win_rate - 66.666).abs() < 0.01);
        assert!((g.cumulative_distance - 7.0).abs() < 1e-9);
        assert_eq!(g.instruments, 2);

        let btc = agg.instrument("BTCUSDT");
        assert_eq!(btc.total_signals, 2);
        assert_eq!(btc.win_rate, 50.0);
        assert_eq!(btc.average_reliability, 8.0);

        let unknown = agg.instrument("SOLUSDT");
        assert_eq!(unknown.total_signals, 0);
        assert_eq!(unknown.win_rate, 0.0);
    }

    #[test]
    fn test_duplicate_record_applied_once() {
        let mut agg = StatisticsAggregator::new(10);
        let rec = record("BTCUSDT", "A", TradeResult::Win, 6.0);
        assert!(agg.record(rec.clone()));
        assert!(!agg.record(rec));
        assert_eq!(agg.global().total_signals, 1);
    }

    #[test]
    fn test_best_strategy_needs_samples() {
        let mut agg = StatisticsAggregator::new(10);
        agg.record(record("BTCUSDT", "A", TradeResult::Win, 1.0));
        agg.record(record("BTCUSDT", "A", TradeResult::Win, 1.0));
        assert_eq!(agg.instrument("BTCUSDT").best_strategy, None);

        agg.record(record("BTCUSDT", "A", TradeResult::Loss, -1.0));
        for _ in 0..3 {
            agg.record(record("BTCUSDT", "B", TradeResult::Win, 1.0));
        }
        let stats = agg.instrument("BTCUSDT");
        assert_eq!(stats.best_strategy.as_deref(), Some("B"));
        assert_eq!(stats.strategies["A"].total, 3);
        assert!((stats.strategies["A"].win_rate - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut agg = StatisticsAggregator::new(2);
        for i in 0..5 {
            agg.record(record("BTCUSDT", "A", TradeResult::Win, i as f64));
        }
        let recent = agg.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].realized_distance, 4.0);
        assert_eq!(agg.recent(1)[0].realized_distance, 4.0);
    }

    #[test]
    fn test_abandoned_not_a_completion() {
        let mut agg = StatisticsAggregator::new(2);
        let id = Uuid::new_v4();
        assert!(agg.record_abandoned(id));
        assert!(!agg.record_abandoned(id));
        let g = agg.global();
        assert_eq!(g.abandoned, 1);
        assert_eq!(g.total_signals, 0);
    }

    #[test]
    fn test_seen_ids_are_bounded() {
        let mut agg = StatisticsAggregator::new(10);
        let first = Uuid::new_v4();
        assert!(agg.record_abandoned(first));
        let mut last = first;
        for _ in 0..SEEN_IDS_MIN + 50 {
            last = Uuid::new_v4();
            assert!(agg.record_abandoned(last));
        }

        assert_eq!(agg.seen.len(), SEEN_IDS_MIN);
        assert_eq!(agg.seen_order.len(), SEEN_IDS_MIN);
        // Recent ids still de-duplicate, the oldest has been forgotten
        assert!(!agg.record_abandoned(last));
        assert!(!agg.seen.contains(&first));
        assert_eq!(agg.global().abandoned, SEEN_IDS_MIN as u32 + 51);
    }

    #[tokio::test]
    async fn test_task_answers_queries_in_order() {
        let handle = spawn_statistics(10);
        handle.record(record("BTCUSDT", "A", TradeResult::Win, 6.0)).unwrap();
        match handle.query(Some("BTCUSDT")).await.unwrap() {
            StatisticsReport::Instrument(stats) => assert_eq!(stats.wins, 1),
            other => panic!("unexpected report {:?}", other),
        }
        match handle.query(None).await.unwrap() {
            StatisticsReport::Global(stats) => assert_eq!(stats.total_signals, 1),
            other => panic!("unexpected report {:?}", other),
        }
        assert_eq!(handle.recent(5).await.unwrap().len(), 1);
    }
}
