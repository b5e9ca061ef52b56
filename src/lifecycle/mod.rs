//! Signal lifecycle: cache, completion evaluation and statistics
//!
//! ```text
//! SignalCache ──Submit/Observe/Evict/Snapshot──▶ worker (one per instrument)
//!                                                   │ owns InstrumentShard
//!                                                   ▼
//!                                          StatsHandle (unbounded) ──▶ aggregator task
//! ```

pub mod cache;
pub mod completion;
pub mod config;
pub mod shard;
pub mod stats;
pub mod worker;

pub use cache::{ActiveIndex, SignalCache};
pub use completion::{CompletionRecord, TradeResult};
pub use config::CacheConfig;
pub use shard::{ActiveSignal, InstrumentShard};
pub use stats::{
    spawn_statistics, GlobalStatistics, InstrumentStatistics, StatisticsAggregator, StatisticsReport,
    StatsHandle, StrategyPerformance,
};
