// Library crate - signal generation, fusion and lifecycle tracking

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod lifecycle;
pub mod signals;
pub mod strategies;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::SignalEngine;
pub use error::{EngineError, Rejection};
pub use feed::MarketData;
pub use lifecycle::{CompletionRecord, StatisticsReport, TradeResult};
pub use signals::{Combiner, Signal, SignalStatus};
pub use strategies::{Candidate, Detector, Strategy};
pub use types::*;
