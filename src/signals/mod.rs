//! Signals and the confirmation combiner

pub mod combiner;
pub mod signal;

pub use combiner::{Combiner, CombinerConfig};
pub use signal::{Signal, SignalStatus};
