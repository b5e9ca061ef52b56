//! Indicator library
//!
//! Pure functions over bar history. Nothing in here holds state, logs, or
//! touches the network; the detectors compose these into candidates.

pub mod candles;
pub mod levels;
pub mod momentum;
pub mod oscillator;
pub mod sweep;
pub mod volatility;

pub use candles::{candle_confirmation, volume_ratio, CandleConfig, CandlePattern};
pub use levels::{support_resistance, swing_points, Level, LevelConfig, LevelKind, SupportResistance, SwingPoint};
pub use momentum::{classify, momentum_pct, momentum_significance, MomentumBias, MomentumSignificance};
pub use oscillator::rsi;
pub use sweep::{detect_sweep, SweepConfig, SweepEvent, SweepSide};
pub use volatility::atr;
