//! Average true range

use crate::types::PriceBar;

/// Default lookback
pub const ATR_PERIOD: usize = 14;

/// Fallback ATR as a fraction of the last close
const FALLBACK_FRACTION: f64 = 0.001;

/// Absolute floor so downstream risk maths never divides by zero
const ATR_FLOOR: f64 = 1e-9;

/// Mean true range over the last `period` true ranges.
///
/// With fewer than `period + 1` bars, or a flat window, returns a small
/// positive fallback derived from the last close. Never returns zero.
pub fn atr(bars: &[PriceBar], period: usize) -> f64 {
    let fallback = bars
        .last()
        .map(|b| (b.close.abs() * FALLBACK_FRACTION).max(ATR_FLOOR))
        .unwrap_or(ATR_FLOOR);

    if period == 0 || bars.len() < period + 1 {
        return fallback;
    }

    let window = &bars[bars.len() - period - 1..];
    let total: f64 = window
        .windows(2)
        .map(|pair| pair[1].true_range(pair[0].close))
        .sum();
    let value = total / period as f64;

    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars(n: usize, spread: f64) -> Vec<PriceBar> {
        (0..n)
            .map(|i| {
                let ts = Utc.timestamp_opt(1_700_000_000 + i as i64 * 900, 0).unwrap();
                PriceBar::new(ts, 100.0, 100.0 + spread, 100.0 - spread, 100.0, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_constant_range() {
        let value = atr(&bars(30, 0.5), ATR_PERIOD);
        assert!((value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_history_uses_fallback() {
        let value = atr(&bars(5, 0.5), ATR_PERIOD);
        assert!((value - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_flat_market_never_zero() {
        assert!(atr(&bars(30, 0.0), ATR_PERIOD) > 0.0);
        assert!(atr(&[], ATR_PERIOD) > 0.0);
    }
}
