//! RSI-style oscillator

/// Default lookback
pub const RSI_PERIOD: usize = 14;

/// Neutral reading returned when the window is under-filled
pub const RSI_NEUTRAL: f64 = 50.0;

/// Simple-average RSI over the last `period` close-to-close changes.
///
/// Returns 50.0 with fewer than `period + 1` closes, and 100.0 when the
/// average loss is zero.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return RSI_NEUTRAL;
    }

    let window = &closes[closes.len() - period - 1..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underfilled_window_is_neutral() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0], RSI_PERIOD), RSI_NEUTRAL);
        assert_eq!(rsi(&[], RSI_PERIOD), RSI_NEUTRAL);
    }

    #[test]
    fn test_only_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, RSI_PERIOD), 100.0);
    }

    #[test]
    fn test_only_losses_is_zero() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert!(rsi(&closes, RSI_PERIOD).abs() < 1e-9);
    }

    #[test]
    fn test_balanced_moves_near_50() {
        let closes: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let value = rsi(&closes, RSI_PERIOD);
        assert!((value - 50.0).abs() < 1e-9, "rsi = {}", value);
    }
}
