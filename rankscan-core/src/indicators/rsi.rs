//! Relative Strength Index.
//!
//! Wilder smoothing of average gains and losses over the full retained
//! window, reporting the latest value.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Edge cases: avg_loss == 0 -> 100; avg_gain == 0 -> 0; flat -> 50.

use crate::domain::Bar;

pub fn rsi(bars: &[Bar], period: usize) -> Option<f64> {
    assert!(period >= 1, "RSI period must be >= 1");
    if bars.len() < period + 1 {
        return None;
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    if closes.iter().any(|c| c.is_nan()) {
        return None;
    }

    // Seed: average gain/loss over the first `period` changes.
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let ch = closes[i] - closes[i - 1];
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    // Wilder smoothing over the remainder.
    let alpha = 1.0 / period as f64;
    for i in (period + 1)..closes.len() {
        let ch = closes[i] - closes[i - 1];
        let gain = if ch > 0.0 { ch } else { 0.0 };
        let loss = if ch < 0.0 { -ch } else { 0.0 };
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
    }

    Some(if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0 // no movement
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    #[test]
    fn rsi_all_gains() {
        let bars = make_bars(&[100.0, 101.0, 102.0, 103.0]);
        assert_approx(rsi(&bars, 3).unwrap(), 100.0, 1e-6);
    }

    #[test]
    fn rsi_all_losses() {
        let bars = make_bars(&[103.0, 102.0, 101.0, 100.0]);
        assert_approx(rsi(&bars, 3).unwrap(), 0.0, 1e-6);
    }

    #[test]
    fn rsi_flat_series_reads_neutral() {
        let bars = make_bars(&[100.0, 100.0, 100.0, 100.0]);
        assert_approx(rsi(&bars, 3).unwrap(), 50.0, 1e-6);
    }

    #[test]
    fn rsi_stays_in_bounds() {
        let bars = make_bars(&[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0]);
        let v = rsi(&bars, 3).unwrap();
        assert!((0.0..=100.0).contains(&v), "RSI out of bounds: {v}");
    }

    #[test]
    fn rsi_short_history_is_unavailable() {
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        assert_eq!(rsi(&bars, 3), None);
    }

    #[test]
    fn rsi_is_idempotent() {
        let bars = make_bars(&[44.0, 44.34, 44.09, 43.61, 44.33, 44.83]);
        assert_eq!(rsi(&bars, 3), rsi(&bars, 3));
    }
}
