//! Average True Range.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR uses Wilder smoothing (alpha = 1/period) and needs period+1
//! bars, since the first bar has no previous close.

use crate::domain::Bar;

/// True range of `bar` against `prev_close`.
fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    assert!(period >= 1, "ATR period must be >= 1");
    if bars.len() < period + 1 {
        return None;
    }

    let mut tr = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let prev_close = bars[i - 1].close;
        if bars[i].is_void() || prev_close.is_nan() {
            return None;
        }
        tr.push(true_range(&bars[i], prev_close));
    }

    // Seed with the mean of the first `period` true ranges, then
    // Wilder-smooth the rest.
    let seed: f64 = tr[..period].iter().sum::<f64>() / period as f64;
    let alpha = 1.0 / period as f64;
    let mut value = seed;
    for &t in &tr[period..] {
        value = alpha * t + (1.0 - alpha) * value;
    }
    Some(value)
}
