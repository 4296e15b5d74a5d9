//! Weighted Moving Average over closes.
//!
//! Linear weights 1..=period, newest bar heaviest.

use crate::domain::Bar;

pub fn wma(bars: &[Bar], period: usize) -> Option<f64> {
    assert!(period >= 1, "WMA period must be >= 1");
    if bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    let mut weighted = 0.0;
    for (i, bar) in window.iter().enumerate() {
        if bar.close.is_nan() {
            return None;
        }
        weighted += bar.close * (i + 1) as f64;
    }
    let weight_sum = (period * (period + 1) / 2) as f64;
    Some(weighted / weight_sum)
}
