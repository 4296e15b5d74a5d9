//! Rate of Change and the multi-period momentum score.
//!
//! roc = (close[t] / close[t-period] - 1) * 100
//! momentum score = mean of the configured periods' ROCs that have
//! enough history; None when no period does.

use crate::domain::Bar;

pub fn roc(bars: &[Bar], period: usize) -> Option<f64> {
    assert!(period >= 1, "ROC period must be >= 1");
    if bars.len() < period + 1 {
        return None;
    }
    let curr = bars[bars.len() - 1].close;
    let prev = bars[bars.len() - 1 - period].close;
    if curr.is_nan() || prev.is_nan() {
        return None;
    }
    if prev == 0.0 {
        return Some(0.0);
    }
    Some((curr / prev - 1.0) * 100.0)
}

pub fn momentum_score(bars: &[Bar], periods: &[usize]) -> Option<f64> {
    let rocs: Vec<f64> = periods.iter().filter_map(|&p| roc(bars, p)).collect();
    if rocs.is_empty() {
        return None;
    }
    Some(rocs.iter().sum::<f64>() / rocs.len() as f64)
}
