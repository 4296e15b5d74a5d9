//! Volatility — annualized standard deviation of log returns.
//!
//! Needs period+1 bars for `period` returns. Expressed in percent with
//! a sqrt(252) annualization factor. Non-positive closes make the log
//! return undefined, so the value is reported unavailable.
//!
//! The intraday high/low-range variant lives on `Quote::range_rate`.

use crate::domain::Bar;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub fn annualized_volatility(bars: &[Bar], period: usize) -> Option<f64> {
    assert!(period >= 2, "volatility period must be >= 2");
    if bars.len() < period + 1 {
        return None;
    }

    let window = &bars[bars.len() - period - 1..];
    let mut returns = Vec::with_capacity(period);
    for pair in window.windows(2) {
        let (prev, curr) = (pair[0].close, pair[1].close);
        if !(prev > 0.0) || !(curr > 0.0) {
            return None;
        }
        returns.push((curr / prev).ln());
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    // Sample variance (n - 1 denominator).
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(var.sqrt() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}
