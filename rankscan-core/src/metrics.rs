//! MetricSet — the per-instrument, per-cycle scalar snapshot.
//!
//! Recomputed fully each cycle from the latest quote and the retained
//! history window; never partially mutated. Metrics whose window
//! requirement exceeds the available history are `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Market, Quote};
use crate::indicators;

/// Window and period parameters for metric computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub volatility_period: usize,
    pub volume_window: usize,
    pub roc_periods: Vec<usize>,
    /// Close-to-close change rate treated as a limit move (KRX band).
    pub limit_threshold_pct: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_short: 5,
            sma_long: 20,
            rsi_period: 14,
            atr_period: 14,
            volatility_period: 20,
            volume_window: 20,
            roc_periods: vec![5, 20, 60],
            limit_threshold_pct: 29.5,
        }
    }
}

/// Derived metrics for one instrument in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub ts: DateTime<Utc>,

    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub change: f64,
    pub change_rate: f64,
    pub volume: u64,
    pub trading_value: f64,
    /// Mean volume over the volume window; unavailable on short
    /// history.
    pub avg_volume: Option<f64>,

    /// Opening gap versus the previous close, percent.
    pub gap_rate: f64,
    /// Intraday high/low range, percent of the low.
    pub range_rate: f64,
    /// Annualized log-return volatility, percent.
    pub volatility: Option<f64>,

    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub momentum: Option<f64>,

    pub up_streak: u32,
    pub down_streak: u32,
    /// Trailing bars whose close-to-close move stayed at the limit.
    pub consecutive_limit_up: u32,
    pub consecutive_limit_down: u32,

    /// Highest high / lowest low over the retained window (including
    /// the current bar). Falls back to the quote's own range on the
    /// first cycle.
    pub window_high: f64,
    pub window_low: f64,
    /// Close versus the window high/low, percent; zero reference
    /// reports 0.0.
    pub high_breakthrough_rate: f64,
    pub low_breakthrough_rate: f64,
    /// Where the close sits inside [window_low, window_high], 0-100.
    /// A degenerate range reads 50.0.
    pub position_in_range: f64,
    /// Close strictly exceeds the window high/low of all prior bars.
    pub is_new_high: bool,
    pub is_new_low: bool,
}

impl MetricSet {
    /// Computes the full metric set for one instrument.
    ///
    /// `bars` is the retained history window, oldest first, with the
    /// current cycle's bar already appended. Pure: identical inputs
    /// always yield identical output.
    pub fn compute(quote: &Quote, bars: &[Bar], params: &IndicatorParams) -> Self {
        let streaks = indicators::streaks(bars);

        let (window_high, window_low) = window_extremes(bars, quote);
        let prior = if bars.len() > 1 { &bars[..bars.len() - 1] } else { &[] };
        let (is_new_high, is_new_low) = match window_extremes_of(prior) {
            Some((prior_high, prior_low)) => {
                (quote.price > prior_high, quote.price < prior_low)
            }
            None => (false, false),
        };

        Self {
            code: quote.code.clone(),
            name: quote.name.clone(),
            market: quote.market,
            ts: quote.ts,
            price: quote.price,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            prev_close: quote.prev_close,
            change: quote.change(),
            change_rate: quote.change_rate(),
            volume: quote.volume,
            trading_value: quote.trading_value(),
            avg_volume: average_volume(bars, params.volume_window),
            gap_rate: gap_rate(quote.open, quote.prev_close),
            range_rate: quote.range_rate(),
            volatility: indicators::annualized_volatility(bars, params.volatility_period),
            sma_short: indicators::sma(bars, params.sma_short),
            sma_long: indicators::sma(bars, params.sma_long),
            rsi: indicators::rsi(bars, params.rsi_period),
            atr: indicators::atr(bars, params.atr_period),
            momentum: indicators::momentum_score(bars, &params.roc_periods),
            up_streak: streaks.up,
            down_streak: streaks.down,
            consecutive_limit_up: limit_run(bars, params.limit_threshold_pct, true),
            consecutive_limit_down: limit_run(bars, params.limit_threshold_pct, false),
            window_high,
            window_low,
            high_breakthrough_rate: breakthrough_rate(quote.price, window_high),
            low_breakthrough_rate: breakthrough_rate(quote.price, window_low),
            position_in_range: position_in_range(quote.price, window_low, window_high),
            is_new_high,
            is_new_low,
        }
    }

    /// Classification used by summary aggregates.
    pub fn is_advancing(&self) -> bool {
        self.change > 0.0
    }

    pub fn is_declining(&self) -> bool {
        self.change < 0.0
    }
}

/// Trailing run of close-to-close moves at or beyond the limit band.
fn limit_run(bars: &[Bar], threshold_pct: f64, up: bool) -> u32 {
    let mut run = 0;
    for pair in bars.windows(2).rev() {
        let (prev, curr) = (pair[0].close, pair[1].close);
        if prev <= 0.0 || prev.is_nan() || curr.is_nan() {
            break;
        }
        let rate = (curr - prev) / prev * 100.0;
        let at_limit = if up { rate >= threshold_pct } else { rate <= -threshold_pct };
        if at_limit {
            run += 1;
        } else {
            break;
        }
    }
    run
}

fn average_volume(bars: &[Bar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let tail = &bars[bars.len() - window..];
    Some(tail.iter().map(|b| b.volume as f64).sum::<f64>() / window as f64)
}

fn gap_rate(open: f64, prev_close: f64) -> f64 {
    if prev_close == 0.0 {
        return 0.0;
    }
    (open - prev_close) / prev_close * 100.0
}

fn breakthrough_rate(price: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    (price - reference) / reference * 100.0
}

fn position_in_range(price: f64, low: f64, high: f64) -> f64 {
    if high == low {
        return 50.0;
    }
    ((price - low) / (high - low) * 100.0).clamp(0.0, 100.0)
}

fn window_extremes(bars: &[Bar], quote: &Quote) -> (f64, f64) {
    window_extremes_of(bars).unwrap_or((quote.high, quote.low))
}

fn window_extremes_of(bars: &[Bar]) -> Option<(f64, f64)> {
    let mut high = f64::NEG_INFINITY;
    let mut low = f64::INFINITY;
    let mut seen = false;
    for bar in bars {
        if bar.high.is_nan() || bar.low.is_nan() {
            continue;
        }
        high = high.max(bar.high);
        low = low.min(bar.low);
        seen = true;
    }
    seen.then_some((high, low))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};
    use chrono::TimeZone;

    fn quote_for(bars: &[Bar]) -> Quote {
        let last = bars.last().unwrap();
        let prev_close = if bars.len() > 1 { bars[bars.len() - 2].close } else { last.open };
        Quote {
            code: "005930".into(),
            name: "Samsung Electronics".into(),
            market: Market::Kospi,
            price: last.close,
            open: last.open,
            high: last.high,
            low: last.low,
            prev_close,
            volume: last.volume,
            ts: last.ts,
        }
    }

    #[test]
    fn short_history_marks_window_metrics_unavailable() {
        // 3 bars, windows of 20: unavailable, everything else computes
        let bars = make_bars(&[100.0, 102.0, 104.0]);
        let quote = quote_for(&bars);
        let m = MetricSet::compute(&quote, &bars, &IndicatorParams::default());

        assert_eq!(m.sma_long, None);
        assert_eq!(m.volatility, None);
        assert_eq!(m.rsi, None);
        assert!(m.change_rate > 0.0);
        assert_eq!(m.up_streak, 2);
    }

    #[test]
    fn streaks_and_change_flow_through() {
        let bars = make_bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let quote = quote_for(&bars);
        let m = MetricSet::compute(&quote, &bars, &IndicatorParams::default());

        assert_eq!(m.up_streak, 5);
        assert_eq!(m.down_streak, 0);
        assert!(m.is_advancing());
        assert_approx(m.change_rate, (105.0 / 104.0 - 1.0) * 100.0, 1e-9);
    }

    #[test]
    fn new_high_requires_breaking_prior_window() {
        let bars = make_bars(&[100.0, 102.0, 101.0, 110.0]);
        let quote = quote_for(&bars);
        let m = MetricSet::compute(&quote, &bars, &IndicatorParams::default());
        // prior highs: 103, 103.5(ish), 103 — close 110 breaks them
        assert!(m.is_new_high);
        assert!(!m.is_new_low);
    }

    #[test]
    fn position_in_range_degenerate_reads_midpoint() {
        assert_eq!(position_in_range(100.0, 100.0, 100.0), 50.0);
    }

    #[test]
    fn limit_run_counts_trailing_limit_moves() {
        // two consecutive +30% closes at the end
        let bars = make_bars(&[100.0, 101.0, 131.3, 170.7]);
        assert_eq!(limit_run(&bars, 29.5, true), 2);
        assert_eq!(limit_run(&bars, 29.5, false), 0);
        // a normal move at the end breaks the run immediately
        let bars = make_bars(&[100.0, 130.0, 131.0]);
        assert_eq!(limit_run(&bars, 29.5, true), 0);
    }

    #[test]
    fn compute_is_idempotent() {
        let bars = make_bars(&[100.0, 104.0, 99.0, 108.0, 103.0, 111.0]);
        let quote = quote_for(&bars);
        let params = IndicatorParams::default();
        let a = MetricSet::compute(&quote, &bars, &params);
        let b = MetricSet::compute(&quote, &bars, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn first_cycle_falls_back_to_quote_range() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let quote = Quote {
            code: "035720".into(),
            name: "Kakao".into(),
            market: Market::Kosdaq,
            price: 50_000.0,
            open: 49_500.0,
            high: 50_500.0,
            low: 49_000.0,
            prev_close: 49_800.0,
            volume: 500_000,
            ts,
        };
        let m = MetricSet::compute(&quote, &[], &IndicatorParams::default());
        assert_eq!(m.window_high, 50_500.0);
        assert_eq!(m.window_low, 49_000.0);
        assert!(!m.is_new_high);
    }
}
