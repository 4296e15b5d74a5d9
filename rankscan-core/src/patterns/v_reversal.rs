//! V-reversal — a sharp move to a pivot followed by a sharp retrace.
//!
//! Bullish: decline of at least the configured move into the window's
//! lowest close, then a recovery of at least half the decline.
//! Bearish is the mirror (spike up, then give-back). Confidence is the
//! retraced fraction of the initial move, capped at 100.

use crate::domain::Bar;
use crate::patterns::{Direction, Pattern, PatternKind, PatternParams};

/// Fraction of the initial move that must be retraced.
const MIN_RETRACE: f64 = 0.5;

pub fn detect_v_reversal(bars: &[Bar], params: &PatternParams) -> Option<Pattern> {
    let window = params.extremum_window;
    if bars.len() < 5 {
        return None;
    }
    let start = bars.len().saturating_sub(window);
    let closes: Vec<f64> = bars[start..].iter().map(|b| b.close).collect();
    if closes.iter().any(|c| c.is_nan()) {
        return None;
    }

    bullish_v(&closes, params.reversal_move_pct)
        .or_else(|| bearish_v(&closes, params.reversal_move_pct))
}

fn bullish_v(closes: &[f64], move_pct: f64) -> Option<Pattern> {
    let pivot_idx = arg_extreme(closes, |a, b| a < b)?;
    if pivot_idx == 0 || pivot_idx == closes.len() - 1 {
        return None;
    }
    let pivot = closes[pivot_idx];
    let peak_before = closes[..pivot_idx].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if peak_before <= 0.0 || pivot <= 0.0 {
        return None;
    }

    let decline_pct = (peak_before - pivot) / peak_before * 100.0;
    if decline_pct < move_pct {
        return None;
    }
    let retrace = (closes[closes.len() - 1] - pivot) / (peak_before - pivot);
    if retrace < MIN_RETRACE {
        return None;
    }

    Some(
        Pattern::new(PatternKind::VReversal, Direction::Bullish, retrace * 100.0)
            .with_levels(Some(peak_before), Some(pivot)),
    )
}

fn bearish_v(closes: &[f64], move_pct: f64) -> Option<Pattern> {
    let pivot_idx = arg_extreme(closes, |a, b| a > b)?;
    if pivot_idx == 0 || pivot_idx == closes.len() - 1 {
        return None;
    }
    let pivot = closes[pivot_idx];
    let trough_before = closes[..pivot_idx].iter().cloned().fold(f64::INFINITY, f64::min);
    if trough_before <= 0.0 {
        return None;
    }

    let rally_pct = (pivot - trough_before) / trough_before * 100.0;
    if rally_pct < move_pct {
        return None;
    }
    let retrace = (pivot - closes[closes.len() - 1]) / (pivot - trough_before);
    if retrace < MIN_RETRACE {
        return None;
    }

    Some(
        Pattern::new(PatternKind::VReversal, Direction::Bearish, retrace * 100.0)
            .with_levels(Some(trough_before), Some(pivot)),
    )
}

/// Index of the extreme element under `better(candidate, incumbent)`.
fn arg_extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            None => best = Some(i),
            Some(b) if better(v, values[b]) => best = Some(i),
            _ => {}
        }
    }
    best
}
