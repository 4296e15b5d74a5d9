//! Opening gap versus the previous bar's close.
//!
//! gap rate = (open - prev_close) / prev_close * 100, classified
//! Up/Down by sign. Only significant gaps (|rate| >= threshold)
//! produce a pattern; confidence reads 50 at the threshold and scales
//! linearly with the rate, capped at 100.

use crate::domain::Bar;
use crate::patterns::{Direction, Pattern, PatternKind, PatternParams};

pub fn detect_gap(bars: &[Bar], params: &PatternParams) -> Option<Pattern> {
    if bars.len() < 2 {
        return None;
    }
    let prev_close = bars[bars.len() - 2].close;
    let open = bars[bars.len() - 1].open;
    if prev_close.is_nan() || open.is_nan() || prev_close == 0.0 {
        return None;
    }

    let rate = (open - prev_close) / prev_close * 100.0;
    if rate.abs() < params.gap_threshold_pct {
        return None;
    }

    let (kind, direction) = if rate > 0.0 {
        (PatternKind::GapUp, Direction::Bullish)
    } else {
        (PatternKind::GapDown, Direction::Bearish)
    };
    let confidence = 50.0 * rate.abs() / params.gap_threshold_pct;
    Some(Pattern::new(kind, direction, confidence))
}
