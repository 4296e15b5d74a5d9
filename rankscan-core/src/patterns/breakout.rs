//! Breakout / breakdown versus the trailing range.
//!
//! The level is the rolling max high (min low) over the trailing
//! window, current bar excluded. A close within the proximity band
//! below the level, or anywhere above it, triggers; confidence reads
//! 50 at the level and gains (loses) 25 per percent beyond (short of)
//! it, clamped to [0, 100].

use crate::domain::Bar;
use crate::patterns::{Direction, Pattern, PatternKind, PatternParams};

pub fn detect_breakout(bars: &[Bar], params: &PatternParams) -> Option<Pattern> {
    let (close, level) = trailing_level(bars, params.breakout_window, Level::High)?;
    let distance_pct = (close / level - 1.0) * 100.0;
    if distance_pct < -params.breakout_proximity_pct {
        return None;
    }
    Some(
        Pattern::new(
            PatternKind::Breakout,
            Direction::Bullish,
            50.0 + distance_pct * 25.0,
        )
        // broken resistance becomes the protective level
        .with_levels(None, Some(level)),
    )
}

pub fn detect_breakdown(bars: &[Bar], params: &PatternParams) -> Option<Pattern> {
    let (close, level) = trailing_level(bars, params.breakout_window, Level::Low)?;
    let distance_pct = (1.0 - close / level) * 100.0;
    if distance_pct < -params.breakout_proximity_pct {
        return None;
    }
    Some(
        Pattern::new(
            PatternKind::Breakdown,
            Direction::Bearish,
            50.0 + distance_pct * 25.0,
        )
        .with_levels(None, Some(level)),
    )
}

enum Level {
    High,
    Low,
}

/// Latest close plus the rolling extreme over the trailing window
/// (current bar excluded). None when history is too short or the
/// inputs are degenerate.
fn trailing_level(bars: &[Bar], window: usize, which: Level) -> Option<(f64, f64)> {
    if bars.len() < window + 1 {
        return None;
    }
    let close = bars.last()?.close;
    let trailing = &bars[bars.len() - 1 - window..bars.len() - 1];
    let level = match which {
        Level::High => trailing.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max),
        Level::Low => trailing.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
    };
    if close.is_nan() || level.is_nan() || level <= 0.0 {
        return None;
    }
    Some((close, level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    fn params() -> PatternParams {
        PatternParams { breakout_window: 5, ..Default::default() }
    }

    #[test]
    fn close_above_trailing_high_is_bullish() {
        // trailing highs peak around 105; final close far above
        let bars = make_bars(&[100.0, 102.0, 104.0, 103.0, 101.0, 102.0, 120.0]);
        let p = detect_breakout(&bars, &params()).unwrap();
        assert_eq!(p.kind, PatternKind::Breakout);
        assert_eq!(p.direction, Direction::Bullish);
        assert!(p.confidence > 50.0);
        assert!(p.stop.is_some());
    }

    #[test]
    fn close_far_below_level_does_not_trigger() {
        let bars = make_bars(&[100.0, 102.0, 104.0, 103.0, 101.0, 102.0, 90.0]);
        assert!(detect_breakout(&bars, &params()).is_none());
    }

    #[test]
    fn close_within_proximity_band_triggers_below_50() {
        // level ~ 105 high; close at ~104 is within 2% below
        let bars = make_bars(&[100.0, 102.0, 104.0, 103.0, 101.0, 102.0, 104.0]);
        let p = detect_breakout(&bars, &params()).unwrap();
        assert!(p.confidence < 50.0);
    }

    #[test]
    fn confidence_monotonic_in_exceedance() {
        let small = make_bars(&[100.0, 102.0, 104.0, 103.0, 101.0, 102.0, 106.0]);
        let large = make_bars(&[100.0, 102.0, 104.0, 103.0, 101.0, 102.0, 112.0]);
        let c_small = detect_breakout(&small, &params()).unwrap().confidence;
        let c_large = detect_breakout(&large, &params()).unwrap().confidence;
        assert!(c_large > c_small);
    }

    #[test]
    fn breakdown_mirrors_breakout() {
        let bars = make_bars(&[100.0, 98.0, 96.0, 97.0, 99.0, 98.0, 80.0]);
        let p = detect_breakdown(&bars, &params()).unwrap();
        assert_eq!(p.kind, PatternKind::Breakdown);
        assert_eq!(p.direction, Direction::Bearish);
        assert!(p.confidence > 50.0);
    }

    #[test]
    fn short_history_detects_nothing() {
        let bars = make_bars(&[100.0, 101.0]);
        assert!(detect_breakout(&bars, &params()).is_none());
        assert!(detect_breakdown(&bars, &params()).is_none());
    }
}
