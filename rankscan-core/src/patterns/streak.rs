//! Consecutive-move streak as a structural event.
//!
//! Registers once the up (or down) streak reaches the configured
//! threshold. Confidence gains 10 points per streak day, capped at 100.

use crate::domain::Bar;
use crate::indicators::streaks;
use crate::patterns::{Direction, Pattern, PatternKind, PatternParams};

pub fn detect_streak(bars: &[Bar], params: &PatternParams) -> Option<Pattern> {
    let state = streaks(bars);
    if state.up >= params.streak_threshold {
        return Some(Pattern::new(
            PatternKind::StreakUp,
            Direction::Bullish,
            state.up as f64 * 10.0,
        ));
    }
    if state.down >= params.streak_threshold {
        return Some(Pattern::new(
            PatternKind::StreakDown,
            Direction::Bearish,
            state.down as f64 * 10.0,
        ));
    }
    None
}
