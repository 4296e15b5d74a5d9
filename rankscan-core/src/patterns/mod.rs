//! Structural pattern detection.
//!
//! Each detector is a pure function of the bar series returning zero or
//! one pattern per kind per cycle. Detectors are independent: the
//! absence of one pattern never suppresses another. Confidence scores
//! are heuristic, bounded to [0, 100], and monotonic in how cleanly the
//! structural criteria are met.

pub mod breakout;
pub mod double_extreme;
pub mod gap;
pub mod streak;
pub mod triangle;
pub mod v_reversal;

use serde::{Deserialize, Serialize};

pub use breakout::{detect_breakdown, detect_breakout};
pub use double_extreme::{detect_double_bottom, detect_double_top};
pub use gap::detect_gap;
pub use streak::detect_streak;
pub use triangle::detect_triangle;
pub use v_reversal::detect_v_reversal;

use crate::domain::Bar;

/// Discrete structural event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    Breakout,
    Breakdown,
    GapUp,
    GapDown,
    StreakUp,
    StreakDown,
    Triangle,
    DoubleTop,
    DoubleBottom,
    VReversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

/// A detected structural event for one instrument in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub direction: Direction,
    /// Heuristic score in [0, 100].
    pub confidence: f64,
    pub target: Option<f64>,
    pub stop: Option<f64>,
}

impl Pattern {
    pub fn new(kind: PatternKind, direction: Direction, confidence: f64) -> Self {
        Self {
            kind,
            direction,
            confidence: confidence.clamp(0.0, 100.0),
            target: None,
            stop: None,
        }
    }

    pub fn with_levels(mut self, target: Option<f64>, stop: Option<f64>) -> Self {
        self.target = target;
        self.stop = stop;
        self
    }
}

/// Detection windows and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternParams {
    /// Trailing window for breakout levels.
    pub breakout_window: usize,
    /// How close to the level (percent below) a close already counts.
    pub breakout_proximity_pct: f64,
    /// Gap significance threshold, percent.
    pub gap_threshold_pct: f64,
    /// Trailing window for triangle trend fits.
    pub triangle_window: usize,
    /// Minimum streak length that registers as a pattern.
    pub streak_threshold: u32,
    /// Window for double-extreme and V-reversal structure.
    pub extremum_window: usize,
    /// Max relative difference between the two extremes, percent.
    pub extremum_tolerance_pct: f64,
    /// Minimum decline (or rally) for a V-reversal, percent.
    pub reversal_move_pct: f64,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            breakout_window: 20,
            breakout_proximity_pct: 2.0,
            gap_threshold_pct: 3.0,
            triangle_window: 30,
            streak_threshold: 3,
            extremum_window: 30,
            extremum_tolerance_pct: 3.0,
            reversal_move_pct: 5.0,
        }
    }
}

/// Runs every detector over the series and collects the hits.
pub fn detect_all(bars: &[Bar], params: &PatternParams) -> Vec<Pattern> {
    [
        detect_breakout(bars, params),
        detect_breakdown(bars, params),
        detect_gap(bars, params),
        detect_streak(bars, params),
        detect_triangle(bars, params),
        detect_double_top(bars, params),
        detect_double_bottom(bars, params),
        detect_v_reversal(bars, params),
    ]
    .into_iter()
    .flatten()
    .collect()
}
