//! Double top / double bottom over local extrema.
//!
//! Two comparable extremes separated by an opposing pivot inside the
//! structure window. Confidence grows as the extremes get closer in
//! price and the pivot between them gets deeper, clamped to [0, 100].

use crate::domain::Bar;
use crate::patterns::{Direction, Pattern, PatternKind, PatternParams};

/// Neighborhood half-width for local-extremum detection.
const PIVOT_SPAN: usize = 2;
/// Minimum pivot depth (percent) for the structure to count.
const MIN_PIVOT_DEPTH_PCT: f64 = 1.0;
/// Pivot depth (percent) at which the depth factor saturates.
const FULL_PIVOT_DEPTH_PCT: f64 = 5.0;

pub fn detect_double_top(bars: &[Bar], params: &PatternParams) -> Option<Pattern> {
    let tail = structure_window(bars, params.extremum_window)?;
    let highs: Vec<f64> = tail.iter().map(|b| b.high).collect();
    let peaks = local_extrema(&highs, PIVOT_SPAN, Extremum::Max);
    let (first, second) = last_pair(&peaks)?;

    let (a, b) = (highs[first], highs[second]);
    let diff_pct = (a - b).abs() / a.max(b) * 100.0;
    if diff_pct > params.extremum_tolerance_pct {
        return None;
    }

    let pivot = tail[first..=second].iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let depth_pct = (a.min(b) - pivot) / a.min(b) * 100.0;
    if !(depth_pct >= MIN_PIVOT_DEPTH_PCT) {
        return None;
    }

    let confidence = score(diff_pct, depth_pct);
    Some(
        Pattern::new(PatternKind::DoubleTop, Direction::Bearish, confidence)
            // neckline is the target, the higher peak the invalidation
            .with_levels(Some(pivot), Some(a.max(b))),
    )
}

pub fn detect_double_bottom(bars: &[Bar], params: &PatternParams) -> Option<Pattern> {
    let tail = structure_window(bars, params.extremum_window)?;
    let lows: Vec<f64> = tail.iter().map(|b| b.low).collect();
    let valleys = local_extrema(&lows, PIVOT_SPAN, Extremum::Min);
    let (first, second) = last_pair(&valleys)?;

    let (a, b) = (lows[first], lows[second]);
    if a.min(b) <= 0.0 {
        return None;
    }
    let diff_pct = (a - b).abs() / a.min(b) * 100.0;
    if diff_pct > params.extremum_tolerance_pct {
        return None;
    }

    let pivot = tail[first..=second].iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let depth_pct = (pivot - a.max(b)) / a.max(b) * 100.0;
    if !(depth_pct >= MIN_PIVOT_DEPTH_PCT) {
        return None;
    }

    let confidence = score(diff_pct, depth_pct);
    Some(
        Pattern::new(PatternKind::DoubleBottom, Direction::Bullish, confidence)
            .with_levels(Some(pivot), Some(a.min(b))),
    )
}

fn structure_window(bars: &[Bar], window: usize) -> Option<&[Bar]> {
    // Enough room for two pivots plus their neighborhoods.
    if bars.len() < PIVOT_SPAN * 4 + 3 {
        return None;
    }
    let start = bars.len().saturating_sub(window);
    Some(&bars[start..])
}

fn score(diff_pct: f64, depth_pct: f64) -> f64 {
    let similarity = 100.0 - 10.0 * diff_pct;
    let depth_factor = (depth_pct / FULL_PIVOT_DEPTH_PCT).min(1.0);
    similarity * depth_factor
}

enum Extremum {
    Max,
    Min,
}

/// Indices that are the strict extremum of their +-span neighborhood.
fn local_extrema(values: &[f64], span: usize, which: Extremum) -> Vec<usize> {
    let n = values.len();
    let mut out = Vec::new();
    if n < span * 2 + 1 {
        return out;
    }
    'outer: for i in span..n - span {
        let v = values[i];
        if v.is_nan() {
            continue;
        }
        for j in i - span..=i + span {
            if j == i {
                continue;
            }
            let other = values[j];
            let beaten = match which {
                Extremum::Max => v > other,
                Extremum::Min => v < other,
            };
            if !beaten {
                continue 'outer;
            }
        }
        out.push(i);
    }
    out
}

/// The two most recent extrema, at least one pivot span apart.
fn last_pair(indices: &[usize]) -> Option<(usize, usize)> {
    let &second = indices.last()?;
    let &first = indices
        .iter()
        .rev()
        .find(|&&i| second - i > PIVOT_SPAN)?;
    Some((first, second))
}
