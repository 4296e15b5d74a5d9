//! Triangle convergence — trend fits over trailing highs and lows.
//!
//! Least-squares lines through the window's highs and lows. A
//! converging triangle needs a falling high trend, a rising low trend,
//! and the low trend steeper in magnitude. Direction comes from where
//! the latest close sits relative to the channel midline; confidence
//! grows with slope asymmetry and channel compression.

use crate::domain::Bar;
use crate::patterns::{Direction, Pattern, PatternKind, PatternParams};

pub fn detect_triangle(bars: &[Bar], params: &PatternParams) -> Option<Pattern> {
    let window = params.triangle_window;
    if bars.len() < window {
        return None;
    }
    let tail = &bars[bars.len() - window..];
    let highs: Vec<f64> = tail.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = tail.iter().map(|b| b.low).collect();
    let close = tail.last()?.close;
    if close.is_nan() {
        return None;
    }

    let (high_slope, high_intercept) = linear_fit(&highs)?;
    let (low_slope, low_intercept) = linear_fit(&lows)?;

    // Converging: highs falling, lows rising, lows steeper.
    if !(high_slope < 0.0 && low_slope > 0.0 && high_slope.abs() < low_slope.abs()) {
        return None;
    }

    let x_end = (window - 1) as f64;
    let gap_start = high_intercept - low_intercept;
    let gap_end = (high_slope * x_end + high_intercept) - (low_slope * x_end + low_intercept);
    if gap_start <= 0.0 {
        return None;
    }

    let midline = (high_slope * x_end + high_intercept + low_slope * x_end + low_intercept) / 2.0;
    let direction = if close >= midline { Direction::Bullish } else { Direction::Bearish };

    let asymmetry = 1.0 - high_slope.abs() / low_slope.abs();
    let compression = 1.0 - (gap_end / gap_start).max(0.0);
    let confidence = 40.0 + 30.0 * asymmetry + 30.0 * compression;

    // Apex of the two trend lines is the measured move target.
    let apex_x = (low_intercept - high_intercept) / (high_slope - low_slope);
    let target = (apex_x.is_finite() && apex_x > 0.0)
        .then(|| high_slope * apex_x + high_intercept);

    Some(Pattern::new(PatternKind::Triangle, direction, confidence).with_levels(target, None))
}

/// Ordinary least squares over (index, value). None on NaN input or a
/// window too short to fit.
fn linear_fit(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    let slope = num / den;
    Some((slope, y_mean - slope * x_mean))
}
