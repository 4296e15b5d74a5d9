//! HistoryStore — bounded rolling bar series per instrument.
//!
//! One series per instrument code, capacity-bounded with ring
//! semantics: the oldest bar is evicted once the capacity is exceeded.
//! The store has a single writer (the cycle coordinator); all other
//! stages read through borrowed slices.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::Bar;

/// Bounded, insertion-ordered series of bars for one instrument.
///
/// Backed by a `Vec` that is allowed to grow to twice the capacity
/// before the stale front half is drained, so `push` stays O(1)
/// amortized while views remain contiguous slices.
#[derive(Debug, Clone)]
pub struct HistorySeries {
    bars: Vec<Bar>,
    capacity: usize,
}

impl HistorySeries {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "history capacity must be >= 1");
        Self { bars: Vec::new(), capacity }
    }

    /// Appends a bar, enforcing strictly increasing timestamps.
    ///
    /// A bar whose timestamp is not newer than the latest stored bar is
    /// ignored and `false` is returned. A repeated poll inside one
    /// cadence must not produce duplicate bars, or streak and gap logic
    /// would see phantom ties.
    pub fn push(&mut self, bar: Bar) -> bool {
        if let Some(last) = self.bars.last() {
            if bar.ts <= last.ts {
                return false;
            }
        }
        self.bars.push(bar);
        if self.bars.len() >= self.capacity * 2 {
            self.bars.drain(..self.bars.len() - self.capacity);
        }
        true
    }

    /// Read-only view of the retained window (at most `capacity` bars,
    /// oldest first).
    pub fn bars(&self) -> &[Bar] {
        let start = self.bars.len().saturating_sub(self.capacity);
        &self.bars[start..]
    }

    /// The most recent `window` bars, or fewer if history is shorter.
    /// Short history is a valid state, not an error.
    pub fn recent(&self, window: usize) -> &[Bar] {
        let view = self.bars();
        let start = view.len().saturating_sub(window);
        &view[start..]
    }

    pub fn len(&self) -> usize {
        self.bars().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars().is_empty()
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars().last()
    }
}

/// Per-instrument history, keyed by instrument code.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    capacity: usize,
    series: HashMap<String, HistorySeries>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "history capacity must be >= 1");
        Self { capacity, series: HashMap::new() }
    }

    /// Appends one bar for `code`, creating the series on first sight.
    pub fn append(&mut self, code: &str, bar: Bar) {
        let series = self
            .series
            .entry(code.to_string())
            .or_insert_with(|| HistorySeries::new(self.capacity));
        if !series.push(bar) {
            debug!(code, "dropped bar with non-increasing timestamp");
        }
    }

    /// Full retained series for `code`. Unknown instruments yield an
    /// empty slice — first-cycle instruments always start empty.
    pub fn series(&self, code: &str) -> &[Bar] {
        self.series.get(code).map(HistorySeries::bars).unwrap_or(&[])
    }

    /// The most recent `window` bars for `code`.
    pub fn recent(&self, code: &str, window: usize) -> &[Bar] {
        self.series
            .get(code)
            .map(|s| s.recent(window))
            .unwrap_or(&[])
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Codes with at least one retained bar.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
