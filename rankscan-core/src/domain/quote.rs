//! Quote — one instrument's snapshot record at the source boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Market};

/// Current per-instrument quote delivered by the snapshot source once
/// per polling cycle.
///
/// Derived accessors guard every zero reference: a zero previous close
/// or zero low yields 0.0, never infinity or NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub volume: u64,
    pub ts: DateTime<Utc>,
}

impl Quote {
    /// Absolute change versus the previous close.
    pub fn change(&self) -> f64 {
        self.price - self.prev_close
    }

    /// Day-over-day change rate in percent. Zero reference reports 0.0.
    pub fn change_rate(&self) -> f64 {
        if self.prev_close == 0.0 {
            return 0.0;
        }
        (self.price - self.prev_close) / self.prev_close * 100.0
    }

    /// Price times accumulated volume.
    pub fn trading_value(&self) -> f64 {
        self.price * self.volume as f64
    }

    /// Intraday range rate: (high - low) / low in percent.
    pub fn range_rate(&self) -> f64 {
        if self.low == 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.low * 100.0
    }

    /// The bar this quote contributes to the history store.
    pub fn to_bar(&self) -> Bar {
        Bar {
            ts: self.ts,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.price,
            volume: self.volume,
        }
    }
}
