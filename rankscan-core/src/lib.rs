//! RankScan Core — domain types, rolling history, metrics, patterns.
//!
//! This crate contains the pure heart of the scanner:
//! - Domain types (instruments, bars, quotes)
//! - Bounded rolling history store with ring semantics
//! - Indicator functions (moving averages, RSI, ATR, ROC, volatility,
//!   streak counters) and the per-cycle MetricSet
//! - Structural pattern detectors (breakout, gap, triangle, double
//!   top/bottom, V-reversal, streaks)
//!
//! Everything here is synchronous and side-effect free; orchestration,
//! caching, and alerting live in `rankscan-service`.

pub mod domain;
pub mod history;
pub mod indicators;
pub mod metrics;
pub mod patterns;

pub use domain::{Bar, Instrument, Market, MarketFilter, Quote};
pub use history::{HistorySeries, HistoryStore};
pub use metrics::{IndicatorParams, MetricSet};
pub use patterns::{Direction, Pattern, PatternKind, PatternParams};
