//! Cycle coordinator — drives one pull-compute-publish iteration.
//!
//! Per cycle: fetch snapshot -> append history -> per-instrument
//! metric/pattern computation fanned out across the rayon pool ->
//! barrier -> alert evaluation -> atomic publish -> cache
//! invalidation. The history store is written only here (single
//! writer); the fan-out reads it immutably.
//!
//! A cycle that blows its deadline (2x the cadence) publishes nothing:
//! partial results are discarded and the next cycle starts fresh.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};

use rankscan_core::{HistoryStore, Instrument, MetricSet, Pattern, Quote};

use crate::alert::AlertEngine;
use crate::cache::QueryCache;
use crate::config::ScanConfig;
use crate::error::CycleError;
use crate::snapshot::{CycleSnapshot, SharedCycle};
use crate::source::{fetch_with_retry, MarketSnapshotSource};

/// What one coordinator pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub seq: u64,
    pub instruments: usize,
    /// Instruments excluded by per-instrument fault isolation.
    pub excluded: usize,
    pub alerts: usize,
}

pub struct CycleCoordinator {
    config: ScanConfig,
    universe: Vec<Instrument>,
    source: Arc<dyn MarketSnapshotSource>,
    history: HistoryStore,
    alerts: AlertEngine,
    shared: SharedCycle,
    cache: Arc<QueryCache>,
    seq: u64,
}

impl CycleCoordinator {
    pub fn new(
        config: ScanConfig,
        universe: Vec<Instrument>,
        source: Arc<dyn MarketSnapshotSource>,
        shared: SharedCycle,
        cache: Arc<QueryCache>,
    ) -> Self {
        let history = HistoryStore::new(config.cycle.history_capacity);
        let alerts = AlertEngine::with_defaults(&config.alerts);
        Self { config, universe, source, history, alerts, shared, cache, seq: 0 }
    }

    /// Runs one full cycle. On error nothing is published and the
    /// previous snapshot stays live.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let budget = Duration::from_secs(self.config.cycle.cadence_secs * 2);
        let deadline = started + budget;

        let codes: Vec<String> = self.universe.iter().map(|i| i.code.clone()).collect();
        let quotes = fetch_with_retry(self.source.as_ref(), &codes, &self.config.retry, deadline)?;

        // Single-writer history update, then a read-only parallel
        // fan-out with a barrier before alerting.
        for quote in &quotes {
            let bar = quote.to_bar();
            if bar.is_sane() {
                self.history.append(&quote.code, bar);
            } else {
                warn!(code = %quote.code, "insane bar skipped");
            }
        }

        let history = &self.history;
        let config = &self.config;
        let computed: Vec<Option<(String, MetricSet, Vec<Pattern>)>> = quotes
            .par_iter()
            .map(|quote| compute_instrument(quote, history, config))
            .collect();

        let mut metrics = HashMap::new();
        let mut patterns = HashMap::new();
        let mut excluded = 0usize;
        for item in computed {
            match item {
                Some((code, m, p)) => {
                    patterns.insert(code.clone(), p);
                    metrics.insert(code, m);
                }
                None => excluded += 1,
            }
        }

        if started.elapsed() > budget {
            return Err(CycleError::DeadlineExceeded {
                elapsed_ms: started.elapsed().as_millis() as u64,
                budget_ms: budget.as_millis() as u64,
            });
        }

        let now = Utc::now();
        let emitted = self.alerts.evaluate_cycle(&metrics, &patterns, now);

        self.seq += 1;
        let report = CycleReport {
            seq: self.seq,
            instruments: metrics.len(),
            excluded,
            alerts: emitted.len(),
        };
        self.shared.publish(CycleSnapshot {
            seq: self.seq,
            ts: Some(now),
            metrics,
            patterns,
            alerts: emitted,
            recent_alerts: self.alerts.recent(),
        });

        // Ranked views and alert queries derived from the previous
        // cycle's history are stale now.
        self.cache.invalidate_containing("ranking:");
        self.cache.invalidate_containing("high_low:");
        self.cache.invalidate_containing("limit:");
        self.cache.invalidate_containing("streak:");
        self.cache.invalidate_containing("gap:");
        self.cache.invalidate_containing("alerts:");

        info!(
            seq = report.seq,
            instruments = report.instruments,
            excluded = report.excluded,
            alerts = report.alerts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle published"
        );
        Ok(report)
    }

    /// Drives cycles at the configured cadence until `stop` flips.
    /// Failed cycles are reported and skipped; the loop keeps going.
    pub fn run_loop(&mut self, stop: &AtomicBool) {
        let cadence = Duration::from_secs(self.config.cycle.cadence_secs);
        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            match self.run_cycle() {
                Ok(_) => {}
                Err(err) => warn!(error = %err, "cycle skipped"),
            }
            let elapsed = started.elapsed();
            if elapsed < cadence {
                let mut remaining = cadence - elapsed;
                // sleep in short slices so a stop request is honored
                // promptly
                while remaining > Duration::ZERO && !stop.load(Ordering::Relaxed) {
                    let slice = remaining.min(Duration::from_millis(200));
                    std::thread::sleep(slice);
                    remaining = remaining.saturating_sub(slice);
                }
            }
        }
    }

    pub fn shared(&self) -> SharedCycle {
        self.shared.clone()
    }
}

/// Per-instrument computation with fault isolation: a panicking or
/// degenerate instrument is excluded from this cycle's output without
/// aborting the cycle for the others.
fn compute_instrument(
    quote: &Quote,
    history: &HistoryStore,
    config: &ScanConfig,
) -> Option<(String, MetricSet, Vec<Pattern>)> {
    if !quote.price.is_finite() || quote.price <= 0.0 {
        warn!(code = %quote.code, price = quote.price, "degenerate quote excluded");
        return None;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let bars = history.series(&quote.code);
        let metrics = MetricSet::compute(quote, bars, &config.indicators);
        let patterns = rankscan_core::patterns::detect_all(bars, &config.patterns);
        (metrics, patterns)
    }));

    match result {
        Ok((metrics, patterns)) => Some((quote.code.clone(), metrics, patterns)),
        Err(_) => {
            warn!(code = %quote.code, "instrument computation panicked, excluded this cycle");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::StaticSource;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rankscan_core::Market;

    fn instrument(code: &str) -> Instrument {
        Instrument::new(code, format!("Name {code}"), Market::Kospi)
    }

    fn quote(code: &str, price: f64, prev_close: f64, cycle: i64) -> Quote {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
            + ChronoDuration::seconds(30 * cycle);
        Quote {
            code: code.into(),
            name: format!("Name {code}"),
            market: Market::Kospi,
            price,
            open: prev_close,
            high: price.max(prev_close) + 10.0,
            low: price.min(prev_close) - 10.0,
            prev_close,
            volume: 100_000,
            ts,
        }
    }

    fn coordinator_with(source: StaticSource) -> (CycleCoordinator, SharedCycle, Arc<QueryCache>) {
        let config = ScanConfig::default();
        let shared = SharedCycle::new();
        let cache = Arc::new(QueryCache::new(&config.cache));
        let coordinator = CycleCoordinator::new(
            config,
            vec![instrument("005930"), instrument("000660")],
            Arc::new(source),
            shared.clone(),
            cache.clone(),
        );
        (coordinator, shared, cache)
    }

    #[test]
    fn cycle_publishes_metrics_and_patterns() {
        let source = StaticSource::fixed(vec![
            quote("005930", 51_000.0, 50_000.0, 0),
            quote("000660", 98_000.0, 100_000.0, 0),
        ]);
        let (mut coordinator, shared, _) = coordinator_with(source);

        let report = coordinator.run_cycle().unwrap();
        assert_eq!(report.seq, 1);
        assert_eq!(report.instruments, 2);
        assert_eq!(report.excluded, 0);

        let snap = shared.load();
        assert!(snap.is_published());
        assert_eq!(snap.metrics.len(), 2);
        assert!(snap.metrics["005930"].change_rate > 0.0);
        assert!(snap.metrics["000660"].change_rate < 0.0);
    }

    #[test]
    fn history_accumulates_across_cycles() {
        let source = StaticSource::scripted(vec![
            Ok(vec![quote("005930", 50_000.0, 50_000.0, 0)]),
            Ok(vec![quote("005930", 50_500.0, 50_000.0, 1)]),
            Ok(vec![quote("005930", 51_000.0, 50_500.0, 2)]),
        ]);
        let (mut coordinator, shared, _) = coordinator_with(source);

        for _ in 0..3 {
            coordinator.run_cycle().unwrap();
        }
        let snap = shared.load();
        assert_eq!(snap.seq, 3);
        assert_eq!(snap.metrics["005930"].up_streak, 2);
    }

    #[test]
    fn failed_source_publishes_nothing() {
        let source = StaticSource::scripted(vec![
            Err(SourceError::Auth("bad key".into())),
        ]);
        let (mut coordinator, shared, _) = coordinator_with(source);

        let err = coordinator.run_cycle().unwrap_err();
        assert!(matches!(err, CycleError::Source(SourceError::Auth(_))));
        assert!(!shared.load().is_published());
    }

    #[test]
    fn recovery_after_failed_cycle() {
        let source = StaticSource::scripted(vec![
            Err(SourceError::Auth("bad key".into())),
            Ok(vec![quote("005930", 51_000.0, 50_000.0, 1)]),
        ]);
        let (mut coordinator, shared, _) = coordinator_with(source);

        assert!(coordinator.run_cycle().is_err());
        let report = coordinator.run_cycle().unwrap();
        assert_eq!(report.seq, 1);
        assert_eq!(shared.load().seq, 1);
    }

    #[test]
    fn degenerate_quote_is_excluded_others_proceed() {
        let source = StaticSource::fixed(vec![
            quote("005930", 51_000.0, 50_000.0, 0),
            quote("000660", f64::NAN, 100_000.0, 0),
        ]);
        let (mut coordinator, shared, _) = coordinator_with(source);

        let report = coordinator.run_cycle().unwrap();
        assert_eq!(report.instruments, 1);
        assert_eq!(report.excluded, 1);
        let snap = shared.load();
        assert!(snap.metrics.contains_key("005930"));
        assert!(!snap.metrics.contains_key("000660"));
    }

    #[test]
    fn cycle_commit_drops_stale_ranked_views() {
        let source = StaticSource::fixed(vec![quote("005930", 51_000.0, 50_000.0, 0)]);
        let (mut coordinator, _, cache) = coordinator_with(source);

        cache
            .get_or_compute("ranking:CHANGE_RATE:Desc:ALL:20:x", Duration::from_secs(60), || {
                Ok(serde_json::json!(1))
            })
            .unwrap();
        assert_eq!(cache.len(), 1);
        coordinator.run_cycle().unwrap();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn run_loop_stops_when_flagged() {
        let source = StaticSource::fixed(vec![quote("005930", 51_000.0, 50_000.0, 0)]);
        let (mut coordinator, shared, _) = coordinator_with(source);

        let stop = Arc::new(AtomicBool::new(false));
        let flipper = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                stop.store(true, Ordering::Relaxed);
            })
        };
        coordinator.run_loop(&stop);
        flipper.join().unwrap();
        assert!(shared.load().is_published());
    }

    #[test]
    fn surge_emits_an_alert_through_the_pipeline() {
        let source = StaticSource::fixed(vec![quote("005930", 56_700.0, 45_000.0, 0)]);
        let (mut coordinator, shared, _) = coordinator_with(source);

        let report = coordinator.run_cycle().unwrap();
        assert!(report.alerts >= 1);
        let snap = shared.load();
        assert!(snap.alerts.iter().any(|a| a.code == "005930"));
        assert_eq!(snap.recent_alerts.len(), snap.alerts.len());
    }
}
