//! Ranking engine — sorted, filtered views over one cycle's metrics.
//!
//! Sorting is deterministic: the selected metric in the requested
//! direction, ties broken by instrument code ascending. Summary
//! aggregates always cover the full market-filtered universe, never
//! the truncated ranked list.

use serde::{Deserialize, Serialize};

use rankscan_core::{Market, MarketFilter, MetricSet};

use crate::error::QueryError;

/// Largest count a ranking query may request.
pub const MAX_COUNT: usize = 100;

/// Which metric a ranking sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankMetric {
    ChangeRate,
    /// Intraday high/low range, percent.
    RangeRate,
    /// Annualized log-return volatility; instruments without enough
    /// history are excluded from the ranked list (not the summary).
    Volatility,
    Momentum,
    Volume,
    TradingValue,
}

impl RankMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankMetric::ChangeRate => "CHANGE_RATE",
            RankMetric::RangeRate => "RANGE_RATE",
            RankMetric::Volatility => "VOLATILITY",
            RankMetric::Momentum => "MOMENTUM",
            RankMetric::Volume => "VOLUME",
            RankMetric::TradingValue => "TRADING_VALUE",
        }
    }

    /// Extracts the sort value; `None` excludes the instrument from
    /// the ranked list while leaving it in the summary.
    fn extract(&self, m: &MetricSet) -> Option<f64> {
        let value = match self {
            RankMetric::ChangeRate => m.change_rate,
            RankMetric::RangeRate => m.range_rate,
            RankMetric::Volatility => return m.volatility,
            RankMetric::Momentum => return m.momentum,
            RankMetric::Volume => m.volume as f64,
            RankMetric::TradingValue => m.trading_value,
        };
        (!value.is_nan()).then_some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

/// Immutable ranking query; doubles as the canonical cache-key input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingQuery {
    pub metric: RankMetric,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub market: MarketFilter,
    pub count: usize,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub min_volume: Option<u64>,
}

impl RankingQuery {
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.count == 0 || self.count > MAX_COUNT {
            return Err(QueryError::InvalidQuery(format!(
                "count must be in 1..={MAX_COUNT}, got {}",
                self.count
            )));
        }
        if let Some(p) = self.min_price {
            if !(p >= 0.0) {
                return Err(QueryError::InvalidQuery(format!(
                    "min_price must be >= 0, got {p}"
                )));
            }
        }
        Ok(())
    }

    /// Canonical cache key: stable readable prefix plus a short hash of
    /// the optional filters, so equivalent queries collide.
    pub fn cache_key(&self) -> String {
        let filters = format!("{:?}:{:?}", self.min_price, self.min_volume);
        let digest = blake3::hash(filters.as_bytes());
        format!(
            "ranking:{}:{:?}:{}:{}:{}",
            self.metric.as_str(),
            self.order,
            self.market.as_str(),
            self.count,
            &digest.to_hex()[..8],
        )
    }
}

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub rank: usize,
    pub code: String,
    pub name: String,
    pub market: Market,
    pub price: f64,
    pub prev_close: f64,
    pub change: f64,
    pub change_rate: f64,
    pub volume: u64,
    pub trading_value: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    /// The value the list is sorted by.
    pub metric_value: f64,
}

impl RankedItem {
    fn from_metrics(m: &MetricSet, rank: usize, metric_value: f64) -> Self {
        Self {
            rank,
            code: m.code.clone(),
            name: m.name.clone(),
            market: m.market,
            price: m.price,
            prev_close: m.prev_close,
            change: m.change,
            change_rate: m.change_rate,
            volume: m.volume,
            trading_value: m.trading_value,
            high: m.high,
            low: m.low,
            open: m.open,
            metric_value,
        }
    }
}

/// Breadth aggregates over the full market-filtered universe.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketSummary {
    pub total: usize,
    pub advancing: usize,
    pub declining: usize,
    pub unchanged: usize,
    pub average_change_rate: f64,
    pub median_change_rate: f64,
    /// None when nothing declined (the ratio would be unbounded).
    pub advance_decline_ratio: Option<f64>,
    pub market_breadth: String,
}

impl MarketSummary {
    pub fn compute(universe: &[&MetricSet]) -> Self {
        if universe.is_empty() {
            return Self { market_breadth: "NEUTRAL".into(), ..Default::default() };
        }

        let advancing = universe.iter().filter(|m| m.is_advancing()).count();
        let declining = universe.iter().filter(|m| m.is_declining()).count();
        let unchanged = universe.len() - advancing - declining;

        let mut rates: Vec<f64> =
            universe.iter().map(|m| m.change_rate).filter(|r| !r.is_nan()).collect();
        rates.sort_by(|a, b| a.partial_cmp(b).expect("NaN filtered above"));
        let average = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };
        let median = median_of_sorted(&rates);

        let ratio = (declining > 0).then(|| advancing as f64 / declining as f64);
        Self {
            total: universe.len(),
            advancing,
            declining,
            unchanged,
            average_change_rate: average,
            median_change_rate: median,
            advance_decline_ratio: ratio,
            market_breadth: breadth_label(advancing, declining).into(),
        }
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

fn breadth_label(advancing: usize, declining: usize) -> &'static str {
    if declining == 0 {
        return if advancing > 0 { "VERY_POSITIVE" } else { "NEUTRAL" };
    }
    let ratio = advancing as f64 / declining as f64;
    if ratio > 2.0 {
        "VERY_POSITIVE"
    } else if ratio > 1.5 {
        "POSITIVE"
    } else if ratio > 1.0 {
        "SLIGHTLY_POSITIVE"
    } else if ratio > 0.5 {
        "SLIGHTLY_NEGATIVE"
    } else {
        "NEGATIVE"
    }
}

/// A ranked view plus its full-universe summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    pub items: Vec<RankedItem>,
    pub summary: MarketSummary,
}

/// Ranks `metrics` per `query`. The caller validates the query first;
/// an empty universe yields an empty ranking with a zeroed summary.
pub fn rank(metrics: &[MetricSet], query: &RankingQuery) -> RankingResult {
    let universe: Vec<&MetricSet> =
        metrics.iter().filter(|m| query.market.matches(m.market)).collect();
    let summary = MarketSummary::compute(&universe);

    let mut candidates: Vec<(&MetricSet, f64)> = universe
        .iter()
        .filter(|m| query.min_price.map_or(true, |p| m.price >= p))
        .filter(|m| query.min_volume.map_or(true, |v| m.volume >= v))
        .filter_map(|&m| query.metric.extract(m).map(|value| (m, value)))
        .collect();

    candidates.sort_by(|(a, va), (b, vb)| {
        let ordering = match query.order {
            SortOrder::Desc => vb.partial_cmp(va),
            SortOrder::Asc => va.partial_cmp(vb),
        };
        ordering
            .expect("NaN metric values filtered in extract")
            .then_with(|| a.code.cmp(&b.code))
    });

    let items = candidates
        .into_iter()
        .take(query.count)
        .enumerate()
        .map(|(i, (m, value))| RankedItem::from_metrics(m, i + 1, value))
        .collect();

    RankingResult { items, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use rankscan_core::{IndicatorParams, Quote};

    fn metric(code: &str, market: Market, price: f64, prev_close: f64, volume: u64) -> MetricSet {
        let quote = Quote {
            code: code.into(),
            name: format!("Name {code}"),
            market,
            price,
            open: price,
            high: price * 1.01,
            low: price * 0.99,
            prev_close,
            volume,
            ts: Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
        };
        MetricSet::compute(&quote, &[], &IndicatorParams::default())
    }

    fn gainers_query(count: usize) -> RankingQuery {
        RankingQuery {
            metric: RankMetric::ChangeRate,
            order: SortOrder::Desc,
            market: MarketFilter::All,
            count,
            min_price: None,
            min_volume: None,
        }
    }

    #[test]
    fn sorts_descending_with_code_tie_break() {
        let metrics = vec![
            metric("000020", Market::Kospi, 110.0, 100.0, 1000), // +10%
            metric("000010", Market::Kospi, 105.0, 100.0, 1000), // +5%
            metric("000040", Market::Kosdaq, 105.0, 100.0, 1000), // +5% tie
            metric("000030", Market::Kospi, 120.0, 100.0, 1000), // +20%
        ];
        let result = rank(&metrics, &gainers_query(10));
        let codes: Vec<&str> = result.items.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["000030", "000020", "000010", "000040"]);
        assert_eq!(result.items[0].rank, 1);
        assert_eq!(result.items[3].rank, 4);
    }

    #[test]
    fn losers_query_sorts_ascending() {
        let metrics = vec![
            metric("000010", Market::Kospi, 90.0, 100.0, 1000),
            metric("000020", Market::Kospi, 110.0, 100.0, 1000),
            metric("000030", Market::Kospi, 80.0, 100.0, 1000),
        ];
        let query = RankingQuery { order: SortOrder::Asc, ..gainers_query(10) };
        let result = rank(&metrics, &query);
        let codes: Vec<&str> = result.items.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["000030", "000010", "000020"]);
    }

    #[test]
    fn count_truncates_list_but_not_summary() {
        let metrics: Vec<MetricSet> = (0..10)
            .map(|i| {
                metric(
                    &format!("0000{i:02}"),
                    Market::Kospi,
                    100.0 + i as f64,
                    100.0,
                    1000,
                )
            })
            .collect();
        let result = rank(&metrics, &gainers_query(3));
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.summary.total, 10);
        assert_eq!(result.summary.advancing, 9);
        assert_eq!(result.summary.unchanged, 1);
    }

    #[test]
    fn min_filters_are_inclusive_and_skip_summary() {
        let metrics = vec![
            metric("000010", Market::Kospi, 1000.0, 900.0, 500),
            metric("000020", Market::Kospi, 999.0, 900.0, 5000),
            metric("000030", Market::Kospi, 1500.0, 1600.0, 5000),
        ];
        let query = RankingQuery {
            min_price: Some(1000.0),
            min_volume: Some(500),
            ..gainers_query(10)
        };
        let result = rank(&metrics, &query);
        let codes: Vec<&str> = result.items.iter().map(|i| i.code.as_str()).collect();
        // 000010 passes both inclusive bounds; 000020 fails min_price
        assert_eq!(codes, vec!["000010", "000030"]);
        assert_eq!(result.summary.total, 3);
        assert_eq!(result.summary.declining, 1);
    }

    #[test]
    fn market_filter_restricts_universe_and_summary() {
        let metrics = vec![
            metric("000010", Market::Kospi, 110.0, 100.0, 1000),
            metric("100010", Market::Kosdaq, 120.0, 100.0, 1000),
        ];
        let query = RankingQuery { market: MarketFilter::Kosdaq, ..gainers_query(10) };
        let result = rank(&metrics, &query);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].code, "100010");
        assert_eq!(result.summary.total, 1);
    }

    #[test]
    fn empty_universe_is_zeroed_not_error() {
        let result = rank(&[], &gainers_query(10));
        assert!(result.items.is_empty());
        assert_eq!(result.summary.total, 0);
        assert_eq!(result.summary.average_change_rate, 0.0);
    }

    #[test]
    fn unavailable_metric_excludes_from_list_not_summary() {
        // no history: annualized volatility is None for everyone
        let metrics = vec![metric("000010", Market::Kospi, 110.0, 100.0, 1000)];
        let query = RankingQuery { metric: RankMetric::Volatility, ..gainers_query(10) };
        let result = rank(&metrics, &query);
        assert!(result.items.is_empty());
        assert_eq!(result.summary.total, 1);
    }

    #[test]
    fn summary_mean_and_median() {
        let metrics = vec![
            metric("000010", Market::Kospi, 101.0, 100.0, 1000), // +1%
            metric("000020", Market::Kospi, 102.0, 100.0, 1000), // +2%
            metric("000030", Market::Kospi, 106.0, 100.0, 1000), // +6%
        ];
        let result = rank(&metrics, &gainers_query(10));
        assert!((result.summary.average_change_rate - 3.0).abs() < 1e-9);
        assert!((result.summary.median_change_rate - 2.0).abs() < 1e-9);
        assert_eq!(result.summary.market_breadth, "VERY_POSITIVE");
    }

    #[test]
    fn invalid_count_is_rejected() {
        assert!(gainers_query(0).validate().is_err());
        assert!(gainers_query(101).validate().is_err());
        assert!(gainers_query(100).validate().is_ok());
    }

    #[test]
    fn negative_min_price_is_rejected() {
        let query = RankingQuery { min_price: Some(-1.0), ..gainers_query(10) };
        assert!(query.validate().is_err());
    }

    #[test]
    fn equivalent_queries_share_a_cache_key() {
        let a = gainers_query(20);
        let b = gainers_query(20);
        assert_eq!(a.cache_key(), b.cache_key());
        let c = RankingQuery { min_price: Some(1000.0), ..gainers_query(20) };
        assert_ne!(a.cache_key(), c.cache_key());
    }

    proptest! {
        /// Ordering is deterministic regardless of input order.
        #[test]
        fn ranking_is_input_order_independent(seed in 0u64..1000) {
            let mut metrics: Vec<MetricSet> = (0..20)
                .map(|i| {
                    // a few deliberate ties in change rate
                    let rate_bucket = (i * 7 + seed as usize) % 5;
                    metric(
                        &format!("{:06}", i),
                        Market::Kospi,
                        100.0 + rate_bucket as f64,
                        100.0,
                        1000,
                    )
                })
                .collect();
            let forward = rank(&metrics, &gainers_query(20));
            metrics.reverse();
            let reversed = rank(&metrics, &gainers_query(20));
            prop_assert_eq!(forward, reversed);
        }
    }
}
