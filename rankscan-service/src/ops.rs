//! Query operations — the seven request/response surfaces.
//!
//! Each operation validates its parameters, canonicalizes them into a
//! cache key, and answers from the query cache; on a miss the result is
//! computed from the latest published cycle snapshot. Responses are
//! structured JSON with a `cache_status` marker, so a host transport
//! can forward them verbatim.
//!
//! Invalid parameters are rejected before touching the cache or the
//! engines. An unpublished snapshot (no completed cycle yet) yields
//! empty results, not errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use rankscan_core::{Market, MarketFilter, MetricSet};

use crate::alert::{Priority, RuleKind};
use crate::cache::QueryCache;
use crate::config::ScanConfig;
use crate::error::QueryError;
use crate::ranking::{self, RankMetric, RankingQuery, SortOrder, MAX_COUNT};
use crate::snapshot::SharedCycle;

/// Serves the seven query operations over the latest published cycle.
pub struct QueryService {
    shared: SharedCycle,
    cache: Arc<QueryCache>,
    config: ScanConfig,
}

impl QueryService {
    pub fn new(shared: SharedCycle, cache: Arc<QueryCache>, config: ScanConfig) -> Self {
        Self { shared, cache, config }
    }

    fn respond<F>(&self, key: &str, ttl_secs: u64, compute: F) -> Result<Value, QueryError>
    where
        F: FnOnce() -> Result<Value, QueryError>,
    {
        let ttl = Duration::from_secs(ttl_secs);
        let (mut payload, status) = self.cache.get_or_compute(key, ttl, compute)?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("cache_status".into(), json!(status.as_str()));
        }
        Ok(payload)
    }

    /// Operation 1: price-change ranking (gainers, losers, most
    /// volatile).
    pub fn price_change_ranking(&self, req: &PriceRankingRequest) -> Result<Value, QueryError> {
        let query = req.to_query();
        query.validate()?;
        let key = query.cache_key();
        self.respond(&key, self.config.cache.ranking_ttl_secs, || {
            let snap = self.shared.load();
            let metrics = snap.metric_sets();
            let result = ranking::rank(&metrics, &query);
            Ok(json!({
                "timestamp": Utc::now().to_rfc3339(),
                "ranking_type": req.ranking_type,
                "market": query.market.as_str(),
                "count": result.items.len(),
                "requested_count": query.count,
                "filters": { "min_price": query.min_price, "min_volume": query.min_volume },
                "ranking": result.items,
                "summary": result.summary,
            }))
        })
    }

    /// Operation 2: 52-week high/low view with breakthrough analysis.
    pub fn week52_high_low(&self, req: &HighLowRequest) -> Result<Value, QueryError> {
        req.validate()?;
        let key = format!(
            "high_low:{:?}:{}:{}:{}",
            req.kind,
            req.market.as_str(),
            req.count,
            req.breakthrough_only
        );
        self.respond(&key, self.config.cache.high_low_ttl_secs, || {
            let snap = self.shared.load();
            let universe: Vec<&MetricSet> = snap
                .metrics
                .values()
                .filter(|m| req.market.matches(m.market))
                .collect();

            let highs = high_low_side(&universe, req, true);
            let lows = high_low_side(&universe, req, false);
            let (highs, lows) = match req.kind {
                HighLowKind::High => (truncate(highs, req.count), Vec::new()),
                HighLowKind::Low => (Vec::new(), truncate(lows, req.count)),
                HighLowKind::Both => {
                    (truncate(highs, req.count / 2), truncate(lows, req.count / 2))
                }
            };

            let new_highs = universe.iter().filter(|m| m.is_new_high).count();
            let new_lows = universe.iter().filter(|m| m.is_new_low).count();
            Ok(json!({
                "timestamp": Utc::now().to_rfc3339(),
                "type": req.kind,
                "market": req.market.as_str(),
                "count": highs.len() + lows.len(),
                "breakthrough_only": req.breakthrough_only,
                "high_stocks": highs,
                "low_stocks": lows,
                "statistics": {
                    "new_highs_count": new_highs,
                    "new_lows_count": new_lows,
                    "high_low_ratio": (new_lows > 0)
                        .then(|| new_highs as f64 / new_lows as f64),
                    "market_strength": market_strength(new_highs, new_lows),
                },
            }))
        })
    }

    /// Operation 3: instruments at the daily price limit.
    pub fn limit_stocks(&self, req: &LimitRequest) -> Result<Value, QueryError> {
        let key = format!("limit:{:?}:{}", req.limit_type, req.market.as_str());
        let threshold = self.config.alerts.limit_threshold_pct;
        self.respond(&key, self.config.cache.limit_ttl_secs, || {
            let snap = self.shared.load();
            let universe: Vec<&MetricSet> = snap
                .metrics
                .values()
                .filter(|m| req.market.matches(m.market))
                .collect();

            let upper = limit_side(&universe, threshold, true);
            let lower = limit_side(&universe, threshold, false);
            let (upper_count, lower_count) = (upper.len(), lower.len());
            let (upper, lower) = match req.limit_type {
                LimitKind::Upper => (upper, Vec::new()),
                LimitKind::Lower => (Vec::new(), lower),
                LimitKind::Both => (upper, lower),
            };

            let total = upper_count + lower_count;
            let limit_ratio =
                if total > 0 { upper_count as f64 / total as f64 } else { 0.0 };
            Ok(json!({
                "timestamp": Utc::now().to_rfc3339(),
                "limit_type": req.limit_type,
                "market": req.market.as_str(),
                "upper_limit": upper,
                "lower_limit": lower,
                "summary": {
                    "upper_count": upper_count,
                    "lower_count": lower_count,
                    "limit_ratio": limit_ratio,
                    "market_momentum": market_momentum(limit_ratio, total),
                },
            }))
        })
    }

    /// Operation 4: consecutive-move (streak) stocks.
    pub fn streak_stocks(&self, req: &StreakRequest) -> Result<Value, QueryError> {
        req.validate()?;
        let min_length = req
            .min_length
            .unwrap_or(self.config.patterns.streak_threshold);
        let key = format!(
            "streak:{:?}:{}:{}:{}",
            req.direction,
            req.market.as_str(),
            min_length,
            req.count
        );
        self.respond(&key, self.config.cache.ranking_ttl_secs, || {
            let snap = self.shared.load();
            let mut items: Vec<StreakItem> = snap
                .metrics
                .values()
                .filter(|m| req.market.matches(m.market))
                .filter_map(|m| StreakItem::from_metrics(m, req.direction, min_length))
                .collect();
            items.sort_by(|a, b| {
                b.streak_length
                    .cmp(&a.streak_length)
                    .then_with(|| a.code.cmp(&b.code))
            });
            items.truncate(req.count);
            Ok(json!({
                "timestamp": Utc::now().to_rfc3339(),
                "direction": req.direction,
                "market": req.market.as_str(),
                "min_length": min_length,
                "count": items.len(),
                "stocks": items,
            }))
        })
    }

    /// Operation 5: gap-open stocks.
    pub fn gap_stocks(&self, req: &GapRequest) -> Result<Value, QueryError> {
        req.validate()?;
        let min_gap = req
            .min_gap_rate
            .unwrap_or(self.config.patterns.gap_threshold_pct);
        let key = format!(
            "gap:{:?}:{}:{:.2}:{}",
            req.direction,
            req.market.as_str(),
            min_gap,
            req.count
        );
        self.respond(&key, self.config.cache.ranking_ttl_secs, || {
            let snap = self.shared.load();
            let mut items: Vec<GapItem> = snap
                .metrics
                .values()
                .filter(|m| req.market.matches(m.market))
                .filter_map(|m| GapItem::from_metrics(m, req.direction, min_gap))
                .collect();
            items.sort_by(|a, b| {
                b.gap_rate
                    .abs()
                    .partial_cmp(&a.gap_rate.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.code.cmp(&b.code))
            });
            items.truncate(req.count);
            Ok(json!({
                "timestamp": Utc::now().to_rfc3339(),
                "direction": req.direction,
                "market": req.market.as_str(),
                "min_gap_rate": min_gap,
                "count": items.len(),
                "stocks": items,
            }))
        })
    }

    /// Operation 6: volatility ranking.
    pub fn volatility_ranking(&self, req: &VolatilityRequest) -> Result<Value, QueryError> {
        let metric = match req.basis {
            VolatilityBasis::Intraday => RankMetric::RangeRate,
            VolatilityBasis::Annualized => RankMetric::Volatility,
        };
        let query = RankingQuery {
            metric,
            order: SortOrder::Desc,
            market: req.market,
            count: req.count,
            min_price: req.min_price,
            min_volume: req.min_volume,
        };
        query.validate()?;
        let key = query.cache_key();
        self.respond(&key, self.config.cache.ranking_ttl_secs, || {
            let snap = self.shared.load();
            let metrics = snap.metric_sets();
            let result = ranking::rank(&metrics, &query);
            Ok(json!({
                "timestamp": Utc::now().to_rfc3339(),
                "basis": req.basis,
                "market": query.market.as_str(),
                "count": result.items.len(),
                "requested_count": query.count,
                "ranking": result.items,
                "summary": result.summary,
            }))
        })
    }

    /// Operation 7: recent price alerts, newest first.
    pub fn price_alerts(&self, req: &AlertsRequest) -> Result<Value, QueryError> {
        req.validate()?;
        let key = format!(
            "alerts:{}:{:?}:{:?}:{}",
            req.market.as_str(),
            req.min_priority,
            req.kind,
            req.count
        );
        self.respond(&key, self.config.cache.alerts_ttl_secs, || {
            let snap = self.shared.load();
            let alerts: Vec<&crate::alert::Alert> = snap
                .recent_alerts
                .iter()
                .rev()
                .filter(|a| req.market.matches(a.market))
                .filter(|a| req.min_priority.map_or(true, |p| a.priority >= p))
                .filter(|a| req.kind.map_or(true, |k| a.kind == k))
                .take(req.count)
                .collect();
            Ok(json!({
                "timestamp": Utc::now().to_rfc3339(),
                "market": req.market.as_str(),
                "count": alerts.len(),
                "alerts": alerts,
            }))
        })
    }
}

/// Request for operation 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceRankingRequest {
    pub ranking_type: RankingKind,
    pub market: MarketFilter,
    pub count: usize,
    pub min_price: Option<f64>,
    pub min_volume: Option<u64>,
}

impl Default for PriceRankingRequest {
    fn default() -> Self {
        Self {
            ranking_type: RankingKind::TopGainers,
            market: MarketFilter::All,
            count: 20,
            min_price: None,
            min_volume: None,
        }
    }
}

impl PriceRankingRequest {
    fn to_query(&self) -> RankingQuery {
        let (metric, order) = match self.ranking_type {
            RankingKind::TopGainers => (RankMetric::ChangeRate, SortOrder::Desc),
            RankingKind::TopLosers => (RankMetric::ChangeRate, SortOrder::Asc),
            RankingKind::MostVolatile => (RankMetric::RangeRate, SortOrder::Desc),
        };
        RankingQuery {
            metric,
            order,
            market: self.market,
            count: self.count,
            min_price: self.min_price,
            min_volume: self.min_volume,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingKind {
    TopGainers,
    TopLosers,
    MostVolatile,
}

/// Request for operation 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighLowRequest {
    #[serde(rename = "type")]
    pub kind: HighLowKind,
    pub market: MarketFilter,
    pub count: usize,
    pub breakthrough_only: bool,
}

impl Default for HighLowRequest {
    fn default() -> Self {
        Self {
            kind: HighLowKind::Both,
            market: MarketFilter::All,
            count: 20,
            breakthrough_only: true,
        }
    }
}

impl HighLowRequest {
    fn validate(&self) -> Result<(), QueryError> {
        if self.count == 0 || self.count > 200 {
            return Err(QueryError::InvalidQuery(format!(
                "count must be in 1..=200, got {}",
                self.count
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HighLowKind {
    High,
    Low,
    Both,
}

/// Request for operation 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitRequest {
    pub limit_type: LimitKind,
    pub market: MarketFilter,
}

impl Default for LimitRequest {
    fn default() -> Self {
        Self { limit_type: LimitKind::Both, market: MarketFilter::All }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitKind {
    Upper,
    Lower,
    Both,
}

/// Request for operation 4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakRequest {
    pub direction: MoveDirection,
    pub market: MarketFilter,
    /// Defaults to the configured streak pattern threshold.
    pub min_length: Option<u32>,
    pub count: usize,
}

impl Default for StreakRequest {
    fn default() -> Self {
        Self {
            direction: MoveDirection::Both,
            market: MarketFilter::All,
            min_length: None,
            count: 20,
        }
    }
}

impl StreakRequest {
    fn validate(&self) -> Result<(), QueryError> {
        validate_count(self.count)?;
        if self.min_length == Some(0) {
            return Err(QueryError::InvalidQuery("min_length must be >= 1".into()));
        }
        Ok(())
    }
}

/// Request for operation 5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapRequest {
    pub direction: MoveDirection,
    pub market: MarketFilter,
    /// Defaults to the configured gap significance threshold.
    pub min_gap_rate: Option<f64>,
    pub count: usize,
}

impl Default for GapRequest {
    fn default() -> Self {
        Self {
            direction: MoveDirection::Both,
            market: MarketFilter::All,
            min_gap_rate: None,
            count: 20,
        }
    }
}

impl GapRequest {
    fn validate(&self) -> Result<(), QueryError> {
        validate_count(self.count)?;
        if let Some(rate) = self.min_gap_rate {
            if !(rate >= 0.0) {
                return Err(QueryError::InvalidQuery(format!(
                    "min_gap_rate must be >= 0, got {rate}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveDirection {
    Up,
    Down,
    Both,
}

/// Request for operation 6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityRequest {
    pub basis: VolatilityBasis,
    pub market: MarketFilter,
    pub count: usize,
    pub min_price: Option<f64>,
    pub min_volume: Option<u64>,
}

impl Default for VolatilityRequest {
    fn default() -> Self {
        Self {
            basis: VolatilityBasis::Intraday,
            market: MarketFilter::All,
            count: 20,
            min_price: None,
            min_volume: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityBasis {
    Intraday,
    Annualized,
}

/// Request for operation 7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsRequest {
    pub market: MarketFilter,
    pub min_priority: Option<Priority>,
    pub kind: Option<RuleKind>,
    pub count: usize,
}

impl Default for AlertsRequest {
    fn default() -> Self {
        Self {
            market: MarketFilter::All,
            min_priority: None,
            kind: None,
            count: 20,
        }
    }
}

impl AlertsRequest {
    fn validate(&self) -> Result<(), QueryError> {
        validate_count(self.count)
    }
}

fn validate_count(count: usize) -> Result<(), QueryError> {
    if count == 0 || count > MAX_COUNT {
        return Err(QueryError::InvalidQuery(format!(
            "count must be in 1..={MAX_COUNT}, got {count}"
        )));
    }
    Ok(())
}

/// One row of the 52-week high/low view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighLowItem {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub price: f64,
    pub change_rate: f64,
    pub window_high: f64,
    pub window_low: f64,
    pub position_in_range: f64,
    pub high_breakthrough_rate: f64,
    pub low_breakthrough_rate: f64,
    pub momentum_score: Option<f64>,
    pub is_new_high: bool,
    pub is_new_low: bool,
}

impl HighLowItem {
    fn from_metrics(m: &MetricSet) -> Self {
        Self {
            code: m.code.clone(),
            name: m.name.clone(),
            market: m.market,
            price: m.price,
            change_rate: m.change_rate,
            window_high: m.window_high,
            window_low: m.window_low,
            position_in_range: m.position_in_range,
            high_breakthrough_rate: m.high_breakthrough_rate,
            low_breakthrough_rate: m.low_breakthrough_rate,
            momentum_score: m.momentum,
            is_new_high: m.is_new_high,
            is_new_low: m.is_new_low,
        }
    }
}

/// Near-extreme band when breakthrough_only is off: closes in the top
/// (or bottom) tenth of the window range still make the list.
const NEAR_EXTREME_BAND: f64 = 10.0;

fn high_low_side(universe: &[&MetricSet], req: &HighLowRequest, high: bool) -> Vec<HighLowItem> {
    let mut items: Vec<HighLowItem> = universe
        .iter()
        .filter(|m| {
            if high {
                if req.breakthrough_only {
                    m.is_new_high
                } else {
                    m.position_in_range >= 100.0 - NEAR_EXTREME_BAND
                }
            } else if req.breakthrough_only {
                m.is_new_low
            } else {
                m.position_in_range <= NEAR_EXTREME_BAND
            }
        })
        .map(|&m| HighLowItem::from_metrics(m))
        .collect();
    items.sort_by(|a, b| {
        let ma = a.momentum_score.unwrap_or(0.0);
        let mb = b.momentum_score.unwrap_or(0.0);
        mb.partial_cmp(&ma)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });
    items
}

fn truncate<T>(mut items: Vec<T>, count: usize) -> Vec<T> {
    items.truncate(count);
    items
}

fn market_strength(new_highs: usize, new_lows: usize) -> &'static str {
    if new_lows == 0 {
        return if new_highs > 0 { "VERY_STRONG" } else { "VERY_WEAK" };
    }
    let ratio = new_highs as f64 / new_lows as f64;
    if ratio >= 3.0 {
        "VERY_STRONG"
    } else if ratio >= 2.0 {
        "STRONG"
    } else if ratio >= 1.5 {
        "MODERATE"
    } else if ratio >= 1.0 {
        "WEAK"
    } else {
        "VERY_WEAK"
    }
}

fn market_momentum(limit_ratio: f64, total: usize) -> &'static str {
    if total == 0 {
        return "NEUTRAL";
    }
    if limit_ratio >= 0.8 {
        "VERY_POSITIVE"
    } else if limit_ratio >= 0.6 {
        "POSITIVE"
    } else if limit_ratio >= 0.4 {
        "NEUTRAL"
    } else if limit_ratio >= 0.2 {
        "NEGATIVE"
    } else {
        "VERY_NEGATIVE"
    }
}

/// One row of the limit-stocks view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitItem {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub price: f64,
    pub prev_close: f64,
    pub limit_rate: f64,
    pub volume: u64,
    pub trading_value: f64,
    pub consecutive_limits: u32,
    pub is_strong_limit: bool,
}

fn limit_side(universe: &[&MetricSet], threshold: f64, upper: bool) -> Vec<LimitItem> {
    let mut items: Vec<LimitItem> = universe
        .iter()
        .filter(|m| {
            if upper {
                m.change_rate >= threshold
            } else {
                m.change_rate <= -threshold
            }
        })
        .map(|m| {
            let consecutive =
                if upper { m.consecutive_limit_up } else { m.consecutive_limit_down };
            LimitItem {
                code: m.code.clone(),
                name: m.name.clone(),
                market: m.market,
                price: m.price,
                prev_close: m.prev_close,
                limit_rate: m.change_rate,
                volume: m.volume,
                trading_value: m.trading_value,
                consecutive_limits: consecutive,
                is_strong_limit: consecutive >= 2,
            }
        })
        .collect();
    items.sort_by(|a, b| {
        b.trading_value
            .partial_cmp(&a.trading_value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });
    items
}

/// One row of the streak-stocks view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakItem {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub price: f64,
    pub change_rate: f64,
    pub direction: MoveDirection,
    pub streak_length: u32,
}

impl StreakItem {
    fn from_metrics(m: &MetricSet, direction: MoveDirection, min_length: u32) -> Option<Self> {
        let (dir, length) = match direction {
            MoveDirection::Up => (MoveDirection::Up, m.up_streak),
            MoveDirection::Down => (MoveDirection::Down, m.down_streak),
            MoveDirection::Both => {
                if m.up_streak >= m.down_streak {
                    (MoveDirection::Up, m.up_streak)
                } else {
                    (MoveDirection::Down, m.down_streak)
                }
            }
        };
        (length >= min_length).then(|| Self {
            code: m.code.clone(),
            name: m.name.clone(),
            market: m.market,
            price: m.price,
            change_rate: m.change_rate,
            direction: dir,
            streak_length: length,
        })
    }
}

/// One row of the gap-stocks view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapItem {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub price: f64,
    pub open: f64,
    pub prev_close: f64,
    pub change_rate: f64,
    pub gap_rate: f64,
    pub direction: MoveDirection,
}

impl GapItem {
    fn from_metrics(m: &MetricSet, direction: MoveDirection, min_gap: f64) -> Option<Self> {
        let dir = if m.gap_rate > 0.0 {
            MoveDirection::Up
        } else if m.gap_rate < 0.0 {
            MoveDirection::Down
        } else {
            return None;
        };
        let wanted = matches!(direction, MoveDirection::Both) || dir == direction;
        (wanted && m.gap_rate.abs() >= min_gap).then(|| Self {
            code: m.code.clone(),
            name: m.name.clone(),
            market: m.market,
            price: m.price,
            open: m.open,
            prev_close: m.prev_close,
            change_rate: m.change_rate,
            gap_rate: m.gap_rate,
            direction: dir,
        })
    }
}
