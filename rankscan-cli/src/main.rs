//! RankScan CLI — scan loop and one-shot query commands.
//!
//! Commands:
//! - `scan` — run the polling pipeline continuously, printing alerts
//! - `rank` — price-change ranking (gainers/losers/most volatile)
//! - `high-low` — 52-week high/low breakthrough view
//! - `limits` — instruments at the daily price limit
//! - `streaks` — consecutive-move stocks
//! - `gaps` — gap-open stocks
//! - `volatility` — volatility ranking
//! - `alerts` — recent price alerts
//!
//! All commands run against a deterministic built-in demo source
//! (seeded synthetic quotes) so the pipeline works end to end without
//! brokerage credentials; a deployment wires a real
//! `MarketSnapshotSource` instead.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use rankscan_core::{Instrument, Market, MarketFilter, Quote};
use rankscan_service::ops::{
    AlertsRequest, GapRequest, HighLowKind, HighLowRequest, LimitKind, LimitRequest,
    MoveDirection, PriceRankingRequest, RankingKind, StreakRequest, VolatilityBasis,
    VolatilityRequest,
};
use rankscan_service::{
    CycleCoordinator, MarketSnapshotSource, QueryCache, QueryService, ScanConfig, SharedCycle,
    SourceError,
};

#[derive(Parser)]
#[command(name = "rankscan", about = "RankScan CLI — market ranking and alert scanner")]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for the built-in demo snapshot source.
    #[arg(long, global = true, default_value_t = 7)]
    seed: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling pipeline continuously, printing alerts as they
    /// fire.
    Scan {
        /// Number of cycles to run; 0 means until interrupted.
        #[arg(long, default_value_t = 0)]
        cycles: u64,
    },
    /// Price-change ranking.
    Rank {
        /// gainers, losers, or volatile.
        #[arg(long, default_value = "gainers")]
        ranking_type: String,

        #[command(flatten)]
        query: QueryArgs,

        /// Minimum price filter (inclusive).
        #[arg(long)]
        min_price: Option<f64>,

        /// Minimum volume filter (inclusive).
        #[arg(long)]
        min_volume: Option<u64>,
    },
    /// 52-week high/low breakthrough view.
    HighLow {
        /// high, low, or both.
        #[arg(long, default_value = "both")]
        kind: String,

        /// Include near-extreme stocks, not only today's breakthroughs.
        #[arg(long, default_value_t = false)]
        include_near: bool,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Instruments at the daily price limit.
    Limits {
        /// upper, lower, or both.
        #[arg(long, default_value = "both")]
        limit_type: String,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Consecutive-move stocks.
    Streaks {
        /// up, down, or both.
        #[arg(long, default_value = "both")]
        direction: String,

        /// Minimum streak length. Defaults to the configured threshold.
        #[arg(long)]
        min_length: Option<u32>,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Gap-open stocks.
    Gaps {
        /// up, down, or both.
        #[arg(long, default_value = "both")]
        direction: String,

        /// Minimum gap rate in percent. Defaults to the configured
        /// threshold.
        #[arg(long)]
        min_gap_rate: Option<f64>,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Volatility ranking.
    Volatility {
        /// intraday or annualized.
        #[arg(long, default_value = "intraday")]
        basis: String,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Recent price alerts.
    Alerts {
        /// low, medium, high, or very-high.
        #[arg(long)]
        min_priority: Option<String>,

        #[command(flatten)]
        query: QueryArgs,
    },
}

/// Filters shared by the one-shot query commands.
#[derive(Args)]
struct QueryArgs {
    /// ALL, KOSPI, or KOSDAQ.
    #[arg(long, default_value = "all")]
    market: String,

    /// Result count.
    #[arg(long, default_value_t = 20)]
    count: usize,

    /// Warmup cycles before answering, so window metrics have history.
    #[arg(long, default_value_t = 30)]
    warmup: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::from_env()?,
    };

    match cli.command {
        Commands::Scan { cycles } => run_scan(config, cli.seed, cycles),
        Commands::Rank { ranking_type, query, min_price, min_volume } => {
            let req = PriceRankingRequest {
                ranking_type: parse_ranking_type(&ranking_type)?,
                market: parse_market(&query.market)?,
                count: query.count,
                min_price,
                min_volume,
            };
            run_query(config, cli.seed, &query, |s| s.price_change_ranking(&req))
        }
        Commands::HighLow { kind, include_near, query } => {
            let req = HighLowRequest {
                kind: parse_high_low_kind(&kind)?,
                market: parse_market(&query.market)?,
                count: query.count,
                breakthrough_only: !include_near,
            };
            run_query(config, cli.seed, &query, |s| s.week52_high_low(&req))
        }
        Commands::Limits { limit_type, query } => {
            let req = LimitRequest {
                limit_type: parse_limit_kind(&limit_type)?,
                market: parse_market(&query.market)?,
            };
            run_query(config, cli.seed, &query, |s| s.limit_stocks(&req))
        }
        Commands::Streaks { direction, min_length, query } => {
            let req = StreakRequest {
                direction: parse_direction(&direction)?,
                market: parse_market(&query.market)?,
                min_length,
                count: query.count,
            };
            run_query(config, cli.seed, &query, |s| s.streak_stocks(&req))
        }
        Commands::Gaps { direction, min_gap_rate, query } => {
            let req = GapRequest {
                direction: parse_direction(&direction)?,
                market: parse_market(&query.market)?,
                min_gap_rate,
                count: query.count,
            };
            run_query(config, cli.seed, &query, |s| s.gap_stocks(&req))
        }
        Commands::Volatility { basis, query } => {
            let req = VolatilityRequest {
                basis: parse_basis(&basis)?,
                market: parse_market(&query.market)?,
                count: query.count,
                min_price: None,
                min_volume: None,
            };
            run_query(config, cli.seed, &query, |s| s.volatility_ranking(&req))
        }
        Commands::Alerts { min_priority, query } => {
            let req = AlertsRequest {
                market: parse_market(&query.market)?,
                min_priority: min_priority.as_deref().map(parse_priority).transpose()?,
                kind: None,
                count: query.count,
            };
            run_query(config, cli.seed, &query, |s| s.price_alerts(&req))
        }
    }
}

fn build_pipeline(
    config: ScanConfig,
    seed: u64,
) -> (CycleCoordinator, QueryService) {
    let universe = demo_universe();
    let source = Arc::new(DemoSource::new(seed, &universe, config.cycle.cadence_secs));
    let shared = SharedCycle::new();
    let cache = Arc::new(QueryCache::new(&config.cache));
    let coordinator = CycleCoordinator::new(
        config.clone(),
        universe,
        source,
        shared.clone(),
        cache.clone(),
    );
    let service = QueryService::new(shared, cache, config);
    (coordinator, service)
}

fn run_scan(config: ScanConfig, seed: u64, cycles: u64) -> Result<()> {
    let cadence = std::time::Duration::from_secs(config.cycle.cadence_secs);
    let (mut coordinator, _service) = build_pipeline(config, seed);
    let shared = coordinator.shared();

    println!("scanning every {}s, ctrl-c to stop", cadence.as_secs());
    let mut completed = 0u64;
    loop {
        match coordinator.run_cycle() {
            Ok(report) => {
                let snap = shared.load();
                for alert in &snap.alerts {
                    println!(
                        "[{}] {:9} {:10} {}",
                        alert.ts.format("%H:%M:%S"),
                        format!("{:?}", alert.priority),
                        format!("{:?}", alert.kind),
                        alert.message
                    );
                }
                if report.alerts == 0 {
                    println!(
                        "cycle {}: {} instruments, no alerts",
                        report.seq, report.instruments
                    );
                }
            }
            Err(err) => eprintln!("cycle skipped: {err}"),
        }

        completed += 1;
        if cycles > 0 && completed >= cycles {
            return Ok(());
        }
        std::thread::sleep(cadence);
    }
}

fn run_query<F>(config: ScanConfig, seed: u64, query: &QueryArgs, op: F) -> Result<()>
where
    F: FnOnce(&QueryService) -> Result<Value, rankscan_service::QueryError>,
{
    let (mut coordinator, service) = build_pipeline(config, seed);
    for _ in 0..query.warmup.max(1) {
        coordinator.run_cycle()?;
    }
    let response = op(&service)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_market(s: &str) -> Result<MarketFilter> {
    match s.to_ascii_uppercase().as_str() {
        "ALL" => Ok(MarketFilter::All),
        "KOSPI" => Ok(MarketFilter::Kospi),
        "KOSDAQ" => Ok(MarketFilter::Kosdaq),
        _ => bail!("unknown market '{s}'. Valid: all, kospi, kosdaq"),
    }
}

fn parse_ranking_type(s: &str) -> Result<RankingKind> {
    match s.to_ascii_lowercase().as_str() {
        "gainers" => Ok(RankingKind::TopGainers),
        "losers" => Ok(RankingKind::TopLosers),
        "volatile" => Ok(RankingKind::MostVolatile),
        _ => bail!("unknown ranking type '{s}'. Valid: gainers, losers, volatile"),
    }
}

fn parse_high_low_kind(s: &str) -> Result<HighLowKind> {
    match s.to_ascii_lowercase().as_str() {
        "high" => Ok(HighLowKind::High),
        "low" => Ok(HighLowKind::Low),
        "both" => Ok(HighLowKind::Both),
        _ => bail!("unknown kind '{s}'. Valid: high, low, both"),
    }
}

fn parse_limit_kind(s: &str) -> Result<LimitKind> {
    match s.to_ascii_lowercase().as_str() {
        "upper" => Ok(LimitKind::Upper),
        "lower" => Ok(LimitKind::Lower),
        "both" => Ok(LimitKind::Both),
        _ => bail!("unknown limit type '{s}'. Valid: upper, lower, both"),
    }
}

fn parse_direction(s: &str) -> Result<MoveDirection> {
    match s.to_ascii_lowercase().as_str() {
        "up" => Ok(MoveDirection::Up),
        "down" => Ok(MoveDirection::Down),
        "both" => Ok(MoveDirection::Both),
        _ => bail!("unknown direction '{s}'. Valid: up, down, both"),
    }
}

fn parse_basis(s: &str) -> Result<VolatilityBasis> {
    match s.to_ascii_lowercase().as_str() {
        "intraday" => Ok(VolatilityBasis::Intraday),
        "annualized" => Ok(VolatilityBasis::Annualized),
        _ => bail!("unknown basis '{s}'. Valid: intraday, annualized"),
    }
}

fn parse_priority(s: &str) -> Result<rankscan_service::Priority> {
    use rankscan_service::Priority;
    match s.to_ascii_lowercase().as_str() {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "very-high" => Ok(Priority::VeryHigh),
        _ => bail!("unknown priority '{s}'. Valid: low, medium, high, very-high"),
    }
}

/// Built-in demo universe: a handful of familiar KOSPI/KOSDAQ names.
fn demo_universe() -> Vec<Instrument> {
    vec![
        Instrument::new("005930", "Samsung Electronics", Market::Kospi),
        Instrument::new("000660", "SK Hynix", Market::Kospi),
        Instrument::new("373220", "LG Energy Solution", Market::Kospi),
        Instrument::new("005380", "Hyundai Motor", Market::Kospi),
        Instrument::new("035420", "NAVER", Market::Kospi),
        Instrument::new("051910", "LG Chem", Market::Kospi),
        Instrument::new("005490", "POSCO Holdings", Market::Kospi),
        Instrument::new("105560", "KB Financial", Market::Kospi),
        Instrument::new("035720", "Kakao", Market::Kosdaq),
        Instrument::new("247540", "Ecopro BM", Market::Kosdaq),
        Instrument::new("028300", "HLB", Market::Kosdaq),
        Instrument::new("196170", "Alteogen", Market::Kosdaq),
    ]
}

struct DemoInstrument {
    instrument: Instrument,
    price: f64,
    prev_close: f64,
    open: f64,
    high: f64,
    low: f64,
    volume: u64,
    /// Per-cycle drift in percent; a couple of names trend hard so
    /// alerts and streaks actually fire in a demo session.
    drift_pct: f64,
}

/// Deterministic random-walk snapshot source.
///
/// Quotes evolve per fetch from a seeded RNG: same seed, same session.
/// The simulated clock advances one cadence per fetch regardless of
/// wall time, so warmup cycles can run back to back.
struct DemoSource {
    state: Mutex<DemoState>,
    cadence_secs: u64,
}

struct DemoState {
    rng: StdRng,
    instruments: Vec<DemoInstrument>,
    ts: DateTime<Utc>,
}

impl DemoSource {
    fn new(seed: u64, universe: &[Instrument], cadence_secs: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let instruments = universe
            .iter()
            .enumerate()
            .map(|(i, instrument)| {
                let base = rng.gen_range(5_000.0..200_000.0_f64).round();
                // index 0 trends up, index 1 down, the rest wander
                let drift_pct = match i {
                    0 => 0.25,
                    1 => -0.2,
                    _ => rng.gen_range(-0.05..0.05),
                };
                // one gapper so the gap view has something to show
                let open = if i == 2 { base * 1.04 } else { base };
                DemoInstrument {
                    instrument: instrument.clone(),
                    price: open,
                    prev_close: base,
                    open,
                    high: open,
                    low: open,
                    volume: 0,
                    drift_pct,
                }
            })
            .collect();
        Self {
            state: Mutex::new(DemoState { rng, instruments, ts: Utc::now() }),
            cadence_secs,
        }
    }
}

impl MarketSnapshotSource for DemoSource {
    fn fetch(&self, _codes: &[String]) -> Result<Vec<Quote>, SourceError> {
        let mut state = self.state.lock().expect("demo source lock poisoned");
        state.ts = state.ts + ChronoDuration::seconds(self.cadence_secs as i64);
        let ts = state.ts;
        let DemoState { rng, instruments, .. } = &mut *state;

        let quotes = instruments
            .iter_mut()
            .map(|demo| {
                let step_pct = demo.drift_pct + rng.gen_range(-0.3..0.3);
                demo.price = (demo.price * (1.0 + step_pct / 100.0)).max(1.0);
                demo.high = demo.high.max(demo.price);
                demo.low = demo.low.min(demo.price);
                demo.volume += rng.gen_range(10_000..200_000);

                Quote {
                    code: demo.instrument.code.clone(),
                    name: demo.instrument.name.clone(),
                    market: demo.instrument.market,
                    price: demo.price,
                    open: demo.open,
                    high: demo.high,
                    low: demo.low,
                    prev_close: demo.prev_close,
                    volume: demo.volume,
                    ts,
                }
            })
            .collect();
        Ok(quotes)
    }
}
