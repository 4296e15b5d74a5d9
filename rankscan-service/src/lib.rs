//! RankScan Service — orchestration around the core engine.
//!
//! This crate owns everything that coordinates or serves the pure core:
//! - The cycle coordinator (snapshot ingest, parallel metric/pattern
//!   fan-out, atomic publish)
//! - The ranking engine and its query surface
//! - The alert engine (rule evaluation, cooldown dedup, priority caps)
//! - The short-TTL query cache with hot-key promotion
//! - The snapshot-source boundary with retry policy
//! - Configuration and the service error taxonomy

pub mod alert;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ops;
pub mod ranking;
pub mod snapshot;
pub mod source;

pub use alert::{Alert, AlertEngine, AlertRule, Priority, RuleKind};
pub use cache::{CacheStats, CacheStatus, QueryCache};
pub use config::ScanConfig;
pub use coordinator::{CycleCoordinator, CycleReport};
pub use error::{ConfigError, CycleError, QueryError, SourceError};
pub use ops::QueryService;
pub use ranking::{RankMetric, RankingQuery, RankingResult, SortOrder};
pub use snapshot::{CycleSnapshot, SharedCycle};
pub use source::{MarketSnapshotSource, StaticSource};
