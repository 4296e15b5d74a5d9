//! Scanner configuration — loaded once at startup, immutable for the
//! process lifetime.
//!
//! A TOML file supplies overrides section by section; every field has
//! a production default so an empty file (or no file) is valid. A few
//! deployment knobs can also come from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use rankscan_core::{IndicatorParams, PatternParams};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub cycle: CycleSettings,
    pub indicators: IndicatorParams,
    pub patterns: PatternParams,
    pub alerts: AlertSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
}

/// Polling cadence and history retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// Seconds between cycles.
    pub cadence_secs: u64,
    /// Bars retained per instrument (260 ~ one year of daily bars).
    pub history_capacity: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self { cadence_secs: 30, history_capacity: 260 }
    }
}

/// Alert rule thresholds and volume caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Change-rate magnitude (percent) for surge/plunge rules.
    pub surge_threshold_pct: f64,
    /// Change-rate magnitude treated as the daily price limit (KRX
    /// band is +-30%).
    pub limit_threshold_pct: f64,
    /// Volume versus window average for the spike rule.
    pub volume_spike_ratio: f64,
    /// Streak length for the streak rules.
    pub streak_threshold: u32,
    /// Re-trigger suppression window per (instrument, rule).
    pub cooldown_secs: u64,
    /// Max alerts emitted per instrument per cycle, highest priority
    /// first.
    pub max_alerts_per_instrument: usize,
    /// Retained recent alerts for dedup and follow-up queries.
    pub recent_buffer: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            surge_threshold_pct: 5.0,
            limit_threshold_pct: 29.5,
            volume_spike_ratio: 3.0,
            streak_threshold: 5,
            cooldown_secs: 300,
            max_alerts_per_instrument: 3,
            recent_buffer: 500,
        }
    }
}

/// Query-cache sizing, TTLs per operation family, hot-key promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub ranking_ttl_secs: u64,
    pub high_low_ttl_secs: u64,
    pub limit_ttl_secs: u64,
    pub summary_ttl_secs: u64,
    pub alerts_ttl_secs: u64,
    /// Hit ratio beyond which a key is considered hot.
    pub hot_key_ratio: f64,
    /// Accesses required before the ratio is meaningful.
    pub hot_key_min_accesses: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            ranking_ttl_secs: 60,
            high_low_ttl_secs: 300,
            limit_ttl_secs: 30,
            summary_ttl_secs: 120,
            alerts_ttl_secs: 30,
            hot_key_ratio: 0.8,
            hot_key_min_accesses: 5,
        }
    }
}

/// Snapshot fetch retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff_ms: 200 }
    }
}

impl ScanConfig {
    /// Loads configuration from a TOML file, then applies environment
    /// overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: ScanConfig = toml::from_str(&text)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides; used when no config file is
    /// given.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ScanConfig::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(secs) = env_u64("RANKSCAN_CADENCE_SECS") {
            self.cycle.cadence_secs = secs;
        }
        if let Some(entries) = env_u64("RANKSCAN_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = entries as usize;
        }
        if let Some(secs) = env_u64("RANKSCAN_ALERT_COOLDOWN_SECS") {
            self.alerts.cooldown_secs = secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle.cadence_secs == 0 {
            return Err(ConfigError::Invalid("cycle.cadence_secs must be > 0".into()));
        }
        if self.cycle.history_capacity == 0 {
            return Err(ConfigError::Invalid("cycle.history_capacity must be > 0".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.cache.hot_key_ratio) {
            return Err(ConfigError::Invalid("cache.hot_key_ratio must be in [0, 1]".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0".into()));
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cycle.cadence_secs, 30);
        assert_eq!(config.cache.ranking_ttl_secs, 60);
        assert_eq!(config.alerts.limit_threshold_pct, 29.5);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: ScanConfig = toml::from_str("").unwrap();
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn partial_toml_overrides_one_section() {
        let config: ScanConfig = toml::from_str(
            r#"
            [cycle]
            cadence_secs = 10

            [alerts]
            surge_threshold_pct = 7.5
            "#,
        )
        .unwrap();
        assert_eq!(config.cycle.cadence_secs, 10);
        assert_eq!(config.alerts.surge_threshold_pct, 7.5);
        // untouched sections keep their defaults
        assert_eq!(config.cache, CacheSettings::default());
        assert_eq!(config.cycle.history_capacity, 260);
    }

    #[test]
    fn zero_cadence_is_rejected() {
        let mut config = ScanConfig::default();
        config.cycle.cadence_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn hot_key_ratio_bounds_are_enforced() {
        let mut config = ScanConfig::default();
        config.cache.hot_key_ratio = 1.5;
        assert!(config.validate().is_err());
    }
}
