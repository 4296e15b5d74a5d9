//! Alert engine — rule evaluation, cooldown deduplication, priority
//! capping.
//!
//! Rules form a closed enum with an evaluator per kind, so adding a
//! kind is an exhaustively-checked change. Per (instrument, kind) the
//! engine runs a quiet -> triggered -> cooling-down -> quiet machine:
//! the first true evaluation emits, repeats inside the cooldown window
//! are suppressed even while the condition stays true. A per-instrument
//! per-cycle cap keeps only the highest-priority alerts; rules are
//! evaluated in a fixed (priority, kind) order so the cap never depends
//! on insertion order.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use rankscan_core::{Market, MetricSet, Pattern, PatternKind};

use crate::config::AlertSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Alert rule kinds. Variant order is the deterministic tie-break
/// within a priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    LimitUp,
    LimitDown,
    NewHigh,
    NewLow,
    Surge,
    Plunge,
    GapUp,
    GapDown,
    VolumeSpike,
    StreakUp,
    StreakDown,
}

impl RuleKind {
    /// Evaluates the rule against one instrument's cycle outputs.
    /// Returns the triggering value when the condition holds.
    fn evaluate(&self, rule: &AlertRule, m: &MetricSet, patterns: &[Pattern]) -> Option<f64> {
        match self {
            RuleKind::LimitUp => (m.change_rate >= rule.threshold).then_some(m.change_rate),
            RuleKind::LimitDown => (m.change_rate <= -rule.threshold).then_some(m.change_rate),
            RuleKind::NewHigh => m.is_new_high.then_some(m.window_high),
            RuleKind::NewLow => m.is_new_low.then_some(m.window_low),
            RuleKind::Surge => (m.change_rate >= rule.threshold).then_some(m.change_rate),
            RuleKind::Plunge => (m.change_rate <= -rule.threshold).then_some(m.change_rate),
            RuleKind::GapUp => patterns
                .iter()
                .any(|p| p.kind == PatternKind::GapUp)
                .then_some(m.gap_rate),
            RuleKind::GapDown => patterns
                .iter()
                .any(|p| p.kind == PatternKind::GapDown)
                .then_some(m.gap_rate),
            RuleKind::VolumeSpike => {
                let avg = m.avg_volume.filter(|&a| a > 0.0)?;
                let ratio = m.volume as f64 / avg;
                (ratio >= rule.threshold).then_some(ratio)
            }
            RuleKind::StreakUp => {
                (m.up_streak as f64 >= rule.threshold).then_some(m.up_streak as f64)
            }
            RuleKind::StreakDown => {
                (m.down_streak as f64 >= rule.threshold).then_some(m.down_streak as f64)
            }
        }
    }

    fn message(&self, m: &MetricSet, trigger_value: f64) -> String {
        let label = format!("{} ({})", m.name, m.code);
        match self {
            RuleKind::LimitUp => format!("{label} hit the upper price limit at {:+.1}%", trigger_value),
            RuleKind::LimitDown => format!("{label} hit the lower price limit at {:+.1}%", trigger_value),
            RuleKind::NewHigh => format!("{label} broke its 52-week high {:.0}", trigger_value),
            RuleKind::NewLow => format!("{label} broke its 52-week low {:.0}", trigger_value),
            RuleKind::Surge => format!("{label} surged {:+.1}%", trigger_value),
            RuleKind::Plunge => format!("{label} plunged {:+.1}%", trigger_value),
            RuleKind::GapUp => format!("{label} gapped up {:+.1}% at the open", trigger_value),
            RuleKind::GapDown => format!("{label} gapped down {:+.1}% at the open", trigger_value),
            RuleKind::VolumeSpike => format!("{label} volume at {:.1}x its average", trigger_value),
            RuleKind::StreakUp => format!("{label} up {trigger_value:.0} sessions in a row"),
            RuleKind::StreakDown => format!("{label} down {trigger_value:.0} sessions in a row"),
        }
    }
}

/// Static rule configuration: kind, threshold, cooldown, priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub kind: RuleKind,
    pub threshold: f64,
    pub cooldown_secs: u64,
    pub priority: Priority,
}

/// The default rule table derived from the alert settings.
pub fn default_rules(settings: &AlertSettings) -> Vec<AlertRule> {
    let rule = |kind, threshold, priority| AlertRule {
        kind,
        threshold,
        cooldown_secs: settings.cooldown_secs,
        priority,
    };
    vec![
        rule(RuleKind::LimitUp, settings.limit_threshold_pct, Priority::VeryHigh),
        rule(RuleKind::LimitDown, settings.limit_threshold_pct, Priority::VeryHigh),
        rule(RuleKind::NewHigh, 0.0, Priority::High),
        rule(RuleKind::NewLow, 0.0, Priority::High),
        rule(RuleKind::Surge, settings.surge_threshold_pct, Priority::High),
        rule(RuleKind::Plunge, settings.surge_threshold_pct, Priority::High),
        rule(RuleKind::GapUp, 0.0, Priority::Medium),
        rule(RuleKind::GapDown, 0.0, Priority::Medium),
        rule(RuleKind::VolumeSpike, settings.volume_spike_ratio, Priority::Medium),
        rule(RuleKind::StreakUp, settings.streak_threshold as f64, Priority::Low),
        rule(RuleKind::StreakDown, settings.streak_threshold as f64, Priority::Low),
    ]
}

/// An emitted alert. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub kind: RuleKind,
    pub priority: Priority,
    pub code: String,
    pub name: String,
    pub market: Market,
    pub price: f64,
    pub trigger_value: f64,
    pub message: String,
    pub ts: DateTime<Utc>,
}

pub struct AlertEngine {
    /// Sorted by (priority desc, kind) at construction.
    rules: Vec<AlertRule>,
    /// Last trigger time per (instrument, kind); drives the cooldown.
    last_trigger: HashMap<(String, RuleKind), DateTime<Utc>>,
    recent: VecDeque<Alert>,
    recent_capacity: usize,
    max_per_instrument: usize,
    next_id: u64,
}

impl AlertEngine {
    pub fn new(mut rules: Vec<AlertRule>, settings: &AlertSettings) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.kind.cmp(&b.kind)));
        Self {
            rules,
            last_trigger: HashMap::new(),
            recent: VecDeque::new(),
            recent_capacity: settings.recent_buffer.max(1),
            max_per_instrument: settings.max_alerts_per_instrument.max(1),
            next_id: 1,
        }
    }

    pub fn with_defaults(settings: &AlertSettings) -> Self {
        Self::new(default_rules(settings), settings)
    }

    /// Evaluates every rule against every instrument for one cycle.
    ///
    /// Instruments are visited in code order and rules in the fixed
    /// priority order, so the per-instrument cap consistently favors
    /// the configured priorities.
    pub fn evaluate_cycle(
        &mut self,
        metrics: &HashMap<String, MetricSet>,
        patterns: &HashMap<String, Vec<Pattern>>,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut codes: Vec<&String> = metrics.keys().collect();
        codes.sort();

        let mut emitted = Vec::new();
        for code in codes {
            let m = &metrics[code];
            let instrument_patterns = patterns.get(code).map(Vec::as_slice).unwrap_or(&[]);
            let mut count = 0usize;

            for rule in &self.rules {
                if count >= self.max_per_instrument {
                    break;
                }
                let Some(trigger_value) = rule.kind.evaluate(rule, m, instrument_patterns) else {
                    continue;
                };

                let key = (code.clone(), rule.kind);
                let cooldown = Duration::seconds(rule.cooldown_secs as i64);
                if let Some(&last) = self.last_trigger.get(&key) {
                    if now < last + cooldown {
                        continue; // cooling down: suppress the repeat
                    }
                }
                self.last_trigger.insert(key, now);

                let alert = Alert {
                    id: self.next_id,
                    kind: rule.kind,
                    priority: rule.priority,
                    code: m.code.clone(),
                    name: m.name.clone(),
                    market: m.market,
                    price: m.price,
                    trigger_value,
                    message: rule.kind.message(m, trigger_value),
                    ts: now,
                };
                self.next_id += 1;
                count += 1;
                info!(code = %alert.code, kind = ?alert.kind, "alert triggered");

                self.recent.push_back(alert.clone());
                while self.recent.len() > self.recent_capacity {
                    self.recent.pop_front();
                }
                emitted.push(alert);
            }
        }
        emitted
    }

    /// Recent alerts, oldest first, bounded by the configured buffer.
    pub fn recent(&self) -> Vec<Alert> {
        self.recent.iter().cloned().collect()
    }
}
