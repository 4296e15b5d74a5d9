//! The published result set of one completed cycle.
//!
//! A cycle's outputs are committed as one immutable `Arc` swapped in
//! under a short write lock. Query paths clone the `Arc` and read
//! without ever blocking an in-progress cycle: they see either the old
//! or the new complete cycle, never a partial one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rankscan_core::{MetricSet, Pattern};

use crate::alert::Alert;

/// Immutable per-cycle result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleSnapshot {
    /// Monotonic cycle sequence; 0 means nothing published yet.
    pub seq: u64,
    pub ts: Option<DateTime<Utc>>,
    pub metrics: HashMap<String, MetricSet>,
    pub patterns: HashMap<String, Vec<Pattern>>,
    /// Alerts emitted by this cycle.
    pub alerts: Vec<Alert>,
    /// The bounded recent-alert window as of this cycle, oldest first.
    pub recent_alerts: Vec<Alert>,
}

impl CycleSnapshot {
    pub fn metric_sets(&self) -> Vec<MetricSet> {
        self.metrics.values().cloned().collect()
    }

    pub fn is_published(&self) -> bool {
        self.seq > 0
    }
}

/// Shared handle between the coordinator (writer) and query readers.
#[derive(Clone, Default)]
pub struct SharedCycle {
    inner: Arc<RwLock<Arc<CycleSnapshot>>>,
}

impl SharedCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically swaps in a completed cycle.
    pub fn publish(&self, snapshot: CycleSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.inner.write().expect("cycle lock poisoned") = snapshot;
    }

    /// The latest complete cycle. Cheap: clones an `Arc` under a read
    /// lock held only for the clone.
    pub fn load(&self) -> Arc<CycleSnapshot> {
        self.inner.read().expect("cycle lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handle_is_unpublished() {
        let shared = SharedCycle::new();
        let snap = shared.load();
        assert!(!snap.is_published());
        assert!(snap.metrics.is_empty());
    }

    #[test]
    fn readers_keep_the_old_snapshot_across_a_publish() {
        let shared = SharedCycle::new();
        shared.publish(CycleSnapshot { seq: 1, ..Default::default() });

        let before = shared.load();
        shared.publish(CycleSnapshot { seq: 2, ..Default::default() });
        let after = shared.load();

        // the reader's Arc is unaffected by the swap
        assert_eq!(before.seq, 1);
        assert_eq!(after.seq, 2);
    }
}
