//! Query cache — short-TTL memoization for ranking and alert queries.
//!
//! Canonicalized query keys map to JSON payloads with explicit expiry.
//! Eviction is least-recently-accessed, bounded by a maximum entry
//! count. Keys whose hit ratio stays high get their TTL doubled on
//! subsequent stores, trading bounded staleness for load reduction on
//! bursty repeated queries.
//!
//! This is the only structure touched by concurrent external readers
//! and the coordinator at the same time, so all state sits behind one
//! internal mutex. The compute closure runs outside the lock; on a
//! race the last writer wins, which is harmless for pure recomputation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::config::CacheSettings;
use crate::error::QueryError;

/// Whether a lookup was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Aggregate counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

struct Entry {
    payload: Value,
    expires: Instant,
    /// Monotonic tick of the last access, for LRU ordering.
    last_access: u64,
    access_count: u64,
}

#[derive(Default, Clone, Copy)]
struct KeyStats {
    hits: u64,
    accesses: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    key_stats: HashMap<String, KeyStats>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub struct QueryCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    hot_ratio: f64,
    hot_min_accesses: u64,
}

impl QueryCache {
    pub fn new(settings: &CacheSettings) -> Self {
        assert!(settings.max_entries >= 1, "cache must hold at least one entry");
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: settings.max_entries,
            hot_ratio: settings.hot_key_ratio,
            hot_min_accesses: settings.hot_key_min_accesses,
        }
    }

    /// Returns the cached payload if unexpired; otherwise invokes
    /// `compute`, stores the result with `now + ttl` (doubled for hot
    /// keys), and returns it.
    pub fn get_or_compute<F>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<(Value, CacheStatus), QueryError>
    where
        F: FnOnce() -> Result<Value, QueryError>,
    {
        let now = Instant::now();
        let hot = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            inner.tick += 1;
            let tick = inner.tick;

            let stats = inner.key_stats.entry(key.to_string()).or_default();
            stats.accesses += 1;

            let valid = inner
                .entries
                .get(key)
                .map(|e| e.expires > now)
                .unwrap_or(false);
            if valid {
                let stats = inner.key_stats.get_mut(key).expect("stats just inserted");
                stats.hits += 1;
                inner.hits += 1;
                let entry = inner.entries.get_mut(key).expect("entry just checked");
                entry.last_access = tick;
                entry.access_count += 1;
                return Ok((entry.payload.clone(), CacheStatus::Hit));
            }

            inner.entries.remove(key); // drop an expired entry eagerly
            inner.misses += 1;
            let stats = *inner.key_stats.get(key).expect("stats just inserted");
            stats.accesses >= self.hot_min_accesses
                && stats.hits as f64 / stats.accesses as f64 > self.hot_ratio
        };

        let payload = compute()?;

        let effective_ttl = if hot { ttl * 2 } else { ttl };
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_entries {
            self.evict_lru(&mut inner);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                payload: payload.clone(),
                expires: now + effective_ttl,
                last_access: tick,
                access_count: 1,
            },
        );
        // Key-stat bookkeeping is bounded too: reset once it balloons
        // past several generations of the entry map.
        if inner.key_stats.len() > self.max_entries * 8 {
            inner.key_stats.clear();
        }
        Ok((payload, CacheStatus::Miss))
    }

    /// Removes every entry whose key contains `fragment`; returns the
    /// number removed. Used on cycle commit to drop results computed
    /// from stale history.
    pub fn invalidate_containing(&self, fragment: &str) -> usize {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !k.contains(fragment));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(fragment, removed, "invalidated cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            entries: inner.entries.len(),
        }
    }

    fn evict_lru(&self, inner: &mut Inner) {
        // Linear scan over a small bounded map.
        if let Some(victim) = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())
        {
            inner.entries.remove(&victim);
            inner.evictions += 1;
            debug!(key = %victim, "evicted least-recently-accessed entry");
        }
    }
}
