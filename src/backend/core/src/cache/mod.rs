//! Keyed TTL cache with insertion-order eviction.
//!
//! # Semantics
//!
//! - Every entry carries its own TTL. Expiry is lazy: a `get` that finds an
//!   entry at or past its TTL removes it and reports a miss. There is no
//!   background sweep.
//! - The store never holds more than `max_size` entries. Inserting a new key
//!   at capacity first evicts the earliest-inserted entry (not LRU; reads do
//!   not reorder). Overwriting an existing key evicts nothing and moves that
//!   key to the back of the insertion order.
//! - Every `get` reports a hit or a miss to the attached
//!   [`PerformanceMonitor`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use vigil_core::cache::CacheStore;
//!
//! let cache = CacheStore::new(100).with_monitor(monitor.clone());
//! cache.set("dashboard:snapshot", snapshot, Duration::from_secs(60));
//! let hit = cache.get("dashboard:snapshot");
//! cache.clear(Some("dashboard:"));
//! ```

use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::monitor::PerformanceMonitor;

/// Default maximum number of entries.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// A stored value with its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub ttl: Duration,
    seq: u64,
}

impl<V> CacheEntry<V> {
    /// Check if the entry has expired as of `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }

    /// Remaining lifetime as of `now`.
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.inserted_at))
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for a new key
    pub evictions: u64,
    /// Entries removed because a lookup found them expired
    pub expirations: u64,
    pub entries: usize,
    pub max_size: usize,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion sequence number -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }
}

enum Lookup<V> {
    Hit(V),
    Expired,
    Missing,
}

/// Bounded key/value store with per-entry TTL.
pub struct CacheStore<V> {
    max_size: usize,
    state: Mutex<CacheState<V>>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl<V: Clone> CacheStore<V> {
    /// Create a store holding at most `max_size` entries (minimum 1).
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            state: Mutex::new(CacheState::new()),
            monitor: None,
        }
    }

    /// Report every lookup to `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads and writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Store `value` under `key` for `ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut state = self.state.lock();

        let evicted = if state.remove(&key).is_none() && state.entries.len() >= self.max_size {
            state.evict_oldest()
        } else {
            None
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, key.clone());
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
                seq,
            },
        );
        let len = state.entries.len();
        drop(state);

        if let Some(evicted) = evicted {
            counter!("vigil_cache_evictions_total").increment(1);
            debug!(evicted_key = %evicted, key = %key, "Evicted earliest-inserted cache entry");
        }
        gauge!("vigil_cache_entries").set(len as f64);
    }

    /// Live value under `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let lookup = {
            let mut state = self.state.lock();
            let lookup = match state.entries.get(key) {
                Some(entry) if entry.is_expired_at(now) => Lookup::Expired,
                Some(entry) => Lookup::Hit(entry.value.clone()),
                None => Lookup::Missing,
            };
            match lookup {
                Lookup::Hit(_) => state.hits += 1,
                Lookup::Expired => {
                    state.remove(key);
                    state.expirations += 1;
                    state.misses += 1;
                }
                Lookup::Missing => state.misses += 1,
            }
            lookup
        };

        match lookup {
            Lookup::Hit(value) => {
                self.report_hit();
                Some(value)
            }
            Lookup::Expired => {
                counter!("vigil_cache_expirations_total").increment(1);
                debug!(key = %key, "Cache entry expired");
                self.report_miss();
                None
            }
            Lookup::Missing => {
                self.report_miss();
                None
            }
        }
    }

    /// Whether a live entry exists. Not reported as a hit or miss.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .get(key)
            .map_or(false, |e| !e.is_expired_at(now))
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.state.lock().remove(key).map(|e| e.value)
    }

    /// Remove every entry, or only those whose key starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self, prefix: Option<&str>) -> usize {
        let mut state = self.state.lock();
        let removed = match prefix {
            None => {
                let n = state.entries.len();
                state.entries.clear();
                state.order.clear();
                n
            }
            Some(prefix) => {
                let keys: Vec<String> = state
                    .entries
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect();
                for key in &keys {
                    state.remove(key);
                }
                keys.len()
            }
        };
        let len = state.entries.len();
        drop(state);

        gauge!("vigil_cache_entries").set(len as f64);
        debug!(prefix = ?prefix, removed, "Cache cleared");
        removed
    }

    /// Entries currently stored, expired ones included until looked up.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            entries: state.entries.len(),
            max_size: self.max_size,
            hit_rate: if total > 0 {
                state.hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn report_hit(&self) {
        counter!("vigil_cache_hits_total").increment(1);
        if let Some(monitor) = &self.monitor {
            monitor.record_cache_hit();
        }
    }

    fn report_miss(&self) {
        counter!("vigil_cache_misses_total").increment(1);
        if let Some(monitor) = &self.monitor {
            monitor.record_cache_miss();
        }
    }
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl<V> std::fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("max_size", &self.max_size)
            .field("entries", &self.state.lock().entries.len())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON helpers
// ═══════════════════════════════════════════════════════════════════════════════

impl CacheStore<serde_json::Value> {
    /// Serialize `value` and store it.
    pub fn set_json<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl);
        Ok(())
    }

    /// Look up `key` and deserialize it as `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}
