//! Memory Cache Level
//!
//! Capacity-bounded concurrent table where every value has a cost.
//!
//! # Design
//!
//! - `DashMap` for sharded, mostly lock-free reads
//! - Cost per entry from a caller-supplied function (one unit by default)
//! - Least recently accessed entries are evicted until the total cost fits
//!   the capacity again; evictions are serialized by a single lock
//! - Memory warnings drop everything

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::CacheLevel;
use crate::config::MemoryCacheConfig;
use crate::error::Error;
use crate::future::{AsyncResult, Value};

struct MemoryEntry<V> {
    value: V,
    cost: u64,
    last_access: AtomicU64,
}

type CostFn<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

struct Inner<K, V> {
    entries: DashMap<K, MemoryEntry<V>>,
    config: MemoryCacheConfig,
    cost: CostFn<V>,
    total_cost: AtomicU64,
    clock: AtomicU64,
    eviction: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// In-memory cache level
///
/// Cheap to clone; clones share the same table.
pub struct MemoryCacheLevel<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for MemoryCacheLevel<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> MemoryCacheLevel<K, V>
where
    K: Value + Eq + Hash,
    V: Value,
{
    /// Create a level with the default capacity, one cost unit per entry
    pub fn new() -> Self {
        Self::with_config(MemoryCacheConfig::default())
    }

    /// Create a level with a custom capacity, one cost unit per entry
    pub fn with_config(config: MemoryCacheConfig) -> Self {
        Self::with_cost(config, |_| 1)
    }

    /// Create a level whose entries cost `cost(value)` units
    pub fn with_cost(config: MemoryCacheConfig, cost: impl Fn(&V) -> u64 + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                config,
                cost: Arc::new(cost),
                total_cost: AtomicU64::new(0),
                clock: AtomicU64::new(0),
                eviction: Mutex::new(()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    fn tick(&self) -> u64 {
        self.inner.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let entry = self.inner.entries.get(key)?;
        entry.last_access.store(self.tick(), Ordering::Relaxed);
        Some(entry.value.clone())
    }

    fn store(&self, key: K, value: V) {
        let cost = (self.inner.cost)(&value);
        if cost > self.inner.config.capacity {
            debug!(cost, capacity = self.inner.config.capacity, "Value exceeds memory capacity, not cached");
            self.remove_entry(&key);
            return;
        }

        let entry = MemoryEntry {
            value,
            cost,
            last_access: AtomicU64::new(self.tick()),
        };
        // The cost is counted while the shard is still locked, so no remover
        // can take the entry out before its cost is in the total.
        match self.inner.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let old = occupied.insert(entry);
                self.inner.total_cost.fetch_add(cost, Ordering::Relaxed);
                self.release_cost(old.cost);
            }
            Entry::Vacant(vacant) => {
                self.inner.total_cost.fetch_add(cost, Ordering::Relaxed);
                vacant.insert(entry);
            }
        }

        self.evict();
    }

    fn remove_entry(&self, key: &K) {
        if let Some((_, old)) = self.inner.entries.remove(key) {
            self.release_cost(old.cost);
        }
    }

    fn release_cost(&self, cost: u64) {
        let _ = self
            .inner
            .total_cost
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| Some(total.saturating_sub(cost)));
    }

    /// Evict least recently accessed entries until the total cost fits
    fn evict(&self) {
        if self.size() <= self.capacity() {
            return;
        }

        let _guard = self.inner.eviction.lock();
        let mut candidates: Vec<(K, u64)> = self
            .inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.last_access.load(Ordering::Relaxed)))
            .collect();
        candidates.sort_by_key(|(_, last_access)| *last_access);

        let mut evicted = 0u64;
        for (key, _) in candidates {
            if self.size() <= self.capacity() {
                break;
            }
            if let Some((_, old)) = self.inner.entries.remove(&key) {
                self.release_cost(old.cost);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.inner.evictions.fetch_add(evicted, Ordering::Relaxed);
            debug!(evicted, size = self.size(), "Evicted memory cache entries");
        }
    }

    /// Whether `key` is currently cached
    pub fn contains(&self, key: &K) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Total cost of cached entries
    pub fn size(&self) -> u64 {
        self.inner.total_cost.load(Ordering::Relaxed)
    }

    /// Configured capacity
    pub fn capacity(&self) -> u64 {
        self.inner.config.capacity
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.inner.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.inner.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.inner.evictions.load(Ordering::Relaxed)
    }

    /// Hit ratio (0.0 - 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            size: self.size(),
            capacity: self.capacity(),
            entries: self.len(),
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            evictions: self.evictions(),
        }
    }
}

impl<K, V> Default for MemoryCacheLevel<K, V>
where
    K: Value + Eq + Hash,
    V: Value,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheLevel for MemoryCacheLevel<K, V>
where
    K: Value + Eq + Hash,
    V: Value,
{
    type Key = K;
    type Output = V;

    fn get(&self, key: &K) -> AsyncResult<V> {
        match self.lookup(key) {
            Some(value) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                trace!("Memory cache hit");
                AsyncResult::succeeded(value)
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                trace!("Memory cache miss");
                AsyncResult::failed(Error::ValueNotInCache)
            }
        }
    }

    fn set(&self, value: V, key: &K) -> AsyncResult<()> {
        self.store(key.clone(), value);
        AsyncResult::succeeded(())
    }

    fn clear(&self) {
        self.inner.entries.retain(|_, entry| {
            self.release_cost(entry.cost);
            false
        });
    }

    fn on_memory_warning(&self) {
        debug!(entries = self.len(), "Memory warning, dropping memory cache");
        self.clear();
    }
}

/// Memory level statistics
#[derive(Debug, Clone)]
pub struct MemoryStats {
    /// Total cost of cached entries
    pub size: u64,
    /// Capacity in cost units
    pub capacity: u64,
    /// Number of entries
    pub entries: usize,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Eviction count
    pub evictions: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Outcome;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicBool;

    fn level(capacity: u64) -> MemoryCacheLevel<String, String> {
        MemoryCacheLevel::with_cost(MemoryCacheConfig { capacity }, |v: &String| v.len() as u64)
    }

    #[test]
    fn test_memory_level_creation() {
        let cache = MemoryCacheLevel::<String, u32>::new();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.capacity(), crate::config::DEFAULT_MEMORY_CAPACITY);
    }

    #[test]
    fn test_set_then_get() {
        let cache = level(1024);

        assert_matches!(cache.set("Hello, World!".into(), &"greeting".into()).peek(), Some(Outcome::Success(())));
        assert_matches!(cache.get(&"greeting".into()).peek(), Some(Outcome::Success(v)) if v == "Hello, World!");
        assert_eq!(cache.size(), 13);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_is_value_not_in_cache() {
        let cache = level(1024);

        assert_matches!(cache.get(&"nope".into()).peek(), Some(Outcome::Failure(Error::ValueNotInCache)));
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_overwrite_updates_cost() {
        let cache = level(1024);

        cache.set("original".into(), &"k".into());
        assert_eq!(cache.size(), 8);
        cache.set("replaced content".into(), &"k".into());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), 16);
    }

    #[test]
    fn test_eviction_keeps_recently_used() {
        let cache = level(30);

        cache.set("a".repeat(10), &"first".into());
        cache.set("b".repeat(10), &"second".into());
        cache.set("c".repeat(10), &"third".into());
        // Touch the oldest entry so "second" becomes the eviction candidate.
        cache.get(&"first".into());
        cache.set("d".repeat(10), &"fourth".into());

        assert!(cache.size() <= 30);
        assert!(cache.contains(&"first".into()));
        assert!(!cache.contains(&"second".into()));
        assert!(cache.contains(&"fourth".into()));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_oversized_value_is_not_cached() {
        let cache = level(5);

        cache.set("small".into(), &"k".into());
        assert_matches!(cache.set("far too large".into(), &"k".into()).peek(), Some(Outcome::Success(())));

        assert!(!cache.contains(&"k".into()));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_clear_and_memory_warning_empty_the_level() {
        let cache = level(1024);
        for i in 0..10 {
            cache.set(format!("value-{i}"), &format!("key-{i}"));
        }
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);

        cache.set("again".into(), &"k".into());
        cache.on_memory_warning();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_default_cost_counts_entries() {
        let cache = MemoryCacheLevel::<u32, u32>::with_config(MemoryCacheConfig { capacity: 3 });
        for i in 0..10 {
            cache.set(i, &i);
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.size(), 3);
        assert!(cache.contains(&9));
    }

    #[test]
    fn test_stats() {
        let cache = level(1024);
        cache.set("test data".into(), &"k".into());
        cache.get(&"k".into());
        cache.get(&"missing".into());

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.size, 9);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio, 0.5);
    }

    #[test]
    fn test_concurrent_access_respects_capacity() {
        let cache = level(1000);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("t{t}-{i}");
                        cache.set("x".repeat(10), &key);
                        cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.size() <= 1000);
    }

    #[test]
    fn test_concurrent_set_and_clear_keep_total_cost_consistent() {
        let cache = level(200);
        let done = Arc::new(AtomicBool::new(false));

        let clearer = {
            let (cache, done) = (cache.clone(), Arc::clone(&done));
            std::thread::spawn(move || {
                let mut peak = 0;
                while !done.load(Ordering::SeqCst) {
                    cache.clear();
                    peak = peak.max(cache.size());
                }
                peak
            })
        };
        let setters: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let mut peak = 0;
                    for i in 0..5_000usize {
                        cache.set("x".repeat(1 + i % 20), &format!("t{t}-{}", i % 50));
                        peak = peak.max(cache.size());
                    }
                    peak
                })
            })
            .collect();

        let mut peak = 0;
        for setter in setters {
            peak = peak.max(setter.join().unwrap());
        }
        done.store(true, Ordering::SeqCst);
        peak = peak.max(clearer.join().unwrap());

        // Inserts in progress may overshoot until their own eviction pass.
        assert!(peak <= 2 * 200, "total cost reached {peak}");
        let tracked: u64 = cache.inner.entries.iter().map(|entry| entry.cost).sum();
        assert_eq!(cache.size(), tracked);
        assert!(cache.size() <= 200);
    }
}
