//! Bounded LRU caches with a uniform per-instance TTL.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::config::{CacheLimits, CacheSettings};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub evictions: u64,
    pub ttl_secs: f64,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_access: Instant,
    /// Position in the recency order; larger is more recent.
    tick: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> Inner<V> {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn touch(&mut self, key: &str, now: Instant) {
        let tick = self.bump();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            entry.last_access = now;
            self.recency.insert(tick, key.to_string());
        }
    }
}

/// Thread-safe LRU cache. Every operation takes the single instance lock, since
/// even reads update counters and recency.
#[derive(Debug)]
pub struct LruCache<V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> LruCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn with_limits(limits: CacheLimits) -> Self {
        Self::new(limits.capacity, limits.ttl())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired = inner
            .entries
            .get(key)
            .map(|entry| now.duration_since(entry.last_access) > self.ttl);
        match expired {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(true) => {
                inner.remove(key);
                inner.misses += 1;
                return None;
            }
            Some(false) => {}
        }
        inner.touch(key, now);
        inner.hits += 1;
        inner.entries.get(key).map(|e| e.value.clone())
    }

    pub fn put<K: Into<String>>(&self, key: K, value: V) {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            inner.touch(&key, now);
            return;
        }
        if self.capacity == 0 {
            return;
        }
        if inner.entries.len() >= self.capacity {
            let oldest = inner.recency.first_key_value().map(|(_, k)| k.clone());
            if let Some(oldest) = oldest {
                inner.remove(&oldest);
                inner.evictions += 1;
            }
        }
        let tick = inner.bump();
        inner.recency.insert(tick, key.clone());
        inner.entries.insert(key, Entry { value, last_access: now, tick });
    }

    /// Drops every entry idle for longer than the TTL; returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_access) > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let requests = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            hit_ratio: if requests > 0 { inner.hits as f64 / requests as f64 } else { 0.0 },
            evictions: inner.evictions,
            ttl_secs: self.ttl.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    pub query: CacheStats,
    pub index: CacheStats,
    pub analytics: CacheStats,
    pub total_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub query_expired: usize,
    pub index_expired: usize,
    pub analytics_expired: usize,
}

/// The three independently configured cache instances the engine owns.
#[derive(Debug)]
pub struct CacheSet<Q, I, A> {
    pub query: LruCache<Q>,
    pub index: LruCache<I>,
    pub analytics: LruCache<A>,
}

impl<Q: Clone, I: Clone, A: Clone> CacheSet<Q, I, A> {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            query: LruCache::with_limits(settings.query),
            index: LruCache::with_limits(settings.index),
            analytics: LruCache::with_limits(settings.analytics),
        }
    }

    pub fn stats(&self) -> CacheReport {
        let query = self.query.stats();
        let index = self.index.stats();
        let analytics = self.analytics.stats();
        let total_items = query.size + index.size + analytics.size;
        CacheReport { query, index, analytics, total_items }
    }

    pub fn cleanup_expired_all(&self) -> CleanupReport {
        CleanupReport {
            query_expired: self.query.cleanup_expired(),
            index_expired: self.index.cleanup_expired(),
            analytics_expired: self.analytics.cleanup_expired(),
        }
    }

    pub fn clear_all(&self) {
        self.query.clear();
        self.index.clear();
        self.analytics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::new(3, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);
        assert_eq!(cache.get("a"), Some(1));
        cache.put("d", 4);
        assert!(!cache.contains("b"));
        assert!(cache.contains("a"));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn updating_existing_key_refreshes_without_eviction() {
        let cache = LruCache::new(2, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("a", 10);
        cache.put("c", 3);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn expired_entries_miss_and_shrink() {
        let cache = LruCache::new(4, Duration::from_millis(30));
        cache.put("a", 1);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }

    #[test]
    fn cleanup_removes_idle_entries() {
        let cache = LruCache::new(4, Duration::from_millis(30));
        cache.put("a", 1);
        cache.put("b", 2);
        thread::sleep(Duration::from_millis(60));
        cache.put("c", 3);
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hit_ratio_counts_requests() {
        let cache = LruCache::new(4, Duration::from_secs(60));
        cache.put("a", 1);
        cache.get("a");
        cache.get("a");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn concurrent_access_respects_capacity() {
        let cache = Arc::new(LruCache::new(16, Duration::from_secs(60)));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        cache.put(format!("{t}-{i}"), i);
                        cache.get(&format!("{t}-{}", i / 2));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 16);
    }

    #[test]
    fn cache_set_reports_each_instance() {
        let set: CacheSet<u32, u32, u32> = CacheSet::new(&CacheSettings::default());
        set.query.put("q", 1);
        set.index.put("i", 2);
        let report = set.stats();
        assert_eq!(report.total_items, 2);
        assert_eq!(report.query.capacity, 500);
        assert_eq!(report.analytics.ttl_secs, 300.0);
        set.clear_all();
        assert_eq!(set.stats().total_items, 0);
    }
}
