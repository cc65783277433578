//! Per-search cache and latency snapshots kept in a bounded window.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::cache::CacheReport;

const QUERY_ENTRY_BYTES: usize = 1024;
const INDEX_ENTRY_BYTES: usize = 512;
const ANALYTICS_ENTRY_BYTES: usize = 256;

const LOW_HIT_RATIO: f64 = 0.5;
const NEAR_CAPACITY: f64 = 0.9;
const HIGH_MEMORY_BYTES: usize = 50 * 1024 * 1024;

/// Rough resident size of the cached entries.
pub fn estimate_memory(caches: &CacheReport) -> usize {
    caches.query.size * QUERY_ENTRY_BYTES
        + caches.index.size * INDEX_ENTRY_BYTES
        + caches.analytics.size * ANALYTICS_ENTRY_BYTES
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub captured_at: String,
    pub uptime_secs: f64,
    pub search_ms: f64,
    pub caches: CacheReport,
    pub memory_estimate_bytes: usize,
}

/// Change between the two most recent snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceTrends {
    pub hit_ratio: f64,
    pub memory_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub current: PerformanceSnapshot,
    pub trends: Option<PerformanceTrends>,
    pub history_length: usize,
    pub recommendations: Vec<String>,
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    started: Instant,
    window: usize,
    history: VecDeque<PerformanceSnapshot>,
}

impl PerformanceMonitor {
    pub fn new(window: usize) -> Self {
        Self { started: Instant::now(), window: window.max(1), history: VecDeque::new() }
    }

    pub fn record(&mut self, caches: CacheReport, elapsed: Duration) {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        let memory_estimate_bytes = estimate_memory(&caches);
        self.history.push_back(PerformanceSnapshot {
            captured_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            uptime_secs: self.started.elapsed().as_secs_f64(),
            search_ms: elapsed.as_secs_f64() * 1000.0,
            caches,
            memory_estimate_bytes,
        });
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// `None` until the first search has been recorded.
    pub fn report(&self) -> Option<PerformanceReport> {
        let current = self.history.back()?.clone();
        let trends = self.history.len().checked_sub(2).and_then(|i| self.history.get(i)).map(|previous| {
            PerformanceTrends {
                hit_ratio: current.caches.query.hit_ratio - previous.caches.query.hit_ratio,
                memory_bytes: current.memory_estimate_bytes as i64 - previous.memory_estimate_bytes as i64,
            }
        });
        let recommendations = recommendations(&current);
        Some(PerformanceReport { current, trends, history_length: self.history.len(), recommendations })
    }
}

fn recommendations(snapshot: &PerformanceSnapshot) -> Vec<String> {
    let query = &snapshot.caches.query;
    let mut out = Vec::new();
    if query.hit_ratio < LOW_HIT_RATIO {
        out.push("query cache hit ratio is low; consider a larger capacity or a longer TTL".to_string());
    }
    if query.size as f64 >= query.capacity as f64 * NEAR_CAPACITY {
        out.push("query cache is near capacity; consider raising it".to_string());
    }
    if snapshot.memory_estimate_bytes > HIGH_MEMORY_BYTES {
        out.push("cached entries use a lot of memory; consider cleaning up expired entries".to_string());
    }
    out
}
