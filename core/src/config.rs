use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::document::Schema;
use crate::error::Result;
use crate::scoring::{Stage, StageTable};

/// Engine-wide settings. Every field has a default, so a JSON file only needs
/// to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stage_weights: StageTable<f64>,
    pub ranking_weights: RankingWeights,
    pub limits: Limits,
    pub caches: CacheSettings,
    pub fuzzy_threshold: f64,
    pub correction_threshold: f64,
    pub bm25: Bm25Params,
    pub schema: Schema,
    pub business: BusinessRules,
    pub preferences: Preferences,
    /// Stages that start after this many milliseconds are skipped.
    pub query_deadline_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_weights: default_stage_weights(),
            ranking_weights: RankingWeights::default(),
            limits: Limits::default(),
            caches: CacheSettings::default(),
            fuzzy_threshold: 0.6,
            correction_threshold: 0.9,
            bm25: Bm25Params::default(),
            schema: Schema::default(),
            business: BusinessRules::default(),
            preferences: Preferences::default(),
            query_deadline_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn query_deadline(&self) -> Option<Duration> {
        self.query_deadline_ms.map(Duration::from_millis)
    }
}

pub fn default_stage_weights() -> StageTable<f64> {
    StageTable::from_fn(|stage| match stage {
        Stage::Retrieval => 0.30,
        Stage::Enhancement => 0.10,
        Stage::Ranking => 0.20,
        Stage::Distributed => 0.30,
        Stage::Approximate => 0.05,
        Stage::Insight => 0.05,
    })
}

/// Weights of the presentation-facing blend computed after stage combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub keyword: f64,
    pub content_quality: f64,
    pub ux: f64,
    pub authority: f64,
    pub freshness: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self { keyword: 0.4, content_quality: 0.2, ux: 0.15, authority: 0.15, freshness: 0.10 }
    }
}

/// Result-set caps applied at each stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub retrieval: usize,
    pub enhancement: usize,
    pub ranking: usize,
    pub distributed: usize,
    pub approximate_scan: usize,
    pub combined: usize,
    pub diversity: usize,
    pub max_query_len: usize,
    /// Distinct keys kept per analytics counter before the least counted is evicted.
    pub analytics_keys: usize,
    /// Searches kept by the performance monitor.
    pub performance_window: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            retrieval: 500,
            enhancement: 200,
            ranking: 200,
            distributed: 2000,
            approximate_scan: 1000,
            combined: 1000,
            diversity: 15,
            max_query_len: 500,
            analytics_keys: 10_000,
            performance_window: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheLimits {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl CacheLimits {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub query: CacheLimits,
    pub index: CacheLimits,
    pub analytics: CacheLimits,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            query: CacheLimits { capacity: 500, ttl_secs: 1800 },
            index: CacheLimits { capacity: 1000, ttl_secs: 7200 },
            analytics: CacheLimits { capacity: 100, ttl_secs: 300 },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    /// Fixed, not recomputed from the collection.
    pub avg_doc_len: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75, avg_doc_len: 50.0 }
    }
}

/// Promotions and brand tiers. Brand and category names are lower-case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessRules {
    pub promoted_brands: Vec<String>,
    pub promoted_boost: f64,
    pub sponsored_categories: Vec<String>,
    pub sponsored_boost: f64,
    pub freshness_boost: f64,
    pub top_tier_brands: Vec<String>,
    pub second_tier_brands: Vec<String>,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            promoted_brands: strings(&["samsung", "apple", "sony"]),
            promoted_boost: 0.15,
            sponsored_categories: strings(&["electronics"]),
            sponsored_boost: 0.1,
            freshness_boost: 0.1,
            top_tier_brands: strings(&["samsung", "apple", "sony", "lg", "xiaomi", "oneplus"]),
            second_tier_brands: strings(&["realme", "vivo", "oppo", "huawei", "motorola"]),
        }
    }
}

/// The simulated preference set of the (single) default user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub brands: Vec<String>,
    pub brand_boost: f64,
    pub categories: Vec<String>,
    pub category_boost: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            brands: strings(&["samsung", "apple"]),
            brand_boost: 0.1,
            categories: strings(&["electronics"]),
            category_boost: 0.05,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_weights_sum_to_one() {
        let total: f64 = EngineConfig::default().stage_weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"limits": {"retrieval": 10}, "query_deadline_ms": 250}"#).unwrap();
        assert_eq!(cfg.limits.retrieval, 10);
        assert_eq!(cfg.limits.ranking, 200);
        assert_eq!(cfg.limits.analytics_keys, 10_000);
        assert_eq!(cfg.query_deadline(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.fuzzy_threshold, 0.6);
    }
}
