//! Search usage counters and the snapshot served to operators.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::document::Schema;
use crate::scoring::{SearchResult, Stage, StageTable};

/// Durations kept for the latency average.
const DURATION_WINDOW: usize = 1000;
const TOP_N: usize = 10;
pub const MAX_SUGGESTIONS: usize = 5;
pub const MIN_SUGGESTION_INPUT: usize = 2;
pub const DEFAULT_KEY_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountedValue {
    pub value: String,
    pub count: u64,
}

fn top(counts: &HashMap<String, u64>, n: usize) -> Vec<CountedValue> {
    let mut entries: Vec<(&String, &u64)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().take(n).map(|(v, c)| CountedValue { value: v.clone(), count: *c }).collect()
}

/// Increments `key`, first evicting the least counted key when a new one would exceed `limit`.
fn bump(counts: &mut HashMap<String, u64>, key: &str, limit: usize) {
    if let Some(count) = counts.get_mut(key) {
        *count += 1;
        return;
    }
    if limit == 0 {
        return;
    }
    if counts.len() >= limit {
        let victim = counts.iter().min_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0))).map(|(k, _)| k.clone());
        if let Some(victim) = victim {
            counts.remove(&victim);
        }
    }
    counts.insert(key.to_string(), 1);
}

#[derive(Debug)]
pub struct SearchAnalytics {
    key_limit: usize,
    total_searches: u64,
    popular_queries: HashMap<String, u64>,
    stage_usage: StageTable<u64>,
    durations: VecDeque<Duration>,
    category_trends: HashMap<String, u64>,
    brand_popularity: HashMap<String, u64>,
}

impl Default for SearchAnalytics {
    fn default() -> Self {
        Self::with_key_limit(DEFAULT_KEY_LIMIT)
    }
}

impl SearchAnalytics {
    /// Query, type and brand counters each keep at most `key_limit` distinct keys.
    pub fn with_key_limit(key_limit: usize) -> Self {
        Self {
            key_limit,
            total_searches: 0,
            popular_queries: HashMap::new(),
            stage_usage: StageTable::default(),
            durations: VecDeque::new(),
            category_trends: HashMap::new(),
            brand_popularity: HashMap::new(),
        }
    }

    /// Counts a query before it is served, cached or not.
    pub fn record_query(&mut self, query: &str) {
        self.total_searches += 1;
        bump(&mut self.popular_queries, &query.to_lowercase(), self.key_limit);
    }

    pub fn record_stages<I: IntoIterator<Item = Stage>>(&mut self, stages: I) {
        for stage in stages {
            *self.stage_usage.get_mut(stage) += 1;
        }
    }

    pub fn record_duration(&mut self, elapsed: Duration) {
        if self.durations.len() == DURATION_WINDOW {
            self.durations.pop_front();
        }
        self.durations.push_back(elapsed);
    }

    /// Tallies the types and brands of returned documents.
    pub fn record_results(&mut self, results: &[SearchResult], schema: &Schema) {
        for result in results {
            if let Some(kind) = result.document.field(&schema.kind) {
                bump(&mut self.category_trends, kind, self.key_limit);
            }
            if let Some(brand) = result.document.field(&schema.brand) {
                bump(&mut self.brand_popularity, brand, self.key_limit);
            }
        }
    }

    pub fn total_searches(&self) -> u64 {
        self.total_searches
    }

    /// Past queries containing `input`, most popular first.
    pub fn suggestions(&self, input: &str) -> Vec<CountedValue> {
        let needle = input.trim().to_lowercase();
        if needle.chars().count() < MIN_SUGGESTION_INPUT {
            return Vec::new();
        }
        let matching: HashMap<String, u64> =
            self.popular_queries.iter().filter(|(q, _)| q.contains(&needle)).map(|(q, c)| (q.clone(), *c)).collect();
        top(&matching, MAX_SUGGESTIONS)
    }

    pub fn snapshot(&self, total_documents: usize) -> AnalyticsSnapshot {
        let average_search_ms = if self.durations.is_empty() {
            0.0
        } else {
            self.durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum::<f64>() / self.durations.len() as f64
        };
        AnalyticsSnapshot {
            total_documents,
            total_searches: self.total_searches,
            average_search_ms,
            popular_queries: top(&self.popular_queries, TOP_N),
            stage_usage: self.stage_usage,
            category_trends: top(&self.category_trends, TOP_N),
            brand_popularity: top(&self.brand_popularity, TOP_N),
            captured_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_documents: usize,
    pub total_searches: u64,
    pub average_search_ms: f64,
    pub popular_queries: Vec<CountedValue>,
    pub stage_usage: StageTable<u64>,
    pub category_trends: Vec<CountedValue>,
    pub brand_popularity: Vec<CountedValue>,
    pub captured_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_rank_by_popularity() {
        let mut a = SearchAnalytics::default();
        for q in ["Bluetooth speaker", "bluetooth speaker", "bluetooth", "phone", "speaker stand"] {
            a.record_query(q);
        }
        let s = a.suggestions("speak");
        assert_eq!(s[0], CountedValue { value: "bluetooth speaker".into(), count: 2 });
        assert_eq!(s.len(), 2);
        assert!(a.suggestions("s").is_empty());
        assert_eq!(a.total_searches(), 5);
    }

    #[test]
    fn snapshot_reports_usage() {
        let mut a = SearchAnalytics::default();
        a.record_query("x");
        a.record_stages([Stage::Retrieval, Stage::Ranking]);
        a.record_stages([Stage::Retrieval]);
        a.record_duration(Duration::from_millis(4));
        a.record_duration(Duration::from_millis(6));
        let snap = a.snapshot(12);
        assert_eq!(snap.total_documents, 12);
        assert_eq!(*snap.stage_usage.get(Stage::Retrieval), 2);
        assert!((snap.average_search_ms - 5.0).abs() < 1e-9);
        assert!(OffsetDateTime::parse(&snap.captured_at, &Rfc3339).is_ok());
    }

    #[test]
    fn counters_evict_the_least_counted_key() {
        let mut a = SearchAnalytics::with_key_limit(2);
        for q in ["a", "a", "b", "c"] {
            a.record_query(q);
        }
        let popular = a.snapshot(0).popular_queries;
        assert_eq!(
            popular,
            vec![CountedValue { value: "a".into(), count: 2 }, CountedValue { value: "c".into(), count: 1 }]
        );
        assert_eq!(a.total_searches(), 4);
    }

    #[test]
    fn result_counters_share_the_key_limit() {
        use crate::document::Document;
        use std::sync::Arc;

        let schema = Schema::default();
        let results: Vec<SearchResult> = ["Sony", "Boat", "Apple"]
            .into_iter()
            .enumerate()
            .map(|(i, brand)| SearchResult {
                doc_id: i as u32,
                document: Arc::new(Document::new(format!("p{i}")).with_field("Brand", brand).with_field("Type", "Audio")),
                score: 1.0,
                stage_score: 1.0,
                contributions: Default::default(),
                tags: Default::default(),
                annotations: Default::default(),
            })
            .collect();
        let mut a = SearchAnalytics::with_key_limit(2);
        a.record_results(&results, &schema);
        a.record_results(&results[2..], &schema);
        let snap = a.snapshot(3);
        assert_eq!(snap.brand_popularity.len(), 2);
        assert_eq!(snap.brand_popularity[0], CountedValue { value: "Apple".into(), count: 2 });
        assert_eq!(snap.category_trends, vec![CountedValue { value: "Audio".into(), count: 4 }]);
    }
}
