//! The search service: owns the store, index, facets, caches and stage
//! pipeline, and is the single place where internal failures are translated
//! into what callers see.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::analytics::{AnalyticsSnapshot, CountedValue, SearchAnalytics};
use crate::boolean::{self, QueryExpr};
use crate::cache::{CacheReport, CacheSet, CleanupReport};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{Result, SearchError};
use crate::facets::{Facet, FacetEngine, FacetFilters, FacetKind};
use crate::fuzzy::{FuzzyMatch, FuzzyMatcher};
use crate::index::{DocId, IndexStatistics, InvertedIndex};
use crate::loader;
use crate::performance::{PerformanceMonitor, PerformanceReport};
use crate::scoring::{
    combine, diversify, present, Pipeline, QueryProcessor, ScoreContribution, SearchResult, Stage, StageContext,
};
use crate::store::DocumentStore;

const STATISTICS_KEY: &str = "index_statistics";
const WARM_BRANDS: usize = 50;
const WARM_CATEGORIES: usize = 20;
const SNAPSHOT_KEY: &str = "snapshot";

/// Entries of the index-metadata cache.
#[derive(Debug, Clone)]
pub enum IndexMetadata {
    Statistics(IndexStatistics),
    Postings(Vec<DocId>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Run only this stage.
    pub stage: Option<Stage>,
    /// Cap repeats of brand and category in a short list.
    pub diversify: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacetedSearchResponse {
    pub results: Vec<SearchResult>,
    pub facets: BTreeMap<FacetKind, Facet>,
    pub total_results: usize,
    pub filtered_results: usize,
    pub applied_filters: FacetFilters,
}

type Caches = CacheSet<Arc<Vec<SearchResult>>, IndexMetadata, AnalyticsSnapshot>;

/// Trims, truncates to `max_len` characters and strips `<>"'`.
pub fn sanitize_query(raw: &str, max_len: usize) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SearchError::Validation("query is empty".into()));
    }
    let len = trimmed.chars().count();
    let bounded: String = if len > max_len {
        tracing::warn!(from = len, to = max_len, "query truncated");
        trimmed.chars().take(max_len).collect()
    } else {
        trimmed.to_string()
    };
    let cleaned: String = bounded.chars().filter(|c| !matches!(c, '<' | '>' | '"' | '\'')).collect();
    if cleaned.trim().is_empty() {
        return Err(SearchError::Validation("query has no searchable characters".into()));
    }
    Ok(cleaned)
}

fn cache_key(query: &str, options: SearchOptions) -> String {
    let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let stage = options.stage.map_or("all", Stage::as_str);
    format!("{normalized}|{stage}|{}", options.diversify)
}

pub struct SearchEngine {
    store: DocumentStore,
    index: InvertedIndex,
    facets: FacetEngine,
    fuzzy: FuzzyMatcher,
    processor: QueryProcessor,
    pipeline: Pipeline,
    caches: Caches,
    analytics: Mutex<SearchAnalytics>,
    performance: Mutex<PerformanceMonitor>,
    config: EngineConfig,
}

impl SearchEngine {
    /// Builds the index and facets over `store` and warms the metadata cache.
    pub fn new(store: DocumentStore, config: EngineConfig) -> Self {
        let index = InvertedIndex::build(store.iter().map(|(id, doc)| (id, doc.as_ref())), &config.schema);
        let facets = FacetEngine::build(&store, &config.schema);
        let fuzzy = FuzzyMatcher::new(config.fuzzy_threshold);
        let engine = Self {
            processor: QueryProcessor::new(fuzzy, config.correction_threshold),
            caches: CacheSet::new(&config.caches),
            analytics: Mutex::new(SearchAnalytics::with_key_limit(config.limits.analytics_keys)),
            performance: Mutex::new(PerformanceMonitor::new(config.limits.performance_window)),
            pipeline: Pipeline::default(),
            store,
            index,
            facets,
            fuzzy,
            config,
        };
        engine.warm_caches();
        engine
    }

    pub fn from_documents(documents: Vec<Document>, config: EngineConfig) -> Result<Self> {
        let store = DocumentStore::from_documents(documents, &config)?;
        Ok(Self::new(store, config))
    }

    /// Loads a dataset from disk; any load failure is returned as `DataLoad`.
    pub fn load<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        let documents = loader::load_path(path)?;
        Self::from_documents(documents, config)
    }

    fn warm_caches(&self) {
        self.caches.index.put(STATISTICS_KEY, IndexMetadata::Statistics(self.index.statistics().clone()));
        let mut brands: Vec<&String> = self.index.brand_index.keys().collect();
        brands.sort();
        for brand in brands.into_iter().take(WARM_BRANDS) {
            self.caches.index.put(format!("brand:{brand}"), IndexMetadata::Postings(self.index.by_brand(brand).to_vec()));
        }
        let mut categories: Vec<&String> = self.index.category_index.keys().collect();
        categories.sort();
        for category in categories.into_iter().take(WARM_CATEGORIES) {
            self.caches
                .index
                .put(format!("category:{category}"), IndexMetadata::Postings(self.index.by_category(category).to_vec()));
        }
        tracing::debug!(cached = self.caches.index.len(), "index metadata cache warmed");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn document(&self, id: &str) -> Option<&Arc<Document>> {
        self.store.by_external_id(id)
    }

    fn context(&self) -> StageContext<'_> {
        StageContext::new(&self.store, &self.index, &self.config, &self.processor)
    }

    fn record_performance(&self, started: Instant) {
        let caches = self.caches.stats();
        self.performance.lock().record(caches, started.elapsed());
    }

    pub fn search(&self, query: &str, stage: Option<Stage>) -> Result<Vec<SearchResult>> {
        self.search_with_options(query, SearchOptions { stage, diversify: false })
    }

    /// Ranked results for a free-text query. An empty or unusable query yields
    /// no results; the only error is an engine without documents.
    pub fn search_with_options(&self, raw_query: &str, options: SearchOptions) -> Result<Vec<SearchResult>> {
        let started = Instant::now();
        let query = match sanitize_query(raw_query, self.config.limits.max_query_len) {
            Ok(q) => q,
            Err(e) => {
                tracing::debug!(error = %e, "query rejected");
                return Ok(Vec::new());
            }
        };
        if self.store.is_empty() {
            tracing::error!("search on an engine with no documents");
            return Err(SearchError::NotInitialized);
        }
        self.analytics.lock().record_query(&query);

        let key = cache_key(&query, options);
        if let Some(cached) = self.caches.query.get(&key) {
            tracing::debug!(query = %query, "query cache hit");
            self.analytics.lock().record_duration(started.elapsed());
            self.record_performance(started);
            return Ok(Vec::clone(&cached));
        }

        let run = self.pipeline.run(&self.context(), &query, options.stage, self.config.query_deadline());
        if run.total_hits() == 0 {
            tracing::warn!(query = %query, failed = ?run.failed, "no results");
            let mut analytics = self.analytics.lock();
            analytics.record_stages(run.completed());
            analytics.record_duration(started.elapsed());
            drop(analytics);
            self.record_performance(started);
            return Ok(Vec::new());
        }

        let candidates = combine(&run.outputs, &self.config.stage_weights, self.config.limits.combined);
        let mut results = present(candidates, &self.store, &self.config, &query);
        if options.diversify {
            results = diversify(results, &self.config.schema, self.config.limits.diversity);
        }

        {
            let mut analytics = self.analytics.lock();
            analytics.record_stages(run.completed());
            analytics.record_results(&results, &self.config.schema);
            analytics.record_duration(started.elapsed());
        }
        self.caches.query.put(key, Arc::new(results.clone()));
        self.record_performance(started);
        tracing::info!(
            query = %query,
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        Ok(results)
    }

    /// Boolean search with AND, OR, NOT and parentheses. A query that does not
    /// parse is run as a keyword search over its raw words.
    pub fn search_boolean(&self, raw_query: &str) -> Result<Vec<SearchResult>> {
        let started = Instant::now();
        let query = match sanitize_query(raw_query, self.config.limits.max_query_len) {
            Ok(q) => q,
            Err(_) => return Ok(Vec::new()),
        };
        if self.store.is_empty() {
            return Err(SearchError::NotInitialized);
        }
        match boolean::parse_or_fallback(&query) {
            Ok(expr) => {
                self.analytics.lock().record_query(&query);
                let results = self.evaluate_boolean(&expr);
                {
                    let mut analytics = self.analytics.lock();
                    analytics.record_results(&results, &self.config.schema);
                    analytics.record_duration(started.elapsed());
                }
                self.record_performance(started);
                Ok(results)
            }
            Err(failure) => {
                tracing::warn!(error = %failure.error, "boolean parse failed, falling back to keyword search");
                self.search(&failure.fallback_terms.join(" "), None)
            }
        }
    }

    fn evaluate_boolean(&self, expr: &QueryExpr) -> Vec<SearchResult> {
        let terms = expr.terms();
        let texts: Vec<(DocId, String)> = self.store.iter().map(|(id, doc)| (id, doc.text_lower())).collect();
        let term_matches: HashMap<String, HashSet<DocId>> = terms
            .iter()
            .map(|term| {
                let ids = texts.iter().filter(|(_, text)| text.contains(term)).map(|(id, _)| *id).collect();
                (term.to_string(), ids)
            })
            .collect();
        let matched = boolean::evaluate(expr, &term_matches);
        let results: Vec<SearchResult> = self
            .store
            .iter()
            .filter(|(id, _)| matched.contains(id))
            .map(|(doc_id, doc)| SearchResult {
                doc_id,
                document: Arc::clone(doc),
                score: 1.0,
                stage_score: 1.0,
                contributions: ScoreContribution::single(Stage::Enhancement, 1.0),
                tags: BTreeSet::from(["boolean".to_string()]),
                annotations: Default::default(),
            })
            .collect();
        tracing::info!(terms = terms.len(), results = results.len(), "boolean search completed");
        results
    }

    /// Keyword search narrowed by facet selections.
    pub fn search_with_facets(
        &self,
        query: &str,
        filters: &FacetFilters,
        stage: Option<Stage>,
    ) -> Result<FacetedSearchResponse> {
        let results = self.search(query, stage)?;
        let total_results = results.len();
        let filtered: Vec<SearchResult> = if filters.values().all(Vec::is_empty) {
            results
        } else {
            results.into_iter().filter(|r| self.facets.matches(r.doc_id, filters)).collect()
        };
        Ok(FacetedSearchResponse {
            filtered_results: filtered.len(),
            results: filtered,
            facets: self.facets.facets().clone(),
            total_results,
            applied_filters: filters.clone(),
        })
    }

    pub fn get_facets(&self) -> &BTreeMap<FacetKind, Facet> {
        self.facets.facets()
    }

    pub fn facet_engine(&self) -> &FacetEngine {
        &self.facets
    }

    pub fn cache_stats(&self) -> CacheReport {
        self.caches.stats()
    }

    pub fn cleanup_expired_all(&self) -> CleanupReport {
        let report = self.caches.cleanup_expired_all();
        tracing::info!(?report, "expired cache entries removed");
        report
    }

    pub fn clear_caches(&self) {
        self.caches.clear_all();
        tracing::info!("all caches cleared");
    }

    /// Documents of `brand`, read through the index-metadata cache.
    pub fn brand_documents(&self, brand: &str) -> Vec<Arc<Document>> {
        let key = format!("brand:{}", brand.to_lowercase());
        self.cached_postings(key, || self.index.by_brand(brand).to_vec())
    }

    /// Documents whose type is `category`, read through the index-metadata cache.
    pub fn category_documents(&self, category: &str) -> Vec<Arc<Document>> {
        let key = format!("category:{}", category.to_lowercase());
        self.cached_postings(key, || self.index.by_category(category).to_vec())
    }

    fn cached_postings<F: FnOnce() -> Vec<DocId>>(&self, key: String, load: F) -> Vec<Arc<Document>> {
        let ids = match self.caches.index.get(&key) {
            Some(IndexMetadata::Postings(ids)) => ids,
            _ => {
                let ids = load();
                if !ids.is_empty() {
                    self.caches.index.put(key, IndexMetadata::Postings(ids.clone()));
                }
                ids
            }
        };
        ids.into_iter().filter_map(|id| self.store.get(id).cloned()).collect()
    }

    pub fn index_statistics(&self) -> IndexStatistics {
        if let Some(IndexMetadata::Statistics(stats)) = self.caches.index.get(STATISTICS_KEY) {
            return stats;
        }
        let stats = self.index.statistics().clone();
        self.caches.index.put(STATISTICS_KEY, IndexMetadata::Statistics(stats.clone()));
        stats
    }

    /// Usage counters, served from the analytics cache while fresh.
    pub fn analytics(&self) -> AnalyticsSnapshot {
        if let Some(snapshot) = self.caches.analytics.get(SNAPSHOT_KEY) {
            return snapshot;
        }
        let snapshot = self.analytics.lock().snapshot(self.store.len());
        self.caches.analytics.put(SNAPSHOT_KEY, snapshot.clone());
        snapshot
    }

    /// Latest per-search snapshot with trends; `None` before any search.
    pub fn performance_report(&self) -> Option<PerformanceReport> {
        self.performance.lock().report()
    }

    /// Popular past queries containing `input`.
    pub fn suggestions(&self, input: &str) -> Vec<CountedValue> {
        self.analytics.lock().suggestions(input)
    }

    /// "Did you mean" candidates for `term` from the indexed vocabulary.
    pub fn suggest_terms(&self, term: &str, max_results: usize) -> Vec<FuzzyMatch> {
        let vocabulary = self.index.vocabulary();
        self.fuzzy.find_matches(term, &vocabulary, max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_and_truncates() {
        assert_eq!(sanitize_query("  <b>\"phone\"  ", 500).unwrap(), "bphone");
        assert_eq!(sanitize_query(&"a".repeat(600), 500).unwrap().len(), 500);
        assert!(matches!(sanitize_query("   ", 500), Err(SearchError::Validation(_))));
        assert!(matches!(sanitize_query("<>", 500), Err(SearchError::Validation(_))));
    }

    #[test]
    fn cache_keys_ignore_case_and_spacing() {
        let o = SearchOptions::default();
        assert_eq!(cache_key("Phone  Case", o), cache_key("phone case", o));
        assert_ne!(cache_key("phone", o), cache_key("phone", SearchOptions { stage: Some(Stage::Ranking), diversify: false }));
    }

    #[test]
    fn empty_engine_is_not_initialized() {
        let engine = SearchEngine::new(DocumentStore::default(), EngineConfig::default());
        assert!(matches!(engine.search("phone", None), Err(SearchError::NotInitialized)));
        assert!(engine.search("   ", None).unwrap().is_empty());
    }

    #[test]
    fn warming_fills_the_index_cache() {
        let docs = vec![Document::new("1").with_field("Brand", "Sony").with_field("Type", "Speaker")];
        let engine = SearchEngine::from_documents(docs, EngineConfig::default()).unwrap();
        assert_eq!(engine.cache_stats().index.size, 3);
        assert_eq!(engine.index_statistics().brands_found, 1);
        assert_eq!(engine.cache_stats().index.hits, 1);
    }

    #[test]
    fn brand_and_category_lookups_read_warmed_postings() {
        let docs = vec![
            Document::new("1").with_field("Brand", "Sony").with_field("Type", "Speaker"),
            Document::new("2").with_field("Brand", "Boat").with_field("Type", "Speaker"),
        ];
        let engine = SearchEngine::from_documents(docs, EngineConfig::default()).unwrap();
        let sony_docs = engine.brand_documents("SONY");
        let sony: Vec<&str> = sony_docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(sony, vec!["1"]);
        assert_eq!(engine.category_documents("speaker").len(), 2);
        assert_eq!(engine.cache_stats().index.hits, 2);
        assert!(engine.brand_documents("nobody").is_empty());
    }

    #[test]
    fn cold_postings_are_cached_on_first_lookup() {
        let docs = vec![Document::new("1").with_field("Brand", "Sony")];
        let engine = SearchEngine::from_documents(docs, EngineConfig::default()).unwrap();
        engine.clear_caches();
        assert_eq!(engine.brand_documents("sony").len(), 1);
        assert_eq!(engine.cache_stats().index.size, 1);
        assert_eq!(engine.brand_documents("sony").len(), 1);
        assert_eq!(engine.cache_stats().index.hits, 1);
    }

    #[test]
    fn boolean_queries_count_as_searches() {
        let docs = vec![
            Document::new("1").with_field("Name", "Bluetooth Speaker").with_field("Brand", "Sony"),
            Document::new("2").with_field("Name", "Car Charger").with_field("Brand", "Sony"),
        ];
        let engine = SearchEngine::from_documents(docs, EngineConfig::default()).unwrap();
        let results = engine.search_boolean("bluetooth AND speaker").unwrap();
        assert_eq!(results.len(), 1);
        let snapshot = engine.analytics();
        assert_eq!(snapshot.total_searches, 1);
        assert_eq!(snapshot.popular_queries[0].value, "bluetooth and speaker");
        assert_eq!(snapshot.brand_popularity[0], CountedValue { value: "Sony".into(), count: 1 });
        assert_eq!(engine.performance_report().unwrap().history_length, 1);
    }

    #[test]
    fn every_search_leaves_a_performance_snapshot() {
        let docs = vec![Document::new("1").with_field("Name", "Bluetooth Speaker")];
        let engine = SearchEngine::from_documents(docs, EngineConfig::default()).unwrap();
        assert!(engine.performance_report().is_none());
        engine.search("speaker", None).unwrap();
        engine.search("speaker", None).unwrap();
        engine.search("nothing matches", None).unwrap();
        let report = engine.performance_report().unwrap();
        assert_eq!(report.history_length, 3);
        assert!(report.trends.is_some());
        assert_eq!(report.current.caches.query.hits, 1);
    }
}
