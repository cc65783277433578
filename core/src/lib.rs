//! In-memory product catalogue search: a multi-stage scoring pipeline, boolean
//! queries, fuzzy term matching, TTL-bounded LRU caches and facets.

pub mod analytics;
pub mod boolean;
pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod facets;
pub mod fuzzy;
pub mod index;
pub mod loader;
pub mod performance;
pub mod scoring;
pub mod store;
pub mod tokenizer;

pub use analytics::{AnalyticsSnapshot, CountedValue};
pub use boolean::{ParseError, QueryExpr};
pub use cache::{CacheReport, CacheStats, CleanupReport, LruCache};
pub use config::EngineConfig;
pub use document::{Document, Schema};
pub use engine::{FacetedSearchResponse, SearchEngine, SearchOptions};
pub use error::{Result, SearchError};
pub use facets::{Facet, FacetFilters, FacetKind};
pub use fuzzy::{FuzzyMatch, FuzzyMatcher};
pub use index::{DocId, IndexStatistics, InvertedIndex};
pub use performance::{PerformanceReport, PerformanceSnapshot, PerformanceTrends};
pub use scoring::{SearchResult, Stage, StageTable};
pub use store::DocumentStore;
