use catalog_core::facets::parse_filters;
use catalog_core::{Document, EngineConfig, FacetFilters, FacetKind, SearchEngine, SearchOptions, Stage};

fn catalogue() -> Vec<Document> {
    vec![
        Document::new("speaker-01")
            .with_field("Name", "Portable Bluetooth Speaker")
            .with_field("Type", "Speaker")
            .with_field("Brand", "Sony")
            .with_field("Sales Package", "1 Speaker, 1 Cable"),
        Document::new("headset-01")
            .with_field("Name", "Wireless Headphones")
            .with_field("Type", "Headphone")
            .with_field("Brand", "Sony")
            .with_field("Sales Package", "1 Headphone, 1 Pouch"),
        Document::new("adapter-01")
            .with_field("Name", "Bluetooth Car Adapter")
            .with_field("Type", "Car Adapter")
            .with_field("Brand", "Sony")
            .with_field("Sales Package", "1 Adapter, 1 Manual"),
    ]
}

fn engine() -> SearchEngine {
    SearchEngine::from_documents(catalogue(), EngineConfig::default()).unwrap()
}

fn score_of(results: &[catalog_core::SearchResult], id: &str) -> f64 {
    results.iter().find(|r| r.id() == id).map(|r| r.score).unwrap()
}

#[test]
fn bluetooth_query_ranks_direct_matches_first() {
    let engine = engine();
    let results = engine.search("bluetooth", None).unwrap();
    assert_eq!(results.len(), 3);
    let headphones = score_of(&results, "headset-01");
    assert!(score_of(&results, "speaker-01") >= headphones);
    assert!(score_of(&results, "adapter-01") >= headphones);
    assert_eq!(results.last().map(|r| r.id()), Some("headset-01"));

    let enhanced = results.iter().find(|r| r.id() == "speaker-01").unwrap();
    assert!(enhanced.contributions.get(Stage::Retrieval).is_some());
    assert!(enhanced.annotations.highlights["Name"].contains("<mark>bluetooth</mark>"));
    assert!(enhanced.annotations.snippet.is_some());
}

#[test]
fn repeated_query_is_served_from_cache() {
    let engine = engine();
    let first = engine.search("bluetooth", None).unwrap();
    let before = engine.cache_stats().query;
    let second = engine.search("  Bluetooth ", None).unwrap();
    let after = engine.cache_stats().query;

    assert_eq!(after.hits, before.hits + 1);
    assert_eq!(after.evictions, before.evictions);
    assert_eq!(after.evictions, 0);
    let ids = |r: &[catalog_core::SearchResult]| r.iter().map(|r| r.id().to_string()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn empty_and_hostile_queries_return_nothing() {
    let engine = engine();
    assert!(engine.search("", None).unwrap().is_empty());
    assert!(engine.search("   ", None).unwrap().is_empty());
    assert!(engine.search("<'\">", None).unwrap().is_empty());
    assert!(engine.search("zebra", None).unwrap().is_empty());
}

#[test]
fn single_stage_preference() {
    let engine = engine();
    let results = engine.search("bluetooth", Some(Stage::Approximate)).unwrap();
    let mut ids: Vec<&str> = results.iter().map(|r| r.id()).collect();
    ids.sort();
    assert_eq!(ids, vec!["adapter-01", "speaker-01"]);
    assert!(results.iter().all(|r| r.contributions.stages().eq([Stage::Approximate])));
}

#[test]
fn boolean_not_is_scoped_to_matched_documents() {
    let engine = engine();
    let results = engine.search_boolean("bluetooth AND NOT car").unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["speaker-01"]);

    // Only "car" documents form the universe here, so NOT leaves nothing.
    assert!(engine.search_boolean("NOT car").unwrap().is_empty());

    let either = engine.search_boolean("(speaker OR headphone) AND sony").unwrap();
    assert_eq!(either.len(), 2);
}

#[test]
fn malformed_boolean_query_falls_back_to_keywords() {
    let engine = engine();
    let results = engine.search_boolean("bluetooth AND (speaker").unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| !r.tags.contains("boolean")));
}

#[test]
fn facet_filters_narrow_results() {
    let engine = engine();
    let mut filters = FacetFilters::new();
    filters.insert(FacetKind::Category, vec!["Automotive".to_string()]);
    let response = engine.search_with_facets("bluetooth", &filters, None).unwrap();
    assert_eq!(response.total_results, 3);
    assert_eq!(response.filtered_results, 1);
    assert_eq!(response.results[0].id(), "adapter-01");
    let categories = &engine.get_facets()[&FacetKind::Category];
    assert_eq!(categories.count("Automotive"), Some(1));
    // "headphone" contains "phone", and the mobile keywords are checked first.
    assert_eq!(categories.count("Mobile & Tablets"), Some(1));
    assert_eq!(categories.count("Audio"), Some(1));

    let unfiltered = engine.search_with_facets("bluetooth", &FacetFilters::new(), None).unwrap();
    assert_eq!(unfiltered.filtered_results, 3);
    assert!(parse_filters(vec![("shape", vec![])]).is_err());
}

#[test]
fn diversified_search_is_capped() {
    let mut config = EngineConfig::default();
    config.limits.diversity = 2;
    let engine = SearchEngine::from_documents(catalogue(), config).unwrap();
    let results = engine.search_with_options("bluetooth", SearchOptions { stage: None, diversify: true }).unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn analytics_and_suggestions_follow_traffic() {
    let engine = engine();
    engine.search("bluetooth", None).unwrap();
    engine.search("bluetooth", None).unwrap();
    engine.search("bluetooth speaker", None).unwrap();

    let suggestions = engine.suggestions("blue");
    assert_eq!(suggestions[0].value, "bluetooth");
    assert_eq!(suggestions[0].count, 2);

    let snapshot = engine.analytics();
    assert_eq!(snapshot.total_searches, 3);
    assert_eq!(snapshot.total_documents, 3);
    assert_eq!(snapshot.brand_popularity[0].value, "Sony");

    let terms = engine.suggest_terms("bluetoth", 3);
    assert_eq!(terms[0].matched_term, "bluetooth");
}

#[test]
fn cache_maintenance() {
    let engine = engine();
    engine.search("speaker", None).unwrap();
    assert_eq!(engine.cleanup_expired_all().query_expired, 0);
    engine.clear_caches();
    let report = engine.cache_stats();
    assert_eq!(report.total_items, 0);
}

#[test]
fn duplicate_ids_fail_to_load() {
    let mut docs = catalogue();
    docs.push(Document::new("speaker-01"));
    assert!(SearchEngine::from_documents(docs, EngineConfig::default()).is_err());
    assert!(SearchEngine::from_documents(Vec::new(), EngineConfig::default()).is_err());
}
