use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use catalog_core::facets::parse_filters;
use catalog_core::{
    AnalyticsSnapshot, CacheReport, CleanupReport, CountedValue, Document, EngineConfig, FacetedSearchResponse,
    PerformanceReport, SearchEngine, SearchError, SearchOptions, SearchResult, Stage,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const DEFAULT_PER_PAGE: usize = 25;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub admin_token: Option<String>,
}

/// Loads the dataset and optional JSON config. Failing here must stop the server.
pub fn load_engine(dataset: &FsPath, config: Option<&FsPath>) -> Result<Arc<SearchEngine>> {
    let config = match config {
        Some(path) => EngineConfig::from_json_file(path).with_context(|| format!("reading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let engine = SearchEngine::load(dataset, config).with_context(|| format!("loading dataset {}", dataset.display()))?;
    tracing::info!(num_docs = engine.store().len(), "engine ready");
    Ok(Arc::new(engine))
}

pub fn build_app(engine: Arc<SearchEngine>, admin_token: Option<String>) -> Router {
    let state = AppState { engine, admin_token };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/search", get(search_handler))
        .route("/api/search/boolean", get(boolean_handler))
        .route("/api/search/facets", post(facets_search_handler))
        .route("/api/facets", get(facets_handler))
        .route("/api/documents/:id", get(document_handler))
        .route("/api/brands/:name", get(brand_handler))
        .route("/api/categories/:name", get(category_handler))
        .route("/api/cache/stats", get(cache_stats_handler))
        .route("/api/analytics", get(analytics_handler))
        .route("/api/performance", get(performance_handler))
        .route("/api/suggestions", get(suggestions_handler))
        .route("/admin/cache/clear", post(clear_cache))
        .route("/admin/cache/cleanup", post(cleanup_cache))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Maps engine errors to HTTP statuses.
pub struct ApiError(SearchError);

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SearchError::UnknownFacet(_) | SearchError::UnknownStage(_) | SearchError::Validation(_) => StatusCode::BAD_REQUEST,
            SearchError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub stage: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    #[serde(default)]
    pub diversify: bool,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub results: Vec<SearchResult>,
}

fn parse_stage(raw: Option<&str>) -> Result<Option<Stage>, SearchError> {
    raw.filter(|s| !s.is_empty()).map(str::parse).transpose()
}

/// Page is at least 1; page size outside 1..=100 falls back to the default.
pub fn paginate(results: Vec<SearchResult>, page: Option<usize>, per_page: Option<usize>) -> (Vec<SearchResult>, usize, usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.filter(|p| (1..=MAX_PER_PAGE).contains(p)).unwrap_or(DEFAULT_PER_PAGE);
    let total_pages = results.len().div_ceil(per_page);
    let slice = results.into_iter().skip((page - 1) * per_page).take(per_page).collect();
    (slice, page, per_page, total_pages)
}

fn respond(query: String, started: std::time::Instant, results: Vec<SearchResult>, params: &SearchParams) -> Json<SearchResponse> {
    let total_hits = results.len();
    let (results, page, per_page, total_pages) = paginate(results, params.page, params.per_page);
    Json(SearchResponse { query, took_s: started.elapsed().as_secs_f64(), total_hits, page, per_page, total_pages, results })
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let stage = parse_stage(params.stage.as_deref())?;
    let results = state.engine.search_with_options(&params.q, SearchOptions { stage, diversify: params.diversify })?;
    Ok(respond(params.q.clone(), start, results, &params))
}

pub async fn boolean_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let results = state.engine.search_boolean(&params.q)?;
    Ok(respond(params.q.clone(), start, results, &params))
}

#[derive(Deserialize)]
pub struct FacetSearchRequest {
    pub query: String,
    #[serde(default)]
    pub filters: HashMap<String, Vec<String>>,
    pub stage: Option<String>,
}

pub async fn facets_search_handler(
    State(state): State<AppState>,
    Json(req): Json<FacetSearchRequest>,
) -> Result<Json<FacetedSearchResponse>, ApiError> {
    let stage = parse_stage(req.stage.as_deref())?;
    let filters = parse_filters(req.filters)?;
    Ok(Json(state.engine.search_with_facets(&req.query, &filters, stage)?))
}

pub async fn facets_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "facets": state.engine.get_facets(),
        "total_documents": state.engine.store().len(),
    }))
}

pub async fn document_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Document>, (StatusCode, Json<serde_json::Value>)> {
    match state.engine.document(&id) {
        Some(doc) => Ok(Json(Document::clone(doc))),
        None => Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" })))),
    }
}

#[derive(Serialize)]
pub struct DocumentList {
    pub documents: Vec<Arc<Document>>,
    pub total: usize,
}

impl From<Vec<Arc<Document>>> for DocumentList {
    fn from(documents: Vec<Arc<Document>>) -> Self {
        Self { total: documents.len(), documents }
    }
}

pub async fn brand_handler(State(state): State<AppState>, Path(name): Path<String>) -> Json<DocumentList> {
    Json(state.engine.brand_documents(&name).into())
}

pub async fn category_handler(State(state): State<AppState>, Path(name): Path<String>) -> Json<DocumentList> {
    Json(state.engine.category_documents(&name).into())
}

pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheReport> {
    Json(state.engine.cache_stats())
}

pub async fn analytics_handler(State(state): State<AppState>) -> Json<AnalyticsSnapshot> {
    Json(state.engine.analytics())
}

pub async fn performance_handler(State(state): State<AppState>) -> Result<Json<PerformanceReport>, (StatusCode, Json<serde_json::Value>)> {
    match state.engine.performance_report() {
        Some(report) => Ok(Json(report)),
        None => Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "no performance data yet" })))),
    }
}

#[derive(Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct SuggestionResponse {
    pub suggestions: Vec<CountedValue>,
}

pub async fn suggestions_handler(State(state): State<AppState>, Query(params): Query<SuggestionParams>) -> Json<SuggestionResponse> {
    Json(SuggestionResponse { suggestions: state.engine.suggestions(&params.q) })
}

// --- Admin endpoints ---
async fn clear_cache(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, (StatusCode, String)> {
    authorize(&state, &headers)?;
    state.engine.clear_caches();
    Ok(StatusCode::NO_CONTENT)
}

async fn cleanup_cache(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CleanupReport>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    Ok(Json(state.engine.cleanup_expired_all()))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
