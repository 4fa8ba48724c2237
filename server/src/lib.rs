use anyhow::Result;
use axum::{extract::{Query, State}, http::StatusCode, routing::get, Json, Router};
use folio_core::tokenizer::{parse_query, Normalizer};
use folio_core::{Ranker, SearchHit};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Index variant to query; the server's default when absent.
    pub stem: Option<bool>,
}
fn default_k() -> usize { 50 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub stem: bool,
    pub terms: Vec<String>,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

/// Shared, read-only query state. Bucket files are opened per request, so
/// concurrent searches need no locking.
#[derive(Clone)]
pub struct AppState {
    pub plain: Option<Arc<Ranker>>,
    pub stemmed: Option<Arc<Ranker>>,
    pub normalizer: Arc<Normalizer>,
    pub default_stem: bool,
}

impl AppState {
    fn ranker(&self, stem: bool) -> Option<&Arc<Ranker>> {
        if stem { self.stemmed.as_ref() } else { self.plain.as_ref() }
    }
}

/// Serves both index variants under `index_root`. The `stem` variant is
/// required; the other one is served too when it has been built.
pub fn build_app(index_root: PathBuf, stem: bool) -> Result<Router> {
    let primary = Some(Arc::new(Ranker::open(&index_root, stem)?));
    let secondary = match Ranker::open(&index_root, !stem) {
        Ok(ranker) => Some(Arc::new(ranker)),
        Err(e) => {
            tracing::info!(stem = !stem, reason = %e, "index variant not served");
            None
        }
    };
    let (plain, stemmed) = if stem { (secondary, primary) } else { (primary, secondary) };
    let app_state = AppState { plain, stemmed, normalizer: Arc::new(Normalizer::default()), default_stem: stem };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .with_state(app_state)
        .layer(cors);
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let stem = params.stem.unwrap_or(state.default_stem);
    let ranker = state.ranker(stem).ok_or_else(|| {
        let variant = if stem { "stemmed" } else { "unstemmed" };
        (StatusCode::NOT_FOUND, format!("no {variant} index is being served"))
    })?;
    let terms = parse_query(&state.normalizer, &params.q, stem);

    let mut results = ranker.rank(&terms).map_err(|e| {
        tracing::error!(error = %e, query = %params.q, "search failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let total_hits = results.len();
    results.truncate(params.k.max(1));

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, stem, total_hits, took_s = elapsed.as_secs_f64(), "search served");
    Ok(Json(SearchResponse { query: params.q, stem, terms, took_s: elapsed.as_secs_f64(), total_hits, results }))
}
