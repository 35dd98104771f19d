use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::core::types::{ApiError, ApiRequestLog, ApiSuccess, SearchMeta, SearchQuery, SiteSearchResponse};
use crate::core::AppState;
use crate::search::SearchService;

pub async fn search(State(state): State<Arc<AppState>>, Query(q): Query<SearchQuery>) -> Response {
    let started = Instant::now();
    let service = crate::search::IndexBackedSearch::new(state.index.clone(), state.store.clone());

    match service.search(&q.q, q.page, q.limit).await {
        Ok(response) => {
            record(&state, "/api/search", started, "ok", None);
            (StatusCode::OK, Json(ApiSuccess::new("ok", response))).into_response()
        }
        Err(e) => {
            record(&state, "/api/search", started, "rejected", Some(&e.to_string()));
            (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new("INVALID_REQUEST", e.to_string())),
            )
                .into_response()
        }
    }
}

/// Queries C5 directly for document projections (spec.md §6), bypassing
/// the Index entirely — useful when callers want store-truth results
/// without ranking.
pub async fn search_sites(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> Response {
    let started = Instant::now();
    let page = q.page.unwrap_or(1);
    let limit = q.limit.unwrap_or(10);

    if let Err(message) = super::validate::validate_search_bounds(q.page, q.limit) {
        record(&state, "/api/search/sites", started, "rejected", Some(&message));
        return (StatusCode::BAD_REQUEST, Json(ApiError::new("INVALID_REQUEST", message))).into_response();
    }

    let window = (page * limit) as i64;
    let offset = (page - 1) * limit;
    let fetched = state.store.search_documents_by_text(&q.q, window).await;
    let total = state.store.count_documents_matching(&q.q).await;

    match (fetched, total) {
        (Ok(docs), Ok(total)) => {
            let page_docs: Vec<_> = docs.into_iter().skip(offset).take(limit).collect();
            record(&state, "/api/search/sites", started, "ok", None);
            let response = SiteSearchResponse {
                meta: SearchMeta {
                    total,
                    page,
                    page_size: limit,
                    query_time_ms: started.elapsed().as_millis() as u64,
                    degraded: None,
                },
                hits: page_docs,
            };
            (StatusCode::OK, Json(ApiSuccess::new("ok", response))).into_response()
        }
        (Err(e), _) | (_, Err(e)) => {
            record(&state, "/api/search/sites", started, "error", Some(&e.to_string()));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("INTERNAL_ERROR", "search backend unavailable")),
            )
                .into_response()
        }
    }
}

fn record(state: &AppState, endpoint: &str, started: Instant, outcome: &str, error_message: Option<&str>) {
    state.reqlog.record(ApiRequestLog {
        endpoint: endpoint.to_string(),
        method: "GET".to_string(),
        client_ip: None,
        user_agent: None,
        started_at: Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
        outcome: outcome.to_string(),
        session_id: None,
        error_message: error_message.map(|s| s.to_string()),
    });
}
