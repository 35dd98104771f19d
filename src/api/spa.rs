//! `/api/spa/detect` and `/api/spa/render`: one-shot SPA tooling that never
//! persists through C5/C6 and is deliberately **not** gated by the Robots
//! Gate (spec.md §9 Open Questions — these are diagnostic/manual endpoints,
//! not crawl traffic).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::core::app_state::render_disabled;
use crate::core::types::{
    ApiError, ApiRequestLog, ApiSuccess, RenderPolicy, SpaDetectRequest, SpaDetectResponse,
    SpaRenderRequest, SpaRenderResponse,
};
use crate::core::AppState;
use crate::fetch::{self, spa as spa_heuristic, FetchOpts};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn detect(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpaDetectRequest>,
) -> Response {
    let started = Instant::now();

    if url::Url::parse(&req.url).is_err() {
        return invalid_request(&state, "/api/spa/detect", started, format!("not a valid URL: {}", req.url));
    }

    let opts = FetchOpts {
        user_agent: "crawlstack-spa-detect/0.1".to_string(),
        timeout: DEFAULT_TIMEOUT,
        follow_redirects: true,
        max_redirects: 5,
        render_policy: RenderPolicy::Never,
        render_endpoint: None,
    };
    let token = tokio_util::sync::CancellationToken::new();

    match fetch::fetch(&state.http_client, state.session_deps.render.as_ref(), &req.url, &opts, &token).await {
        Ok(result) => {
            let html = String::from_utf8_lossy(&result.body).to_string();
            let is_spa = spa_heuristic::looks_like_spa(&html);
            let (indicators, confidence) = spa_heuristic::diagnose(&html);
            record(&state, "/api/spa/detect", started, "ok", None);
            (
                StatusCode::OK,
                Json(ApiSuccess::new(
                    "ok",
                    SpaDetectResponse { is_spa, indicators, confidence },
                )),
            )
                .into_response()
        }
        Err(e) => {
            record(&state, "/api/spa/detect", started, "fetch_failed", Some(&e.to_string()));
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiError::new("RENDER_FAILED", e.to_string())),
            )
                .into_response()
        }
    }
}

pub async fn render(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpaRenderRequest>,
) -> Response {
    let started = Instant::now();

    if url::Url::parse(&req.url).is_err() {
        return invalid_request(&state, "/api/spa/render", started, format!("not a valid URL: {}", req.url));
    }

    let endpoint = match state.config.render_endpoint.as_deref() {
        Some(e) => e,
        None => {
            let err = render_disabled();
            record(&state, "/api/spa/render", started, "render_disabled", Some(&err.to_string()));
            return (
                StatusCode::BAD_GATEWAY,
                Json(ApiError::new("RENDER_FAILED", err.to_string())),
            )
                .into_response();
        }
    };

    let timeout = req.timeout.map(Duration::from_millis).unwrap_or(DEFAULT_TIMEOUT);
    let start = Instant::now();
    match state.session_deps.render.render(endpoint, &req.url, timeout).await {
        Ok(html) => {
            record(&state, "/api/spa/render", started, "ok", None);
            (
                StatusCode::OK,
                Json(ApiSuccess::new(
                    "ok",
                    SpaRenderResponse {
                        url: req.url,
                        html,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    },
                )),
            )
                .into_response()
        }
        Err(e) => {
            record(&state, "/api/spa/render", started, "render_failed", Some(&e.to_string()));
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiError::new("RENDER_FAILED", e.to_string())),
            )
                .into_response()
        }
    }
}

fn invalid_request(state: &AppState, endpoint: &str, started: Instant, message: String) -> Response {
    record(state, endpoint, started, "rejected", Some(&message));
    (StatusCode::BAD_REQUEST, Json(ApiError::new("INVALID_REQUEST", message))).into_response()
}

fn record(state: &AppState, endpoint: &str, started: Instant, outcome: &str, error_message: Option<&str>) {
    state.reqlog.record(ApiRequestLog {
        endpoint: endpoint.to_string(),
        method: "POST".to_string(),
        client_ip: None,
        user_agent: None,
        started_at: Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
        outcome: outcome.to_string(),
        session_id: None,
        error_message: error_message.map(|s| s.to_string()),
    });
}
