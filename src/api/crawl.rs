use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::core::types::{
    AddSiteRequest, AddSiteResponseData, ApiError, ApiRequestLog, ApiSuccess, CrawlDetailsQuery,
    CrawlStatusQuery, RenderPolicy, SessionConfig,
};
use crate::core::AppState;
use crate::session::manager::CompletionEvent;

use super::validate::validate_add_site;

pub async fn add_site(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddSiteRequest>,
) -> Response {
    let started = Instant::now();

    if let Err(message) = validate_add_site(&req) {
        record(&state, "/api/crawl/add-site", "POST", started, "rejected", None, Some(&message));
        return invalid_request(message);
    }

    if req.stop_previous_sessions.unwrap_or(false) {
        stop_all_sessions(&state);
    }

    let config = merge_config(SessionConfig::default(), &req);

    let notify_email = req.email.clone();
    let notify_name = req.recipient_name.clone();
    let completion_cb: Option<crate::session::manager::CompletionCallback> =
        notify_email.map(|to| {
            Arc::new(move |event: CompletionEvent| {
                let to = to.clone();
                let name = notify_name.clone().unwrap_or_default();
                tokio::spawn(async move {
                    let mailer = crate::collaborators::mailer::NoopMailer;
                    let subject = format!("crawl session {} finished", event.session_id);
                    let body = format!(
                        "hello {name}, session {} finished with state {:?} and {} results",
                        event.session_id,
                        event.state,
                        event.results.len()
                    );
                    crate::collaborators::mailer::Mailer::enqueue(&mailer, &to, &subject, &body).await;
                });
            }) as Arc<dyn Fn(CompletionEvent) + Send + Sync>
        });

    let deps = state.session_deps.clone();

    match state.sessions.start(req.url.clone(), config, deps, completion_cb) {
        Ok(session_id) => {
            record(&state, "/api/crawl/add-site", "POST", started, "accepted", Some(&session_id), None);
            (
                StatusCode::OK,
                Json(ApiSuccess::new(
                    "crawl session started",
                    AddSiteResponseData { session_id },
                )),
            )
                .into_response()
        }
        Err(e) => {
            record(&state, "/api/crawl/add-site", "POST", started, "limited", None, Some(&e.to_string()));
            session_error_response(&e)
        }
    }
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CrawlStatusQuery>,
) -> Response {
    let started = Instant::now();
    let include_results = q.results.unwrap_or(false);

    let result = match &q.session_id {
        Some(id) => state
            .sessions
            .status(id, include_results, q.max_results)
            .map(|s| vec![s]),
        None => Ok(state
            .sessions
            .active_session_ids()
            .into_iter()
            .filter_map(|id| state.sessions.status(&id, include_results, q.max_results).ok())
            .collect()),
    };

    match result {
        Ok(statuses) => {
            record(&state, "/api/crawl/status", "GET", started, "ok", q.session_id.as_deref(), None);
            (StatusCode::OK, Json(ApiSuccess::new("ok", statuses))).into_response()
        }
        Err(e) => {
            record(&state, "/api/crawl/status", "GET", started, "not_found", q.session_id.as_deref(), Some(&e.to_string()));
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new("NOT_FOUND", e.to_string())),
            )
                .into_response()
        }
    }
}

pub async fn details(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CrawlDetailsQuery>,
) -> Response {
    let started = Instant::now();
    let limit = q.limit.unwrap_or(50).min(1000) as i64;
    let offset = q.offset.unwrap_or(0) as i64;

    let logs = if let Some(url) = &q.url {
        state.store.crawl_logs_for_url(url, limit, offset).await
    } else if let Some(domain) = &q.domain {
        state.store.crawl_logs_for_domain(domain, limit, offset).await
    } else {
        return invalid_request("one of domain or url is required".to_string());
    };

    match logs {
        Ok(logs) => {
            record(&state, "/api/crawl/details", "GET", started, "ok", None, None);
            (StatusCode::OK, Json(ApiSuccess::new("ok", logs))).into_response()
        }
        Err(e) => {
            record(&state, "/api/crawl/details", "GET", started, "error", None, Some(&e.to_string()));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("INTERNAL_ERROR", "failed to read crawl logs")),
            )
                .into_response()
        }
    }
}

fn merge_config(mut config: SessionConfig, req: &AddSiteRequest) -> SessionConfig {
    if let Some(v) = req.max_pages {
        config.max_pages = v;
    }
    if let Some(v) = req.max_depth {
        config.max_depth = v;
    }
    if let Some(v) = req.restrict_to_seed_domain {
        config.restrict_to_seed_domain = v;
    }
    if let Some(v) = req.follow_redirects {
        config.follow_redirects = v;
    }
    if let Some(v) = req.max_redirects {
        config.max_redirects = v;
    }
    if let Some(v) = req.force {
        config.force = v;
    }
    if let Some(v) = req.extract_text_content {
        config.extract_text_content = v;
    }
    if let Some(v) = req.spa_rendering_enabled {
        config.render_policy = if v { RenderPolicy::OnSpaHeuristic } else { RenderPolicy::Never };
    }
    if let Some(v) = req.include_full_content {
        config.include_full_content = v;
    }
    if let Some(secs) = req.request_timeout {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(v) = req.stop_previous_sessions {
        config.stop_previous_sessions = v;
    }
    config.render_endpoint = req.browserless_url.clone();
    config
}

/// spec.md §4.7: "if set, `stop` is called on every currently-running
/// session before `start` proceeds" — every active session, not just ones
/// sharing the new request's seed domain.
fn stop_all_sessions(state: &AppState) {
    for id in state.sessions.active_session_ids() {
        let _ = state.sessions.stop(&id);
    }
}

fn invalid_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiError::new("INVALID_REQUEST", message))).into_response()
}

fn session_error_response(e: &crate::core::error::SessionError) -> Response {
    use crate::core::error::SessionError;
    match e {
        SessionError::Limit { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            [(axum::http::header::RETRY_AFTER, retry_after_secs.to_string())],
            Json(ApiError::new("TOO_MANY_REQUESTS", e.to_string())),
        )
            .into_response(),
        SessionError::InvalidConfig(_) => invalid_request(e.to_string()),
        SessionError::NotFound => {
            (StatusCode::NOT_FOUND, Json(ApiError::new("NOT_FOUND", e.to_string()))).into_response()
        }
    }
}

fn record(
    state: &AppState,
    endpoint: &str,
    method: &str,
    started: Instant,
    outcome: &str,
    session_id: Option<&str>,
    error_message: Option<&str>,
) {
    state.reqlog.record(ApiRequestLog {
        endpoint: endpoint.to_string(),
        method: method.to_string(),
        client_ip: None,
        user_agent: None,
        started_at: Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
        outcome: outcome.to_string(),
        session_id: session_id.map(|s| s.to_string()),
        error_message: error_message.map(|s| s.to_string()),
    });
}
