//! HTTP surface (spec.md §6): one axum router wired over `AppState`.
//! Boundary validation happens here, before any core component is invoked —
//! a request that fails `validate` never reaches C7/C8.

pub mod crawl;
pub mod health;
pub mod search;
pub mod spa;
pub mod validate;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/crawl/add-site", post(crawl::add_site))
        .route("/api/crawl/status", get(crawl::status))
        .route("/api/crawl/details", get(crawl::details))
        .route("/api/spa/detect", post(spa::detect))
        .route("/api/spa/render", post(spa::render))
        .route("/api/search", get(search::search))
        .route("/api/search/sites", get(search::search_sites))
        .route("/healthz", get(health::healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}
