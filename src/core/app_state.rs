use std::sync::Arc;

use crate::collaborators::render::{HttpRenderClient, RenderClient};
use crate::core::config::ServerConfig;
use crate::core::error::FetchError;
use crate::index::Index;
use crate::reqlog::ReqLogHandle;
use crate::robots::RobotsGate;
use crate::session::manager::{SessionDeps, SessionManager};
use crate::store::Store;

/// Shared, cloneable application handle wired once in `main` and threaded
/// through every axum handler via `State<Arc<AppState>>`.
#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    pub config: Arc<ServerConfig>,
    pub store: Arc<Store>,
    pub index: Arc<Index>,
    pub robots: Arc<RobotsGate>,
    pub sessions: Arc<SessionManager>,
    pub session_deps: SessionDeps,
    pub reqlog: ReqLogHandle,
    /// Caps outbound fetch concurrency across all sessions combined, so a
    /// single greedy crawl can't starve the process's file-descriptor/socket
    /// budget.
    pub outbound_limit: Arc<tokio::sync::Semaphore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db_path", &self.config.db_path)
            .field("index_dir", &self.config.index_dir)
            .field("max_concurrent_sessions", &self.config.max_concurrent_sessions)
            .finish()
    }
}

impl AppState {
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        // Redirects are followed manually in `fetch::fetch_direct` so each
        // session's `max_redirects`/`follow_redirects` config is honored
        // per-request rather than fixed once at client construction.
        let http_client = reqwest::Client::builder()
            .timeout(config.default_request_timeout)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let store = Arc::new(Store::open(&config.db_path).await?);
        let index = Arc::new(Index::open(&config.index_dir)?);
        let robots = Arc::new(RobotsGate::new(http_client.clone()));
        let reqlog = crate::reqlog::spawn(store.clone());
        let sessions = Arc::new(
            SessionManager::new(config.max_concurrent_sessions).with_grace(config.session_grace),
        );
        let outbound_limit = Arc::new(tokio::sync::Semaphore::new(
            config.max_concurrent_sessions.max(1) * 8,
        ));

        let render: Arc<dyn RenderClient> = Arc::new(HttpRenderClient::new(http_client.clone()));
        let session_deps = SessionDeps {
            http_client: http_client.clone(),
            render,
            robots: robots.clone(),
            store: store.clone(),
            index: index.clone(),
            politeness_interval: config.politeness_interval,
            outbound_limit: outbound_limit.clone(),
        };

        Ok(Self {
            http_client,
            config: Arc::new(config),
            store,
            index,
            robots,
            sessions,
            session_deps,
            reqlog,
            outbound_limit,
        })
    }
}

/// Thin marker so render-delegation call sites can construct a typed error
/// without importing `crate::core::error` directly in every module.
pub(crate) fn render_disabled() -> FetchError {
    FetchError::RenderFailed("no render endpoint configured".to_string())
}
