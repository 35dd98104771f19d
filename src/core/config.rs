//! Environment-driven configuration.
//!
//! Every setting has a documented default (spec.md §6) and is resolved
//! env-first; a missing variable falls back to the default silently, except
//! where the default is security-sensitive (an open render endpoint, an
//! unusually high session cap), in which case a startup warning is logged —
//! mirrors the teacher's `core::config` file-then-env-then-default idiom,
//! collapsed to env-then-default since this core has no on-disk config file.

use std::time::Duration;

pub const ENV_DB_PATH: &str = "CRAWLSTACK_DB_PATH";
pub const ENV_INDEX_DIR: &str = "CRAWLSTACK_INDEX_DIR";
pub const ENV_PORT: &str = "CRAWLSTACK_PORT";
pub const ENV_PORT_FALLBACK: &str = "PORT";
pub const ENV_DEFAULT_TIMEOUT_SECS: &str = "CRAWLSTACK_DEFAULT_REQUEST_TIMEOUT_SECS";
pub const ENV_RENDER_ENDPOINT: &str = "CRAWLSTACK_RENDER_ENDPOINT";
pub const ENV_MAX_CONCURRENT_SESSIONS: &str = "CRAWLSTACK_MAX_CONCURRENT_SESSIONS";
pub const ENV_SESSION_GRACE_SECS: &str = "CRAWLSTACK_SESSION_GRACE_SECS";
pub const ENV_POLITENESS_MS: &str = "CRAWLSTACK_POLITENESS_MS";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub db_path: String,
    pub index_dir: String,
    pub port: u16,
    pub default_request_timeout: Duration,
    pub render_endpoint: Option<String>,
    pub max_concurrent_sessions: usize,
    pub session_grace: Duration,
    pub politeness_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var(ENV_DB_PATH).unwrap_or_else(|_| "./crawlstack.db".to_string());
        let index_dir =
            std::env::var(ENV_INDEX_DIR).unwrap_or_else(|_| "./crawlstack-index".to_string());

        let port = std::env::var(ENV_PORT)
            .or_else(|_| std::env::var(ENV_PORT_FALLBACK))
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(8080);

        let default_request_timeout = std::env::var(ENV_DEFAULT_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let render_endpoint = std::env::var(ENV_RENDER_ENDPOINT)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if render_endpoint.is_none() {
            tracing::warn!(
                "{} not set; SPA rendering is disabled, render_policy requests will fail with RENDER_FAILED",
                ENV_RENDER_ENDPOINT
            );
        }

        let max_concurrent_sessions = std::env::var(ENV_MAX_CONCURRENT_SESSIONS)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(4);

        let session_grace = std::env::var(ENV_SESSION_GRACE_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        let politeness_interval = std::env::var(ENV_POLITENESS_MS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(500));

        Self {
            db_path,
            index_dir,
            port,
            default_request_timeout,
            render_endpoint,
            max_concurrent_sessions,
            session_grace,
            politeness_interval,
        }
    }
}
