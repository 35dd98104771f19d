//! Core data model (spec.md §3): Document, CrawlLog, Session, FrontierEntry,
//! IndexEntry, RobotsRecord, ApiRequestLog, plus the request/response DTOs
//! for the HTTP surface (spec.md §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ───────────────────────────────────────────────────────────────────────────
// Document (C5, authoritative)
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub url: String,
    pub normalized_url: String,
    pub domain: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub text_content: Option<String>,
    pub raw_bytes_hash: String,
    pub content_type: String,
    pub links: BTreeSet<String>,
    pub language: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_crawled: DateTime<Utc>,
    pub word_count: Option<u32>,
    pub quality_score: Option<f32>,
}

// ───────────────────────────────────────────────────────────────────────────
// CrawlLog (append-only)
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Downloaded,
    Failed,
    Redirected,
    SkippedRobots,
    SkippedDuplicate,
}

impl CrawlStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CrawlStatus::Downloaded => "downloaded",
            CrawlStatus::Failed => "failed",
            CrawlStatus::Redirected => "redirected",
            CrawlStatus::SkippedRobots => "skipped_robots",
            CrawlStatus::SkippedDuplicate => "skipped_duplicate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "downloaded" => Some(CrawlStatus::Downloaded),
            "failed" => Some(CrawlStatus::Failed),
            "redirected" => Some(CrawlStatus::Redirected),
            "skipped_robots" => Some(CrawlStatus::SkippedRobots),
            "skipped_duplicate" => Some(CrawlStatus::SkippedDuplicate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlLog {
    pub url: String,
    pub domain: String,
    pub crawl_time: DateTime<Utc>,
    pub status: CrawlStatus,
    pub http_status: Option<u16>,
    pub content_size: Option<u64>,
    pub content_type: Option<String>,
    pub links: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub download_time_ms: u64,
    pub error_message: Option<String>,
    pub session_id: String,
}

// ───────────────────────────────────────────────────────────────────────────
// Session (C7)
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Running,
    Completing,
    Completed,
    Failed,
    Stopped,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Stopped
        )
    }

    /// Whether `next` is a legal successor of `self` per the monotonic
    /// transition order in spec.md §3: starting -> running -> completing ->
    /// {completed|failed|stopped}. `failed`/`stopped` may also be reached
    /// directly from `starting`/`running` (infrastructure failure or an
    /// immediate `stop()` before the worker pool observes `running`).
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Completing)
                | (Starting, Failed)
                | (Starting, Stopped)
                | (Running, Completing)
                | (Running, Failed)
                | (Running, Stopped)
                | (Completing, Completed)
                | (Completing, Failed)
                | (Completing, Stopped)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RenderPolicy {
    Never,
    OnSpaHeuristic,
    Always,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        RenderPolicy::OnSpaHeuristic
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_pages: usize,
    pub max_depth: usize,
    pub user_agent: String,
    pub request_timeout: std::time::Duration,
    pub restrict_to_seed_domain: bool,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub extract_text_content: bool,
    pub render_policy: RenderPolicy,
    pub include_full_content: bool,
    pub render_endpoint: Option<String>,
    pub stop_previous_sessions: bool,
    pub force: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_depth: 3,
            user_agent: "crawlstack/0.1 (+https://example.invalid/bot)".to_string(),
            request_timeout: std::time::Duration::from_secs(30),
            restrict_to_seed_domain: true,
            follow_redirects: true,
            max_redirects: 5,
            extract_text_content: true,
            render_policy: RenderPolicy::OnSpaHeuristic,
            include_full_content: true,
            render_endpoint: None,
            // Open Question in spec.md §9: the source disagreed on the
            // default across controllers. This implementation defaults to
            // `false`, matching the spec's stated resolution.
            stop_previous_sessions: false,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub depth: usize,
    pub status: CrawlStatus,
    pub title: Option<String>,
    pub word_count: Option<u32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub seed_url: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results_count: usize,
    pub failed_crawls: usize,
    pub results: Option<Vec<CrawlResult>>,
}

// ───────────────────────────────────────────────────────────────────────────
// FrontierEntry (C2)
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: usize,
    pub enqueued_at: DateTime<Utc>,
}

// ───────────────────────────────────────────────────────────────────────────
// IndexEntry (C6, derived)
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IndexFields {
    pub title: String,
    pub content: String,
    pub url: String,
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub score: f32,
}

// ───────────────────────────────────────────────────────────────────────────
// RobotsRecord (C3)
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RobotsRecord {
    pub origin: String,
    pub rules_text: String,
    pub fetched_at: DateTime<Utc>,
    pub crawl_delay: Option<std::time::Duration>,
}

// ───────────────────────────────────────────────────────────────────────────
// ApiRequestLog (C9)
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequestLog {
    pub endpoint: String,
    pub method: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: String,
    pub session_id: Option<String>,
    pub error_message: Option<String>,
}

// ───────────────────────────────────────────────────────────────────────────
// HTTP DTOs (spec.md §6)
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddSiteRequest {
    pub url: String,
    #[serde(rename = "maxPages")]
    pub max_pages: Option<usize>,
    #[serde(rename = "maxDepth")]
    pub max_depth: Option<usize>,
    #[serde(rename = "restrictToSeedDomain")]
    pub restrict_to_seed_domain: Option<bool>,
    #[serde(rename = "followRedirects")]
    pub follow_redirects: Option<bool>,
    #[serde(rename = "maxRedirects")]
    pub max_redirects: Option<u32>,
    pub force: Option<bool>,
    #[serde(rename = "extractTextContent")]
    pub extract_text_content: Option<bool>,
    #[serde(rename = "spaRenderingEnabled")]
    pub spa_rendering_enabled: Option<bool>,
    #[serde(rename = "includeFullContent")]
    pub include_full_content: Option<bool>,
    #[serde(rename = "requestTimeout")]
    pub request_timeout: Option<u64>,
    #[serde(rename = "stopPreviousSessions")]
    pub stop_previous_sessions: Option<bool>,
    #[serde(rename = "browserlessUrl")]
    pub browserless_url: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "recipientName")]
    pub recipient_name: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddSiteResponseData {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CrawlStatusQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub results: Option<bool>,
    #[serde(rename = "maxResults")]
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CrawlDetailsQuery {
    pub domain: Option<String>,
    pub url: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchMeta {
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
    pub query_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub meta: SearchMeta,
    pub hits: Vec<SearchHit>,
}

/// Response shape for `/api/search/sites` (spec.md §6): document
/// projections straight from C5, alongside the same pagination `meta` shape
/// `/api/search` uses so clients can treat both endpoints uniformly.
#[derive(Debug, Serialize)]
pub struct SiteSearchResponse {
    pub meta: SearchMeta,
    pub hits: Vec<Document>,
}

#[derive(Debug, Deserialize)]
pub struct SpaDetectRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SpaDetectResponse {
    /// The stricter, production check — the only one that gates rendering.
    pub is_spa: bool,
    /// Diagnostic-only view: the indicators that fired plus a rough
    /// confidence score. Never consulted by the production fetch path
    /// (spec.md §9 Open Questions).
    pub indicators: Vec<String>,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
pub struct SpaRenderRequest {
    pub url: String,
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SpaRenderResponse {
    pub url: String,
    pub html: String,
    pub elapsed_ms: u64,
}

/// Success envelope (spec.md §6).
#[derive(Debug, Serialize)]
pub struct ApiSuccess<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiSuccess<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

/// Error envelope (spec.md §6).
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: code,
            message: message.into(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_can_reach_every_direct_successor() {
        use SessionState::*;
        for next in [Running, Completing, Failed, Stopped] {
            assert!(Starting.can_transition_to(next));
        }
    }

    #[test]
    fn running_cannot_go_back_to_starting() {
        assert!(!SessionState::Running.can_transition_to(SessionState::Starting));
    }

    #[test]
    fn terminal_states_have_no_successors() {
        use SessionState::*;
        for terminal in [Completed, Failed, Stopped] {
            for next in [Starting, Running, Completing, Completed, Failed, Stopped] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal:?} must not transition to {next:?}"
                );
            }
        }
    }

    #[test]
    fn completing_only_reaches_the_three_terminal_states() {
        use SessionState::*;
        assert!(Completing.can_transition_to(Completed));
        assert!(Completing.can_transition_to(Failed));
        assert!(Completing.can_transition_to(Stopped));
        assert!(!Completing.can_transition_to(Running));
        assert!(!Completing.can_transition_to(Starting));
    }

    #[test]
    fn is_terminal_matches_the_three_terminal_states() {
        use SessionState::*;
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(Stopped.is_terminal());
        assert!(!Starting.is_terminal());
        assert!(!Running.is_terminal());
        assert!(!Completing.is_terminal());
    }
}
