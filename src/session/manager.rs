//! C7 Crawl Session Manager: owns live sessions, the global concurrent-
//! session cap, worker pools, and exactly-once completion callbacks.
//!
//! The session table is a `DashMap<SessionId, Arc<SessionHandle>>`
//! (enrichment: `dashmap` is already a dependency of
//! `cyrup-ai-kodegen-tools-citescrape`, and is the idiomatic concurrent map
//! for this shape — status/results lookups must not contend with the
//! manager's own start/stop path). Each session owns a `tokio::task::JoinSet`
//! of worker tasks plus its own `Frontier`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collaborators::render::RenderClient;
use crate::core::error::{FetchError, SessionError};
use crate::core::types::{
    CrawlLog, CrawlResult, CrawlStatus, Document, SessionConfig, SessionState,
    SessionStatus,
};
use crate::fetch::{self, FetchOpts};
use crate::frontier::Frontier;
use crate::index::Index;
use crate::robots::RobotsGate;
use crate::store::Store;

/// Default worker pool size per session (spec.md §5: configurable 4-16,
/// default 8).
const DEFAULT_WORKER_POOL_SIZE: usize = 8;

/// spec.md scenario S3: a 429 from the session-limit cap carries
/// `Retry-After: 30`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Dependencies a session needs to run its crawl loop, bundled once by
/// `AppState` rather than threaded field-by-field.
#[derive(Clone)]
pub struct SessionDeps {
    pub http_client: reqwest::Client,
    pub render: Arc<dyn RenderClient>,
    pub robots: Arc<RobotsGate>,
    pub store: Arc<Store>,
    pub index: Arc<Index>,
    pub politeness_interval: Duration,
    /// Caps outbound fetch concurrency across every session combined
    /// (`core::app_state::AppState::outbound_limit`); acquired around each
    /// C1 transaction so one greedy crawl can't starve the process's
    /// socket budget.
    pub outbound_limit: Arc<Semaphore>,
}

pub struct CompletionEvent {
    pub session_id: String,
    pub results: Vec<CrawlResult>,
    pub state: SessionState,
}

pub type CompletionCallback = Arc<dyn Fn(CompletionEvent) + Send + Sync>;

struct SessionHandle {
    session_id: String,
    seed_url: String,
    config: SessionConfig,
    state: StdMutex<SessionState>,
    started_at: chrono::DateTime<Utc>,
    finished_at: StdMutex<Option<chrono::DateTime<Utc>>>,
    results: StdMutex<Vec<CrawlResult>>,
    failed_crawls: AtomicUsize,
    // Successful fetches only (downloaded|redirected); informational.
    downloaded_count: AtomicUsize,
    // Reserved slots against `config.max_pages`: incremented when an entry
    // is dequeued (before the fetch even starts) and released back in
    // `apply_outcome` if it turns out not to be a downloaded/redirected
    // success. This is the quantity the page-cap gate actually checks, so
    // `max_pages` bounds the number of in-flight-or-successful fetches
    // exactly, not just the already-completed ones (spec.md §4.7/§8
    // invariant 6).
    reserved_count: AtomicUsize,
    cancel: CancellationToken,
    frontier: AsyncMutex<Frontier>,
    // Held for the session's lifetime; releases the global cap slot on drop.
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl SessionHandle {
    fn set_state(&self, next: SessionState) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.can_transition_to(next) {
            *state = next;
            true
        } else {
            false
        }
    }

    fn status(&self, include_results: bool, max_results: Option<usize>) -> SessionStatus {
        let results = self.results.lock().unwrap();
        SessionStatus {
            session_id: self.session_id.clone(),
            seed_url: self.seed_url.clone(),
            state: *self.state.lock().unwrap(),
            started_at: self.started_at,
            finished_at: *self.finished_at.lock().unwrap(),
            results_count: results.len(),
            failed_crawls: self.failed_crawls.load(Ordering::Relaxed),
            results: include_results.then(|| {
                let limit = max_results.unwrap_or(results.len());
                results.iter().take(limit).cloned().collect()
            }),
        }
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<SessionHandle>>,
    global_cap: Arc<Semaphore>,
    grace: Duration,
}

impl SessionManager {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            global_cap: Arc::new(Semaphore::new(max_concurrent_sessions.max(1))),
            grace: Duration::from_secs(300),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Starts a new crawl session. Fails fast with `SessionError::Limit` if
    /// the global concurrent-session cap is already saturated — this never
    /// queues (spec.md §4.7: `try_acquire_owned`, not a blocking acquire).
    pub fn start(
        self: &Arc<Self>,
        seed_url: String,
        config: SessionConfig,
        deps: SessionDeps,
        completion_cb: Option<CompletionCallback>,
    ) -> Result<String, SessionError> {
        let permit = self
            .global_cap
            .clone()
            .try_acquire_owned()
            .map_err(|_| SessionError::Limit { retry_after_secs: DEFAULT_RETRY_AFTER_SECS })?;

        let session_id = Uuid::new_v4().to_string();
        let frontier = Frontier::new(
            &seed_url,
            config.max_depth,
            config.restrict_to_seed_domain,
            deps.politeness_interval,
        );

        let handle = Arc::new(SessionHandle {
            session_id: session_id.clone(),
            seed_url: seed_url.clone(),
            config,
            state: StdMutex::new(SessionState::Starting),
            started_at: Utc::now(),
            finished_at: StdMutex::new(None),
            results: StdMutex::new(Vec::new()),
            failed_crawls: AtomicUsize::new(0),
            downloaded_count: AtomicUsize::new(0),
            reserved_count: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            frontier: AsyncMutex::new(frontier),
            _permit: permit,
        });

        self.sessions.insert(session_id.clone(), handle.clone());

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_session(handle, deps, completion_cb).await;
        });

        Ok(session_id)
    }

    /// Signals cooperative cancellation: drains the frontier, aborts
    /// in-flight fetches for the session, and lets workers exit their loop.
    pub fn stop(&self, session_id: &str) -> Result<(), SessionError> {
        let handle = self.sessions.get(session_id).ok_or(SessionError::NotFound)?;
        handle.cancel.cancel();
        Ok(())
    }

    pub fn status(
        &self,
        session_id: &str,
        include_results: bool,
        max_results: Option<usize>,
    ) -> Result<SessionStatus, SessionError> {
        let handle = self.sessions.get(session_id).ok_or(SessionError::NotFound)?;
        Ok(handle.status(include_results, max_results))
    }

    pub fn active_session_ids(&self) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().state.lock().unwrap().is_terminal())
            .map(|entry| entry.key().clone())
            .collect()
    }

    async fn run_session(
        self: Arc<Self>,
        handle: Arc<SessionHandle>,
        deps: SessionDeps,
        completion_cb: Option<CompletionCallback>,
    ) {
        handle.set_state(SessionState::Running);

        let worker_permits = Arc::new(Semaphore::new(DEFAULT_WORKER_POOL_SIZE));
        let mut tasks: JoinSet<WorkerOutcome> = JoinSet::new();

        loop {
            let reserved = handle.reserved_count.load(Ordering::Relaxed);
            if reserved >= handle.config.max_pages || handle.cancel.is_cancelled() {
                break;
            }

            let next_entry = { handle.frontier.lock().await.try_dequeue() };
            match next_entry {
                Some(entry) => {
                    handle.reserved_count.fetch_add(1, Ordering::Relaxed);
                    let permit = worker_permits.clone().acquire_owned().await.unwrap();
                    let deps = deps.clone();
                    let session_id = handle.session_id.clone();
                    let opts = fetch_opts_for(&handle.config);
                    let token = handle.cancel.child_token();
                    let force = handle.config.force;
                    let extract_text = handle.config.extract_text_content;
                    let include_full_content = handle.config.include_full_content;

                    tasks.spawn(async move {
                        let _permit = permit;
                        process_one(
                            &deps, &session_id, &entry.url, entry.depth, &opts, &token, force,
                            extract_text, include_full_content,
                        )
                        .await
                    });
                }
                None => {
                    if handle.frontier.lock().await.is_empty() && tasks.is_empty() {
                        break;
                    }
                    tokio::select! {
                        _ = handle.cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(25)) => {},
                        joined = tasks.join_next(), if !tasks.is_empty() => {
                            if let Some(Ok(outcome)) = joined {
                                apply_outcome(&handle, outcome).await;
                            }
                            continue;
                        }
                    }
                }
            }

            while let Some(joined) = tasks.try_join_next() {
                if let Ok(outcome) = joined {
                    apply_outcome(&handle, outcome).await;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Ok(outcome) = joined {
                apply_outcome(&handle, outcome).await;
            }
        }

        let final_state = if handle.cancel.is_cancelled() {
            SessionState::Stopped
        } else {
            SessionState::Completed
        };
        handle.set_state(SessionState::Completing);
        handle.set_state(final_state);
        *handle.finished_at.lock().unwrap() = Some(Utc::now());

        if let Some(cb) = completion_cb {
            let event = CompletionEvent {
                session_id: handle.session_id.clone(),
                results: handle.results.lock().unwrap().clone(),
                state: final_state,
            };
            // Invoked from a dedicated task, never from worker context, so
            // a slow callback can't hold up the crawl loop that's already
            // finished (spec.md §9).
            tokio::spawn(async move { cb(event) });
        }

        let manager = self.clone();
        let session_id = handle.session_id.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            manager.sessions.remove(&session_id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UnreachableRender;

    #[async_trait]
    impl RenderClient for UnreachableRender {
        async fn render(&self, _endpoint: &str, _url: &str, _timeout: Duration) -> Result<String, crate::core::error::FetchError> {
            Err(crate::core::error::FetchError::RenderFailed("no render service in test".into()))
        }
    }

    /// Seed/deps that never reach the network: the seed resolves but
    /// nothing is listening, so every fetch attempt fails fast with
    /// `transport`/`cancelled` rather than hanging or needing real network
    /// access. Good enough to exercise the manager's own bookkeeping
    /// (cap, state machine, stop) without asserting on crawl outcomes.
    async fn test_deps() -> (SessionDeps, tempfile::TempDir, tempfile::TempDir) {
        let store_dir = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let index = Index::open(index_dir.path().to_str().unwrap()).unwrap();
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let deps = SessionDeps {
            http_client: client.clone(),
            render: Arc::new(UnreachableRender),
            robots: Arc::new(RobotsGate::new(client)),
            store: Arc::new(store),
            index: Arc::new(index),
            politeness_interval: Duration::from_millis(1),
            outbound_limit: Arc::new(Semaphore::new(8)),
        };
        (deps, store_dir, index_dir)
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            max_pages: 1,
            max_depth: 1,
            request_timeout: Duration::from_millis(200),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn start_fails_with_limit_once_cap_is_saturated() {
        let manager = Arc::new(SessionManager::new(1));
        let (deps, _store_dir, _index_dir) = test_deps().await;

        let first = manager.start(
            "http://127.0.0.1:1/".to_string(),
            fast_config(),
            deps.clone(),
            None,
        );
        assert!(first.is_ok());

        let second = manager.start("http://127.0.0.1:1/".to_string(), fast_config(), deps, None);
        assert!(matches!(second, Err(SessionError::Limit { .. })));
    }

    #[tokio::test]
    async fn status_of_unknown_session_is_not_found() {
        let manager = Arc::new(SessionManager::new(4));
        assert!(matches!(
            manager.status("does-not-exist", false, None),
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_drives_session_to_a_terminal_state() {
        let manager = Arc::new(SessionManager::new(4));
        let (deps, _store_dir, _index_dir) = test_deps().await;

        let session_id = manager
            .start("http://127.0.0.1:1/".to_string(), fast_config(), deps, None)
            .unwrap();

        assert!(manager.stop(&session_id).is_ok());
        // idempotent: calling stop again on an already-cancelled session
        // is still Ok, never a second error.
        assert!(manager.stop(&session_id).is_ok());

        let terminal = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = manager.status(&session_id, false, None).unwrap();
                if status.state.is_terminal() {
                    return status.state;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session did not reach a terminal state within the timeout");

        assert_eq!(terminal, SessionState::Stopped);
        assert!(!manager.active_session_ids().contains(&session_id));
    }
}

fn fetch_opts_for(config: &SessionConfig) -> FetchOpts {
    FetchOpts {
        user_agent: config.user_agent.clone(),
        timeout: config.request_timeout,
        follow_redirects: config.follow_redirects,
        max_redirects: config.max_redirects,
        render_policy: config.render_policy.clone(),
        render_endpoint: config.render_endpoint.clone(),
    }
}

struct WorkerOutcome {
    log: CrawlLog,
    document: Option<Document>,
    new_links: Vec<String>,
    depth: usize,
    crawl_delay: Option<(String, Duration)>,
}

async fn process_one(
    deps: &SessionDeps,
    session_id: &str,
    url: &str,
    depth: usize,
    opts: &FetchOpts,
    token: &CancellationToken,
    force: bool,
    extract_text: bool,
    include_full_content: bool,
) -> WorkerOutcome {
    let domain = crate::frontier::domain_of(url).unwrap_or_default();
    let start = std::time::Instant::now();
    let crawl_delay = deps.robots.crawl_delay(url).await.map(|d| (domain.clone(), d));

    if !deps.robots.allowed(url, &opts.user_agent).await {
        let log = CrawlLog {
            url: url.to_string(),
            domain,
            crawl_time: Utc::now(),
            status: CrawlStatus::SkippedRobots,
            http_status: None,
            content_size: None,
            content_type: None,
            links: Vec::new(),
            title: None,
            description: None,
            download_time_ms: start.elapsed().as_millis() as u64,
            error_message: Some("disallowed by robots.txt".to_string()),
            session_id: session_id.to_string(),
        };
        let _ = deps.store.append_crawl_log(&log).await;
        return WorkerOutcome {
            log,
            document: None,
            new_links: Vec::new(),
            depth,
            crawl_delay,
        };
    }

    let outbound_permit = tokio::select! {
        _ = token.cancelled() => None,
        permit = deps.outbound_limit.acquire() => permit.ok(),
    };
    let fetched = match outbound_permit {
        Some(_permit) => fetch::fetch(&deps.http_client, deps.render.as_ref(), url, opts, token).await,
        None => Err(FetchError::Cancelled),
    };

    let fetched = match fetched {
        Ok(f) => f,
        Err(e) => {
            let log = CrawlLog {
                url: url.to_string(),
                domain,
                crawl_time: Utc::now(),
                status: CrawlStatus::Failed,
                http_status: None,
                content_size: None,
                content_type: None,
                links: Vec::new(),
                title: None,
                description: None,
                download_time_ms: start.elapsed().as_millis() as u64,
                error_message: Some(e.to_string()),
                session_id: session_id.to_string(),
            };
            let _ = deps.store.append_crawl_log(&log).await;
            return WorkerOutcome {
                log,
                document: None,
                new_links: Vec::new(),
                depth,
                crawl_delay,
            };
        }
    };

    let extracted = if extract_text {
        crate::extract::extract(&fetched.final_url, &fetched.content_type, &fetched.body)
    } else {
        crate::extract::extract(&fetched.final_url, "application/octet-stream", &fetched.body)
    };

    if !force {
        if let Ok(Some(prior)) = deps.store.get_document(&fetched.final_url).await {
            if prior.raw_bytes_hash == extracted.content_hash {
                let log = CrawlLog {
                    url: url.to_string(),
                    domain,
                    crawl_time: Utc::now(),
                    status: CrawlStatus::SkippedDuplicate,
                    http_status: Some(fetched.status),
                    content_size: Some(fetched.body.len() as u64),
                    content_type: Some(fetched.content_type.clone()),
                    links: extracted.links.iter().cloned().collect(),
                    title: extracted.title.clone(),
                    description: extracted.description.clone(),
                    download_time_ms: start.elapsed().as_millis() as u64,
                    error_message: None,
                    session_id: session_id.to_string(),
                };
                let _ = deps.store.append_crawl_log(&log).await;
                return WorkerOutcome {
                    log,
                    document: None,
                    new_links: extracted.links.into_iter().collect(),
                    depth,
                    crawl_delay,
                };
            }
        }
    }

    let now = Utc::now();
    let document = Document {
        url: url.to_string(),
        normalized_url: fetched.final_url.clone(),
        domain: crate::frontier::domain_of(&fetched.final_url).unwrap_or_default(),
        title: extracted.title.clone(),
        description: extracted.description.clone(),
        text_content: Some(extracted.text.clone()),
        raw_bytes_hash: extracted.content_hash.clone(),
        content_type: fetched.content_type.clone(),
        links: extracted.links.clone(),
        language: extracted.language.clone(),
        first_seen: now,
        last_crawled: now,
        word_count: Some(extracted.word_count),
        quality_score: None,
    };

    let status = if fetched.redirected {
        CrawlStatus::Redirected
    } else {
        CrawlStatus::Downloaded
    };

    let store_err = deps.store.upsert_document(&document).await.err();
    let index_err = if store_err.is_none() {
        // spec.md §4.7: `include_full_content` governs whether the full
        // extracted text is indexed or only title+description.
        let content = if include_full_content {
            document.text_content.clone().unwrap_or_default()
        } else {
            document.description.clone().unwrap_or_default()
        };
        let index_fields = crate::core::types::IndexFields {
            title: document.title.clone().unwrap_or_default(),
            content,
            url: document.url.clone(),
            domain: document.domain.clone(),
        };
        deps.index.upsert(&document.normalized_url, &index_fields).err()
    } else {
        None
    };
    if let Some(e) = &index_err {
        // Store write already succeeded; the index write is not retried
        // inline (spec.md §4.6) — `Index ⊆ Store` tolerates a later
        // reconciliation rebuild, but this failure is still logged against
        // the CrawlLog, not just traced.
        tracing::warn!(url = %document.url, error = %e, "index upsert failed; document is still durable in the store");
    }

    let log_status = if let Some(err) = &store_err {
        tracing::warn!(url = %document.url, error = %err, "store write failed after retries");
        CrawlStatus::Failed
    } else {
        status
    };

    let log = CrawlLog {
        url: url.to_string(),
        domain: document.domain.clone(),
        crawl_time: now,
        status: log_status,
        http_status: Some(fetched.status),
        content_size: Some(fetched.body.len() as u64),
        content_type: Some(fetched.content_type.clone()),
        links: extracted.links.iter().cloned().collect(),
        title: extracted.title.clone(),
        description: extracted.description.clone(),
        download_time_ms: start.elapsed().as_millis() as u64,
        error_message: store_err
            .as_ref()
            .map(|e| e.to_string())
            .or_else(|| index_err.as_ref().map(|e| format!("index write failed: {e}"))),
        session_id: session_id.to_string(),
    };
    let _ = deps.store.append_crawl_log(&log).await;

    WorkerOutcome {
        log,
        document: Some(document),
        new_links: extracted.links.into_iter().collect(),
        depth,
        crawl_delay,
    }
}

async fn apply_outcome(handle: &Arc<SessionHandle>, outcome: WorkerOutcome) {
    let download_failed = matches!(outcome.log.status, CrawlStatus::Failed);
    if download_failed {
        handle.failed_crawls.fetch_add(1, Ordering::Relaxed);
    }
    if matches!(outcome.log.status, CrawlStatus::Downloaded | CrawlStatus::Redirected) {
        handle.downloaded_count.fetch_add(1, Ordering::Relaxed);
    } else {
        // Not a successful fetch: release the page-budget slot reserved at
        // dequeue time so another URL can claim it.
        handle.reserved_count.fetch_sub(1, Ordering::Relaxed);
    }

    handle.results.lock().unwrap().push(CrawlResult {
        url: outcome.log.url.clone(),
        depth: outcome.depth,
        status: outcome.log.status,
        title: outcome.log.title.clone(),
        word_count: outcome.document.as_ref().and_then(|d| d.word_count),
        error: outcome.log.error_message.clone(),
    });

    if !handle.cancel.is_cancelled() {
        let mut frontier = handle.frontier.lock().await;
        if let Some((host, delay)) = &outcome.crawl_delay {
            frontier.apply_crawl_delay_floor(host, *delay);
        }
        if !download_failed {
            for link in &outcome.new_links {
                frontier.enqueue(link, outcome.depth + 1);
            }
        }
    }
}
