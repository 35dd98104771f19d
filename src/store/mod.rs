//! C5 Document Store: the durable per-URL record, backed by SQLite through
//! `sqlx` (grounded on `cyrup-ai-kodegen-tools-citescrape`'s use of
//! `sqlx = { features = ["runtime-tokio", "sqlite"] }` for its own local
//! durable store). Three tables: `documents` (upsert, keyed by
//! `normalized_url`), `crawl_logs` (append-only), `api_request_logs`
//! (append-only).

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::core::error::StoreError;
use crate::core::types::{ApiRequestLog, CrawlLog, CrawlStatus, Document};

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(db_path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))
            .map_err(|e| StoreError::Backend(sqlx::Error::Configuration(Box::new(e))))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                normalized_url TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                domain TEXT NOT NULL,
                title TEXT,
                description TEXT,
                text_content TEXT,
                raw_bytes_hash TEXT NOT NULL,
                content_type TEXT NOT NULL,
                links TEXT NOT NULL,
                language TEXT,
                first_seen TEXT NOT NULL,
                last_crawled TEXT NOT NULL,
                word_count INTEGER,
                quality_score REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_domain ON documents(domain)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS crawl_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                domain TEXT NOT NULL,
                crawl_time TEXT NOT NULL,
                status TEXT NOT NULL,
                http_status INTEGER,
                content_size INTEGER,
                content_type TEXT,
                links TEXT NOT NULL,
                title TEXT,
                description TEXT,
                download_time_ms INTEGER NOT NULL,
                error_message TEXT,
                session_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_crawl_logs_url ON crawl_logs(url)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_crawl_logs_domain ON crawl_logs(domain)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_crawl_logs_session ON crawl_logs(session_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_request_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                endpoint TEXT NOT NULL,
                method TEXT NOT NULL,
                client_ip TEXT,
                user_agent TEXT,
                started_at TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                session_id TEXT,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts `document`, retrying transient write failures with a bounded
    /// exponential backoff (3 attempts, 100ms base, factor 2 — spec.md §4.5),
    /// matching the teacher's retry idiom in `tools/scrape.rs`.
    pub async fn upsert_document(&self, document: &Document) -> Result<(), StoreError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_millis(100 * (1 + 2 + 4))))
            .build();

        backoff::future::retry(policy, || async {
            self.upsert_document_once(document)
                .await
                .map_err(backoff::Error::transient)
        })
        .await
    }

    async fn upsert_document_once(&self, document: &Document) -> Result<(), StoreError> {
        let links = serde_json::to_string(&document.links).unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO documents
                (normalized_url, url, domain, title, description, text_content,
                 raw_bytes_hash, content_type, links, language, first_seen,
                 last_crawled, word_count, quality_score)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(normalized_url) DO UPDATE SET
                url = excluded.url,
                domain = excluded.domain,
                title = excluded.title,
                description = excluded.description,
                text_content = excluded.text_content,
                raw_bytes_hash = excluded.raw_bytes_hash,
                content_type = excluded.content_type,
                links = excluded.links,
                language = excluded.language,
                last_crawled = excluded.last_crawled,
                word_count = excluded.word_count,
                quality_score = excluded.quality_score
            "#,
        )
        .bind(&document.normalized_url)
        .bind(&document.url)
        .bind(&document.domain)
        .bind(&document.title)
        .bind(&document.description)
        .bind(&document.text_content)
        .bind(&document.raw_bytes_hash)
        .bind(&document.content_type)
        .bind(links)
        .bind(&document.language)
        .bind(document.first_seen.to_rfc3339())
        .bind(document.last_crawled.to_rfc3339())
        .bind(document.word_count)
        .bind(document.quality_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_document(&self, normalized_url: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT * FROM documents WHERE normalized_url = ?1")
            .bind(normalized_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_document(&r)))
    }

    pub async fn append_crawl_log(&self, log: &CrawlLog) -> Result<(), StoreError> {
        let links = serde_json::to_string(&log.links).unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO crawl_logs
                (url, domain, crawl_time, status, http_status, content_size,
                 content_type, links, title, description, download_time_ms,
                 error_message, session_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&log.url)
        .bind(&log.domain)
        .bind(log.crawl_time.to_rfc3339())
        .bind(log.status.as_str())
        .bind(log.http_status)
        .bind(log.content_size.map(|v| v as i64))
        .bind(&log.content_type)
        .bind(links)
        .bind(&log.title)
        .bind(&log.description)
        .bind(log.download_time_ms as i64)
        .bind(&log.error_message)
        .bind(&log.session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn crawl_logs_for_session(&self, session_id: &str) -> Result<Vec<CrawlLog>, StoreError> {
        let rows = sqlx::query("SELECT * FROM crawl_logs WHERE session_id = ?1 ORDER BY id ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_crawl_log).collect())
    }

    pub async fn crawl_logs_for_domain(
        &self,
        domain: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CrawlLog>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM crawl_logs WHERE domain = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(domain)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_crawl_log).collect())
    }

    /// Newest-first CrawlLogs for one URL (spec.md §4.5's
    /// `get_crawl_logs_by_url`).
    pub async fn crawl_logs_for_url(
        &self,
        url: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CrawlLog>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM crawl_logs WHERE url = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(url)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_crawl_log).collect())
    }

    pub async fn append_api_request_log(&self, log: &ApiRequestLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO api_request_logs
                (endpoint, method, client_ip, user_agent, started_at,
                 duration_ms, outcome, session_id, error_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&log.endpoint)
        .bind(&log.method)
        .bind(&log.client_ip)
        .bind(&log.user_agent)
        .bind(log.started_at.to_rfc3339())
        .bind(log.duration_ms as i64)
        .bind(&log.outcome)
        .bind(&log.session_id)
        .bind(&log.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Degraded-path search (spec.md §4.8): a plain substring match over
    /// title/text_content, used when the Index is unavailable.
    pub async fn search_documents_by_text(&self, query: &str, limit: i64) -> Result<Vec<Document>, StoreError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE title LIKE ?1 OR text_content LIKE ?1 LIMIT ?2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Total documents matching `query` (spec.md §4.5's
    /// `count_documents_matching`), used to populate pagination `meta.total`
    /// on the degraded/store-direct search paths.
    pub async fn count_documents_matching(&self, query: &str) -> Result<u64, StoreError> {
        let pattern = format!("%{query}%");
        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents WHERE title LIKE ?1 OR text_content LIKE ?1")
            .bind(pattern)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n").unwrap_or_default();
        Ok(n as u64)
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let links_json: String = row.try_get("links").unwrap_or_default();
    let links: BTreeSet<String> = serde_json::from_str(&links_json).unwrap_or_default();
    Document {
        url: row.try_get("url").unwrap_or_default(),
        normalized_url: row.try_get("normalized_url").unwrap_or_default(),
        domain: row.try_get("domain").unwrap_or_default(),
        title: row.try_get("title").ok(),
        description: row.try_get("description").ok(),
        text_content: row.try_get("text_content").ok(),
        raw_bytes_hash: row.try_get("raw_bytes_hash").unwrap_or_default(),
        content_type: row.try_get("content_type").unwrap_or_default(),
        links,
        language: row.try_get("language").ok(),
        first_seen: parse_rfc3339(row.try_get("first_seen").unwrap_or_default()),
        last_crawled: parse_rfc3339(row.try_get("last_crawled").unwrap_or_default()),
        word_count: row.try_get::<Option<i64>, _>("word_count").ok().flatten().map(|v| v as u32),
        quality_score: row.try_get("quality_score").ok(),
    }
}

fn row_to_crawl_log(row: &sqlx::sqlite::SqliteRow) -> CrawlLog {
    let links_json: String = row.try_get("links").unwrap_or_default();
    let links: Vec<String> = serde_json::from_str(&links_json).unwrap_or_default();
    let status_str: String = row.try_get("status").unwrap_or_default();
    CrawlLog {
        url: row.try_get("url").unwrap_or_default(),
        domain: row.try_get("domain").unwrap_or_default(),
        crawl_time: parse_rfc3339(row.try_get("crawl_time").unwrap_or_default()),
        status: CrawlStatus::from_str(&status_str).unwrap_or(CrawlStatus::Failed),
        http_status: row.try_get::<Option<i64>, _>("http_status").ok().flatten().map(|v| v as u16),
        content_size: row.try_get::<Option<i64>, _>("content_size").ok().flatten().map(|v| v as u64),
        content_type: row.try_get("content_type").ok(),
        links,
        title: row.try_get("title").ok(),
        description: row.try_get("description").ok(),
        download_time_ms: row.try_get::<i64, _>("download_time_ms").unwrap_or_default() as u64,
        error_message: row.try_get("error_message").ok(),
        session_id: row.try_get("session_id").unwrap_or_default(),
    }
}

fn parse_rfc3339(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    async fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = Store::open(db_path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    fn sample_document(url: &str) -> Document {
        Document {
            url: url.to_string(),
            normalized_url: url.to_string(),
            domain: "example.com".to_string(),
            title: Some("Example".to_string()),
            description: None,
            text_content: Some("hello world".to_string()),
            raw_bytes_hash: "deadbeef".to_string(),
            content_type: "text/html".to_string(),
            links: BTreeSet::new(),
            language: Some("en".to_string()),
            first_seen: Utc::now(),
            last_crawled: Utc::now(),
            word_count: Some(2),
            quality_score: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let (store, _dir) = temp_store().await;
        let doc = sample_document("https://example.com/");
        store.upsert_document(&doc).await.unwrap();
        let fetched = store.get_document("https://example.com/").await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Example"));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_normalized_url() {
        let (store, _dir) = temp_store().await;
        let mut doc = sample_document("https://example.com/");
        store.upsert_document(&doc).await.unwrap();
        doc.title = Some("Updated".to_string());
        store.upsert_document(&doc).await.unwrap();
        let fetched = store.get_document("https://example.com/").await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Updated"));
    }

    #[tokio::test]
    async fn search_by_text_matches_title_and_body() {
        let (store, _dir) = temp_store().await;
        store.upsert_document(&sample_document("https://example.com/")).await.unwrap();
        let hits = store.search_documents_by_text("hello", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn count_documents_matching_reflects_store_state() {
        let (store, _dir) = temp_store().await;
        store.upsert_document(&sample_document("https://example.com/a")).await.unwrap();
        store.upsert_document(&sample_document("https://example.com/b")).await.unwrap();
        assert_eq!(store.count_documents_matching("hello").await.unwrap(), 2);
        assert_eq!(store.count_documents_matching("nonexistent").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn crawl_logs_for_url_returns_newest_first() {
        let (store, _dir) = temp_store().await;
        let mut first = CrawlLog {
            url: "https://example.com/".to_string(),
            domain: "example.com".to_string(),
            crawl_time: Utc::now(),
            status: CrawlStatus::Downloaded,
            http_status: Some(200),
            content_size: Some(10),
            content_type: Some("text/html".to_string()),
            links: Vec::new(),
            title: Some("first".to_string()),
            description: None,
            download_time_ms: 5,
            error_message: None,
            session_id: "s1".to_string(),
        };
        store.append_crawl_log(&first).await.unwrap();
        first.title = Some("second".to_string());
        store.append_crawl_log(&first).await.unwrap();

        let logs = store.crawl_logs_for_url("https://example.com/", 10, 0).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].title.as_deref(), Some("second"));
        assert_eq!(logs[1].title.as_deref(), Some("first"));
    }
}
