//! C8 Search Service: grounded directly on the teacher's
//! `tools::search::SearchService` trait shape (an `async_trait` taking the
//! query plus structured overrides and returning a `Result<Vec<_>>`),
//! reworked around this crate's own C6/C5 pair instead of the teacher's
//! web-search backends.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::core::error::{ErrorKind, IndexError};
use crate::core::types::{SearchHit, SearchMeta, SearchResponse};
use crate::index::Index;
use crate::store::Store;

pub const MAX_PAGE: usize = 1000;
pub const MAX_LIMIT: usize = 100;
const DEFAULT_PAGE: usize = 1;
const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid search parameters: {0}")]
    Validation(String),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(
        &self,
        query: &str,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<SearchResponse, SearchError>;
}

/// Production implementation: queries C6 (Index) and, on a non-fatal
/// backend error, falls back to C5's substring search (spec.md §4.8). An
/// `unknown` index (never opened / empty) is treated as an empty, healthy
/// result rather than a degraded one.
pub struct IndexBackedSearch {
    index: Arc<Index>,
    store: Arc<Store>,
}

impl IndexBackedSearch {
    pub fn new(index: Arc<Index>, store: Arc<Store>) -> Self {
        Self { index, store }
    }
}

#[async_trait]
impl SearchService for IndexBackedSearch {
    async fn search(
        &self,
        query: &str,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<SearchResponse, SearchError> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_PAGE).contains(&page) {
            return Err(SearchError::Validation(format!(
                "page must be in 1..={MAX_PAGE}, got {page}"
            )));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(SearchError::Validation(format!(
                "limit must be in 1..={MAX_LIMIT}, got {limit}"
            )));
        }

        let started = Instant::now();
        let index = self.index.clone();
        let query_owned = query.to_string();
        let offset = (page - 1) * limit;
        // tantivy's reader/searcher are blocking; run off the async executor.
        let queried =
            tokio::task::spawn_blocking(move || index.query_page(&query_owned, offset, limit))
                .await
                .map_err(|e| SearchError::Validation(format!("search task panicked: {e}")))?;

        let (hits, total, degraded) = match queried {
            Ok((hits, total)) => (hits, total, None),
            Err(IndexError::Unknown) => (Vec::new(), 0, None),
            Err(_backend_err) => {
                let fallback: Vec<SearchHit> = self
                    .store
                    .search_documents_by_text(query, (offset + limit) as i64)
                    .await
                    .map(|docs| docs.into_iter().map(document_to_hit).collect())
                    .unwrap_or_default();
                let total = self.store.count_documents_matching(query).await.unwrap_or(0);
                let page_hits: Vec<SearchHit> = fallback.into_iter().skip(offset).take(limit).collect();
                (page_hits, total, Some(true))
            }
        };

        Ok(SearchResponse {
            meta: SearchMeta {
                total,
                page,
                page_size: limit,
                query_time_ms: started.elapsed().as_millis() as u64,
                degraded,
            },
            hits,
        })
    }
}

fn document_to_hit(doc: crate::core::types::Document) -> SearchHit {
    let snippet = doc
        .text_content
        .as_deref()
        .map(|s| truncate_at_word_boundary(s, 200))
        .or_else(|| doc.description.as_deref().map(|s| truncate_at_word_boundary(s, 300)))
        .unwrap_or_default();
    SearchHit {
        url: doc.url,
        title: doc.title.unwrap_or_default(),
        snippet,
        score: 0.0,
    }
}

fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(idx) => format!("{}…", &truncated[..idx]),
        None => format!("{truncated}…"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IndexFields;

    async fn fixtures() -> (Arc<Index>, Arc<Store>, tempfile::TempDir, tempfile::TempDir) {
        let index_dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let index = Arc::new(Index::open(index_dir.path().to_str().unwrap()).unwrap());
        let db_path = store_dir.path().join("search.db");
        let store = Arc::new(Store::open(db_path.to_str().unwrap()).await.unwrap());
        (index, store, index_dir, store_dir)
    }

    #[tokio::test]
    async fn rejects_limit_above_bound() {
        let (index, store, _a, _b) = fixtures().await;
        let svc = IndexBackedSearch::new(index, store);
        let result = svc.search("rust", Some(1), Some(101)).await;
        assert!(matches!(result, Err(SearchError::Validation(_))));
    }

    #[tokio::test]
    async fn rejects_page_above_bound() {
        let (index, store, _a, _b) = fixtures().await;
        let svc = IndexBackedSearch::new(index, store);
        let result = svc.search("rust", Some(1001), Some(10)).await;
        assert!(matches!(result, Err(SearchError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_index_returns_empty_not_degraded() {
        let (index, store, _a, _b) = fixtures().await;
        let svc = IndexBackedSearch::new(index, store);
        let resp = svc.search("nothing-indexed", None, None).await.unwrap();
        assert_eq!(resp.meta.total, 0);
        assert_eq!(resp.meta.degraded, None);
    }

    #[tokio::test]
    async fn paginates_over_indexed_hits() {
        let (index, store, _a, _b) = fixtures().await;
        for i in 0..15 {
            index
                .upsert(
                    &format!("https://example.com/{i}"),
                    &IndexFields {
                        title: "foo title".to_string(),
                        content: "foo body content".to_string(),
                        url: format!("https://example.com/{i}"),
                        domain: "example.com".to_string(),
                    },
                )
                .unwrap();
        }
        let svc = IndexBackedSearch::new(index, store);
        let page2 = svc.search("foo", Some(2), Some(10)).await.unwrap();
        assert_eq!(page2.meta.total, 15);
        assert_eq!(page2.hits.len(), 5);
        let page3 = svc.search("foo", Some(3), Some(10)).await.unwrap();
        assert_eq!(page3.meta.total, 15);
        assert!(page3.hits.is_empty());
    }
}
