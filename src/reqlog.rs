//! C9 Request Log Writer: a bounded `mpsc` channel fed by every axum handler
//! through [`ReqLogHandle::record`], drained by a single background task
//! owned by [`crate::core::AppState`]. Keeps the hot request path off the
//! SQLite write lock — handlers never await a `Store` write directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::core::types::ApiRequestLog;
use crate::store::Store;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct ReqLogHandle {
    tx: mpsc::Sender<ApiRequestLog>,
    dropped: Arc<AtomicU64>,
}

impl ReqLogHandle {
    /// Enqueues `log` for durable storage. Never blocks the caller: if the
    /// channel is full the entry is dropped and tallied, surfacing as a
    /// single synthetic "dropped N" row on the writer's next successful
    /// drain rather than applying backpressure to request handling.
    pub fn record(&self, log: ApiRequestLog) {
        if self.tx.try_send(log).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Spawns the background writer task and returns a handle to it. The task
/// runs until every `ReqLogHandle` (and the sender cloned into it) is
/// dropped, at which point the channel closes and the loop exits.
pub fn spawn(store: Arc<Store>) -> ReqLogHandle {
    let (tx, mut rx) = mpsc::channel::<ApiRequestLog>(CHANNEL_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_for_task = dropped.clone();

    tokio::spawn(async move {
        while let Some(log) = rx.recv().await {
            if let Err(err) = store.append_api_request_log(&log).await {
                tracing::warn!(endpoint = %log.endpoint, error = %err, "failed to persist api request log");
            }

            let pending = dropped_for_task.swap(0, Ordering::Relaxed);
            if pending > 0 {
                let synthetic = ApiRequestLog {
                    endpoint: "reqlog".to_string(),
                    method: "INTERNAL".to_string(),
                    client_ip: None,
                    user_agent: None,
                    started_at: Utc::now(),
                    duration_ms: 0,
                    outcome: "dropped".to_string(),
                    session_id: None,
                    error_message: Some(format!("dropped {pending} request log entries under backpressure")),
                };
                if let Err(err) = store.append_api_request_log(&synthetic).await {
                    tracing::warn!(error = %err, "failed to persist dropped-log marker");
                }
            }
        }
    });

    ReqLogHandle { tx, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (Arc<Store>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("reqlog.db");
        let store = Arc::new(Store::open(db_path.to_str().unwrap()).await.unwrap());
        (store, dir)
    }

    fn sample(endpoint: &str) -> ApiRequestLog {
        ApiRequestLog {
            endpoint: endpoint.to_string(),
            method: "GET".to_string(),
            client_ip: Some("127.0.0.1".to_string()),
            user_agent: None,
            started_at: Utc::now(),
            duration_ms: 12,
            outcome: "ok".to_string(),
            session_id: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn recorded_entries_do_not_panic_the_writer_task() {
        let (store, _dir) = temp_store().await;
        let handle = spawn(store.clone());
        handle.record(sample("/api/search"));
        handle.record(sample("/api/crawl/add-site"));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(handle.dropped.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn overflow_past_capacity_is_tallied_not_blocking() {
        let (store, _dir) = temp_store().await;
        let handle = spawn(store.clone());
        for _ in 0..(CHANNEL_CAPACITY + 50) {
            handle.record(sample("/api/search"));
        }
        // try_send never blocks regardless of how far over capacity we push.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}
