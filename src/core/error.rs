//! Error taxonomy shared by every component (C1-C9).
//!
//! `ErrorKind` names the *kind* of failure, not a type hierarchy per
//! component — this mirrors how the core reasons about disposition (retry?
//! log-and-continue? terminate the session? surface 5xx?) independently of
//! which component raised it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    Tls,
    Timeout,
    HttpError,
    TooManyRedirects,
    RenderFailed,
    RobotsDenied,
    Duplicate,
    IndexUnknown,
    IndexBackend,
    StoreBackend,
    SessionLimit,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind maps to when it crosses the API boundary.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::SessionLimit => 429,
            ErrorKind::StoreBackend | ErrorKind::Internal => 500,
            // Everything else is recorded internally and never returned
            // directly as a top-level response status; callers that do
            // surface it (e.g. /api/spa/render) use RENDER_FAILED -> 502.
            ErrorKind::RenderFailed => 502,
            _ => 500,
        }
    }

    /// The `error` CODE string used in the error envelope (spec.md §6).
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "INVALID_REQUEST",
            ErrorKind::SessionLimit => "TOO_MANY_REQUESTS",
            ErrorKind::RenderFailed => "RENDER_FAILED",
            ErrorKind::StoreBackend | ErrorKind::Internal => "INTERNAL_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

/// Error type returned by fetch transactions (C1).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("http error: status {0}")]
    HttpError(u16),
    #[error("too many redirects (max {0})")]
    TooManyRedirects(u32),
    #[error("render delegation failed: {0}")]
    RenderFailed(String),
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport(_) => ErrorKind::Transport,
            FetchError::Tls(_) => ErrorKind::Tls,
            FetchError::Timeout(_) => ErrorKind::Timeout,
            FetchError::HttpError(_) => ErrorKind::HttpError,
            FetchError::TooManyRedirects(_) => ErrorKind::TooManyRedirects,
            FetchError::RenderFailed(_) => ErrorKind::RenderFailed,
            FetchError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Error type returned by the Document Store (C5).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StoreBackend
    }
}

/// Error type returned by the Index (C6).
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index not initialized")]
    Unknown,
    #[error("index backend error: {0}")]
    Backend(String),
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Unknown => ErrorKind::IndexUnknown,
            IndexError::Backend(_) => ErrorKind::IndexBackend,
        }
    }
}

/// Error type returned by the Crawl Session Manager (C7).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("concurrent session limit reached, retry after {retry_after_secs}s")]
    Limit { retry_after_secs: u64 },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound => ErrorKind::Internal,
            SessionError::Limit { .. } => ErrorKind::SessionLimit,
            SessionError::InvalidConfig(_) => ErrorKind::Validation,
        }
    }
}
