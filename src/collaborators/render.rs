//! The headless render service collaborator: an external process that
//! executes JavaScript and returns the settled DOM as HTML. Modeled as a
//! trait so the wire protocol stays swappable without touching `fetch`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::FetchError;

#[async_trait]
pub trait RenderClient: Send + Sync {
    async fn render(&self, endpoint: &str, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
}

#[derive(Deserialize)]
struct RenderResponse {
    html: String,
}

/// HTTP implementation: `POST {endpoint}` with `{url, timeout_ms}`,
/// expecting `{html}` back (spec.md §4.1, §6).
pub struct HttpRenderClient {
    client: reqwest::Client,
}

impl HttpRenderClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RenderClient for HttpRenderClient {
    async fn render(&self, endpoint: &str, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .post(endpoint)
            .json(&RenderRequest {
                url,
                timeout_ms: timeout.as_millis() as u64,
            })
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::RenderFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::RenderFailed(format!(
                "render service returned {}",
                response.status()
            )));
        }

        let body: RenderResponse = response
            .json()
            .await
            .map_err(|e| FetchError::RenderFailed(e.to_string()))?;

        Ok(body.html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_request_serializes_expected_shape() {
        let req = RenderRequest {
            url: "https://example.com",
            timeout_ms: 5000,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["url"], "https://example.com");
        assert_eq!(json["timeout_ms"], 5000);
    }
}
