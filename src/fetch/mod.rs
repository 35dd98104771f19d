//! C1 Fetcher: the two-tier fetch pipeline (direct HTTP, with delegated
//! render as a fallback for script-rendered pages).

pub mod spa;

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::error::FetchError;
use crate::core::types::RenderPolicy;

/// Per-request overrides layered on top of a session's defaults.
#[derive(Debug, Clone)]
pub struct FetchOpts {
    pub user_agent: String,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub render_policy: RenderPolicy,
    pub render_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub final_url: String,
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub redirected: bool,
    pub elapsed: Duration,
    pub rendered: bool,
}

/// Fetches `url`, honoring `opts.render_policy`:
/// - `Never`: direct HTTP only.
/// - `OnSpaHeuristic`: direct HTTP first; if the body looks like an
///   unrendered SPA shell (see [`spa::looks_like_spa`]), retries through the
///   render collaborator.
/// - `Always`: always delegates to the render collaborator.
///
/// Cancellation-safe: `token` is checked before each network call and the
/// in-flight request is aborted (not merely ignored) if cancelled, so a
/// stopped session never leaves an orphaned fetch holding a connection.
pub async fn fetch(
    client: &reqwest::Client,
    render: &dyn crate::collaborators::render::RenderClient,
    url: &str,
    opts: &FetchOpts,
    token: &CancellationToken,
) -> Result<FetchResult, FetchError> {
    if token.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    if matches!(opts.render_policy, RenderPolicy::Always) {
        return fetch_rendered(render, url, opts, token).await;
    }

    let direct = fetch_direct(client, url, opts, token).await?;

    if matches!(opts.render_policy, RenderPolicy::OnSpaHeuristic)
        && direct.content_type.contains("html")
        && spa::looks_like_spa(&String::from_utf8_lossy(&direct.body))
    {
        return fetch_rendered(render, url, opts, token).await;
    }

    Ok(direct)
}

/// Performs the transport attempt, following redirects by hand (the shared
/// `reqwest::Client` is built with `redirect::Policy::none()` — see
/// `core::app_state` — so `opts.max_redirects`/`opts.follow_redirects` can
/// be enforced per-session instead of fixed once at client construction).
/// Cookies set on each hop are carried forward automatically by the
/// client's cookie jar, matching spec.md §4.1's "cookies accumulated across
/// the redirect chain are applied to subsequent hops".
async fn fetch_direct(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOpts,
    token: &CancellationToken,
) -> Result<FetchResult, FetchError> {
    // `opts.timeout` is the deadline for the whole url->bytes transaction,
    // not just one hop of a redirect chain, so the per-hop attempts below
    // run under one overall deadline instead of each getting their own.
    match tokio::time::timeout(opts.timeout, fetch_direct_inner(client, url, opts, token)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(opts.timeout)),
    }
}

async fn fetch_direct_inner(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOpts,
    token: &CancellationToken,
) -> Result<FetchResult, FetchError> {
    let start = Instant::now();
    let mut current = url.to_string();
    let mut hops: u32 = 0;

    loop {
        let parsed = Url::parse(&current).map_err(|e| FetchError::Transport(e.to_string()))?;

        let request = client
            .get(parsed)
            .header(reqwest::header::USER_AGENT, &opts.user_agent);

        let response = tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            result = request.send() => result.map_err(|e| classify_reqwest_error(e, opts.timeout))?,
        };

        let status = response.status();

        if status.is_redirection() {
            if !opts.follow_redirects {
                return Err(FetchError::TooManyRedirects(0));
            }
            if hops >= opts.max_redirects {
                return Err(FetchError::TooManyRedirects(opts.max_redirects));
            }
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| FetchError::Transport("redirect with no Location header".to_string()))?;
            let next = Url::parse(&current)
                .and_then(|base| base.join(location))
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            current = next.to_string();
            hops += 1;
            continue;
        }

        if status.as_u16() >= 400 {
            return Err(FetchError::HttpError(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let redirected = hops > 0;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let body = tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            bytes = response.bytes() => bytes.map_err(|e| classify_reqwest_error(e, opts.timeout))?.to_vec(),
        };

        return Ok(FetchResult {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
            redirected,
            elapsed: start.elapsed(),
            rendered: false,
        });
    }
}

async fn fetch_rendered(
    render: &dyn crate::collaborators::render::RenderClient,
    url: &str,
    opts: &FetchOpts,
    token: &CancellationToken,
) -> Result<FetchResult, FetchError> {
    let endpoint = opts
        .render_endpoint
        .as_deref()
        .ok_or_else(|| FetchError::RenderFailed("no render endpoint configured".to_string()))?;

    let start = Instant::now();
    let html = tokio::select! {
        _ = token.cancelled() => return Err(FetchError::Cancelled),
        result = render.render(endpoint, url, opts.timeout) => result?,
    };

    Ok(FetchResult {
        final_url: url.to_string(),
        status: 200,
        content_type: "text/html; charset=utf-8".to_string(),
        body: html.into_bytes(),
        redirected: false,
        elapsed: start.elapsed(),
        rendered: true,
    })
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else if err.is_redirect() {
        FetchError::TooManyRedirects(10)
    } else if err.to_string().to_lowercase().contains("tls")
        || err.to_string().to_lowercase().contains("certificate")
    {
        FetchError::Tls(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opts_carries_render_endpoint_through() {
        let opts = FetchOpts {
            user_agent: "test".into(),
            timeout: Duration::from_secs(1),
            follow_redirects: true,
            max_redirects: 5,
            render_policy: RenderPolicy::Never,
            render_endpoint: Some("http://localhost:9".into()),
        };
        assert_eq!(opts.render_endpoint.as_deref(), Some("http://localhost:9"));
    }
}
