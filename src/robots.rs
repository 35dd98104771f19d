//! C3 Robots Gate: fetches and caches `robots.txt` per origin, answers
//! `allowed(url, user_agent)`, and feeds a `Crawl-delay` floor back to the
//! frontier's per-host cooldown.
//!
//! Directive parsing is `robotstxt::DefaultMatcher` (already in the pack
//! via `aichat-bot-crawly`); caching follows the teacher's
//! `moka::future::Cache` idiom used for `search_cache`/`scrape_cache` in
//! `core::app_state`.

use std::time::Duration;

use robotstxt::DefaultMatcher;

use crate::core::types::RobotsRecord;

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RobotsGate {
    client: reqwest::Client,
    cache: moka::future::Cache<String, RobotsRecord>,
}

impl RobotsGate {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(DEFAULT_TTL)
                .build(),
        }
    }

    /// Whether `user_agent` may fetch `url`. Fails open: if `robots.txt`
    /// cannot be fetched (missing, timed out, non-2xx), the URL is treated
    /// as allowed, matching spec.md §4.3 — robots.txt absence is not a
    /// crawl blocker.
    pub async fn allowed(&self, url: &str, user_agent: &str) -> bool {
        let record = match self.record_for(url).await {
            Some(r) => r,
            None => return true,
        };
        DefaultMatcher::default().one_agent_allowed_by_robots(&record.rules_text, user_agent, url)
    }

    /// The `Crawl-delay` floor for `url`'s origin, if any was declared.
    pub async fn crawl_delay(&self, url: &str) -> Option<Duration> {
        self.record_for(url).await.and_then(|r| r.crawl_delay)
    }

    async fn record_for(&self, url: &str) -> Option<RobotsRecord> {
        let origin = origin_of(url)?;
        if let Some(cached) = self.cache.get(&origin).await {
            return Some(cached);
        }

        let robots_url = format!("{origin}/robots.txt");
        let fetched = self
            .client
            .get(&robots_url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .ok()?;

        if !fetched.status().is_success() {
            return None;
        }

        let rules_text = fetched.text().await.ok()?;
        let crawl_delay = parse_crawl_delay(&rules_text);
        let record = RobotsRecord {
            origin: origin.clone(),
            rules_text,
            fetched_at: chrono::Utc::now(),
            crawl_delay,
        };
        self.cache.insert(origin, record.clone()).await;
        Some(record)
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{}://{}:{}", parsed.scheme(), host, port)),
        None => Some(format!("{}://{}", parsed.scheme(), host)),
    }
}

fn parse_crawl_delay(rules_text: &str) -> Option<Duration> {
    rules_text
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(2, ':');
            let key = parts.next()?.trim();
            if key.eq_ignore_ascii_case("crawl-delay") {
                parts.next()?.trim().parse::<u64>().ok()
            } else {
                None
            }
        })
        .next()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path_and_query() {
        assert_eq!(
            origin_of("https://example.com/a/b?x=1").unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn origin_preserves_nonstandard_port() {
        assert_eq!(
            origin_of("http://example.com:8080/x").unwrap(),
            "http://example.com:8080"
        );
    }

    #[test]
    fn parses_crawl_delay_directive() {
        let txt = "User-agent: *\nCrawl-delay: 7\nDisallow: /private\n";
        assert_eq!(parse_crawl_delay(txt), Some(Duration::from_secs(7)));
    }

    #[test]
    fn missing_crawl_delay_is_none() {
        let txt = "User-agent: *\nDisallow: /private\n";
        assert_eq!(parse_crawl_delay(txt), None);
    }
}
