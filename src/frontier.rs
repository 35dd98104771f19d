//! C2 URL Frontier: the per-session BFS queue. Grounded on the teacher's
//! `tools::crawl::crawl_website` queue/visited-set shape, reworked from a
//! single free function into an owned, session-scoped structure so each
//! [`crate::session::manager::SessionManager`] entry gets its own frontier
//! instead of sharing mutable state across crawls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;
use url::Url;

use crate::core::types::FrontierEntry;

pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    seed_domain: String,
    max_depth: usize,
    restrict_to_seed_domain: bool,
    last_dequeued_at: HashMap<String, Instant>,
    politeness_interval: Duration,
}

impl Frontier {
    pub fn new(
        seed_url: &str,
        max_depth: usize,
        restrict_to_seed_domain: bool,
        politeness_interval: Duration,
    ) -> Self {
        let seed_domain = domain_of(seed_url).unwrap_or_default();
        let mut frontier = Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            seed_domain,
            max_depth,
            restrict_to_seed_domain,
            last_dequeued_at: HashMap::new(),
            politeness_interval,
        };
        frontier.enqueue(seed_url, 0);
        frontier
    }

    /// Normalizes, dedups, and depth-bounds `url` before queuing it.
    /// Returns `true` if it was newly queued.
    pub fn enqueue(&mut self, url: &str, depth: usize) -> bool {
        if depth > self.max_depth {
            return false;
        }
        let normalized = match normalize_url(url) {
            Some(n) => n,
            None => return false,
        };
        if self.restrict_to_seed_domain {
            match domain_of(&normalized) {
                Some(d) if d == self.seed_domain => {}
                _ => return false,
            }
        }
        if !self.seen.insert(normalized.clone()) {
            return false;
        }
        self.queue.push_back(FrontierEntry {
            url: normalized,
            depth,
            enqueued_at: Utc::now(),
        });
        true
    }

    /// Returns the first queued entry whose host cooldown has elapsed,
    /// scanning front-to-back so a single busy host can't starve the rest
    /// of the queue. Returns `None` (without busy-looping the caller) if
    /// every candidate host is still cooling down.
    pub fn try_dequeue(&mut self) -> Option<FrontierEntry> {
        let now = Instant::now();
        let position = self.queue.iter().position(|entry| {
            let host = domain_of(&entry.url).unwrap_or_default();
            match self.last_dequeued_at.get(&host) {
                Some(last) => now.duration_since(*last) >= self.politeness_interval,
                None => true,
            }
        })?;
        let entry = self.queue.remove(position)?;
        let host = domain_of(&entry.url).unwrap_or_default();
        self.last_dequeued_at.insert(host, now);
        Some(entry)
    }

    /// Raises this host's cooldown floor to at least `delay`, fed by the
    /// Robots Gate's `Crawl-delay` directive.
    pub fn apply_crawl_delay_floor(&mut self, host: &str, delay: Duration) {
        if delay > self.politeness_interval {
            // Back-date the host's last dequeue so the next attempt must
            // wait the full `delay`, not just the default interval.
            self.last_dequeued_at
                .entry(host.to_string())
                .and_modify(|last| {
                    let deficit = delay.saturating_sub(self.politeness_interval);
                    *last += deficit;
                })
                .or_insert_with(|| Instant::now() + delay - self.politeness_interval);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_len(&self) -> usize {
        self.seen.len()
    }
}

/// Strips the fragment, trims a trailing slash (except for the bare
/// origin), and lowercases the scheme+host, mirroring the teacher's
/// `normalize_url` so dedup behaves identically to the crawl it was
/// grounded on.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.set_fragment(None);
    let mut s = parsed.to_string();
    if s.ends_with('/') && parsed.path() == "/" {
        s.pop();
    }
    Some(s.to_lowercase())
}

pub fn domain_of(raw: &str) -> Option<String> {
    Url::parse(raw).ok()?.host_str().map(|h| h.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_normalized_equivalents() {
        let mut f = Frontier::new("https://example.com", 3, true, Duration::from_millis(0));
        assert!(!f.enqueue("https://EXAMPLE.com/", 1));
    }

    #[test]
    fn rejects_beyond_max_depth() {
        let mut f = Frontier::new("https://example.com", 1, true, Duration::from_millis(0));
        assert!(!f.enqueue("https://example.com/a", 2));
    }

    #[test]
    fn restricts_to_seed_domain() {
        let mut f = Frontier::new("https://example.com", 3, true, Duration::from_millis(0));
        assert!(!f.enqueue("https://other.com/page", 1));
        assert!(f.enqueue("https://example.com/page", 1));
    }

    #[test]
    fn fifo_order_preserved() {
        let mut f = Frontier::new("https://example.com", 3, true, Duration::from_millis(0));
        f.enqueue("https://example.com/a", 1);
        f.enqueue("https://example.com/b", 1);
        assert_eq!(f.try_dequeue().unwrap().url, "https://example.com");
        assert_eq!(f.try_dequeue().unwrap().url, "https://example.com/a");
        assert_eq!(f.try_dequeue().unwrap().url, "https://example.com/b");
    }

    #[test]
    fn politeness_cooldown_defers_same_host_without_starving_queue() {
        let mut f = Frontier::new("https://example.com", 3, true, Duration::from_secs(60));
        f.enqueue("https://example.com/a", 1);
        assert_eq!(f.try_dequeue().unwrap().url, "https://example.com");
        assert!(f.try_dequeue().is_none());
        assert_eq!(f.pending_len(), 1);
    }
}
