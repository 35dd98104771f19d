//! Boundary validation (spec.md §6): every bound check here runs before any
//! core component sees the request. A violation is always `400
//! INVALID_REQUEST`, never a core-level error.

use crate::core::types::AddSiteRequest;

pub const MAX_PAGES_RANGE: std::ops::RangeInclusive<usize> = 1..=10_000;
pub const MAX_DEPTH_RANGE: std::ops::RangeInclusive<usize> = 1..=10;
pub const MAX_REDIRECTS_RANGE: std::ops::RangeInclusive<u32> = 0..=20;
pub const REQUEST_TIMEOUT_SECS_RANGE: std::ops::RangeInclusive<u64> = 1..=120;

pub fn validate_add_site(req: &AddSiteRequest) -> Result<(), String> {
    if url::Url::parse(&req.url).is_err() {
        return Err(format!("url is not a valid absolute URL: {}", req.url));
    }
    if let Some(v) = req.max_pages {
        if !MAX_PAGES_RANGE.contains(&v) {
            return Err(format!("maxPages must be in {MAX_PAGES_RANGE:?}, got {v}"));
        }
    }
    if let Some(v) = req.max_depth {
        if !MAX_DEPTH_RANGE.contains(&v) {
            return Err(format!("maxDepth must be in {MAX_DEPTH_RANGE:?}, got {v}"));
        }
    }
    if let Some(v) = req.max_redirects {
        if !MAX_REDIRECTS_RANGE.contains(&v) {
            return Err(format!("maxRedirects must be in {MAX_REDIRECTS_RANGE:?}, got {v}"));
        }
    }
    if let Some(v) = req.request_timeout {
        if !REQUEST_TIMEOUT_SECS_RANGE.contains(&v) {
            return Err(format!(
                "requestTimeout must be in {REQUEST_TIMEOUT_SECS_RANGE:?} seconds, got {v}"
            ));
        }
    }
    if let Some(email) = &req.email {
        if !email.contains('@') || !email.contains('.') {
            return Err(format!("email is not well-formed: {email}"));
        }
    }
    Ok(())
}

pub fn validate_search_bounds(page: Option<usize>, limit: Option<usize>) -> Result<(), String> {
    if let Some(p) = page {
        if !(1..=crate::search::MAX_PAGE).contains(&p) {
            return Err(format!("page must be in 1..={}, got {p}", crate::search::MAX_PAGE));
        }
    }
    if let Some(l) = limit {
        if !(1..=crate::search::MAX_LIMIT).contains(&l) {
            return Err(format!("limit must be in 1..={}, got {l}", crate::search::MAX_LIMIT));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> AddSiteRequest {
        AddSiteRequest {
            url: "https://example.com".to_string(),
            max_pages: None,
            max_depth: None,
            restrict_to_seed_domain: None,
            follow_redirects: None,
            max_redirects: None,
            force: None,
            extract_text_content: None,
            spa_rendering_enabled: None,
            include_full_content: None,
            request_timeout: None,
            stop_previous_sessions: None,
            browserless_url: None,
            email: None,
            recipient_name: None,
            language: None,
        }
    }

    #[test]
    fn rejects_malformed_url() {
        let mut req = base_request();
        req.url = "not-a-url".to_string();
        assert!(validate_add_site(&req).is_err());
    }

    #[test]
    fn rejects_max_pages_out_of_range() {
        let mut req = base_request();
        req.max_pages = Some(20_000);
        assert!(validate_add_site(&req).is_err());
    }

    #[test]
    fn rejects_malformed_email() {
        let mut req = base_request();
        req.email = Some("not-an-email".to_string());
        assert!(validate_add_site(&req).is_err());
    }

    #[test]
    fn accepts_well_formed_request() {
        let req = base_request();
        assert!(validate_add_site(&req).is_ok());
    }
}
