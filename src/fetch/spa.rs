//! Heuristic detection of unrendered single-page-app shells.
//!
//! Two views are exposed deliberately (spec.md §9 Open Questions): a
//! strict boolean used to gate the production fetch path
//! ([`looks_like_spa`]), and a diagnostic breakdown used only by
//! `/api/spa/detect` ([`diagnose`]). The diagnostic view must never be
//! substituted into the gating decision — its indicator list is informative,
//! not authoritative.

const SPA_ROOT_IDS: &[&str] = &["root", "app", "__next", "___gatsby", "svelte-app"];
const FRAMEWORK_MARKERS: &[&str] = &[
    "ng-version",
    "data-reactroot",
    "data-server-rendered",
    "<app-root",
    "__nuxt",
    "___gatsby",
    "__next_data__",
];
/// spec.md §4.1's suggested default: more than this many external `<script>`
/// tags, combined with a small body, is treated as a rendering signal.
const EXTERNAL_SCRIPT_THRESHOLD: usize = 5;
/// spec.md §4.1's suggested default body-size ceiling for the script-count
/// heuristic.
const SMALL_BODY_BYTES: usize = 10_000;

/// Production check: a single true/false gate consulted by [`super::fetch`]
/// to decide whether to retry through the render collaborator. Implements
/// all three clauses of spec.md §4.1's SPA heuristic — framework root
/// markers, many external scripts in a small body, or an empty `<body>`
/// once whitespace/`<script>`/`<noscript>` are stripped — any one firing is
/// sufficient (false positives waste a render; false negatives miss
/// content).
pub fn looks_like_spa(html: &str) -> bool {
    let lower = html.to_lowercase();
    if FRAMEWORK_MARKERS.iter().any(|m| lower.contains(&m.to_lowercase())) {
        return true;
    }
    if count_external_scripts(html) > EXTERNAL_SCRIPT_THRESHOLD && html.len() < SMALL_BODY_BYTES {
        return true;
    }
    body_is_effectively_empty(html)
}

/// Diagnostic breakdown for `/api/spa/detect`: every indicator that fired,
/// plus a rough confidence score. Not consulted by the production path.
pub fn diagnose(html: &str) -> (Vec<String>, f32) {
    let mut indicators = Vec::new();
    let word_count = visible_text_word_count(html);
    let lower = html.to_lowercase();

    if word_count < 50 {
        indicators.push(format!("low visible word count ({word_count})"));
    }
    if has_empty_root_container(html) {
        indicators.push("empty app-root container".to_string());
    }
    if body_is_effectively_empty(html) {
        indicators.push("empty <body> after stripping script/noscript".to_string());
    }
    let script_count = count_external_scripts(html);
    if script_count > EXTERNAL_SCRIPT_THRESHOLD && html.len() < SMALL_BODY_BYTES {
        indicators.push(format!(
            "{script_count} external scripts in a {}-byte body",
            html.len()
        ));
    }
    for marker in FRAMEWORK_MARKERS {
        if lower.contains(&marker.to_lowercase()) {
            indicators.push(format!("framework marker `{marker}` present"));
        }
    }
    if html.contains("<noscript>") && lower.contains("enable javascript") {
        indicators.push("noscript javascript warning".to_string());
    }

    let confidence = (indicators.len() as f32 / 4.0).min(1.0);
    (indicators, confidence)
}

fn count_external_scripts(html: &str) -> usize {
    let doc = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("script[src]").unwrap();
    doc.select(&selector).count()
}

/// True once the `<body>`'s text is empty after stripping whitespace and
/// any `<script>`/`<noscript>` node content (spec.md §4.1, third clause).
fn body_is_effectively_empty(html: &str) -> bool {
    let doc = scraper::Html::parse_document(html);
    let body_selector = scraper::Selector::parse("body").unwrap();
    let Some(body) = doc.select(&body_selector).next() else {
        return false;
    };
    let mut text_parts = Vec::new();
    collect_visible_text(&body, &mut text_parts);
    text_parts.join(" ").trim().is_empty()
}

fn collect_visible_text(element: &scraper::ElementRef, text_parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = scraper::ElementRef::wrap(child) {
            if matches!(child_element.value().name(), "script" | "noscript") {
                continue;
            }
            collect_visible_text(&child_element, text_parts);
        } else if let Some(text_node) = child.value().as_text() {
            text_parts.push(text_node.to_string());
        }
    }
}

fn has_empty_root_container(html: &str) -> bool {
    let doc = scraper::Html::parse_document(html);
    for id in SPA_ROOT_IDS {
        let selector_str = format!("#{id}");
        if let Ok(selector) = scraper::Selector::parse(&selector_str) {
            if let Some(el) = doc.select(&selector).next() {
                let text: String = el.text().collect();
                if text.trim().is_empty() {
                    return true;
                }
            }
        }
    }
    false
}

fn visible_text_word_count(html: &str) -> usize {
    let doc = scraper::Html::parse_document(html);
    let body_selector = scraper::Selector::parse("body").unwrap();
    doc.select(&body_selector)
        .next()
        .map(|body| body.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
        .split_whitespace()
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_react_root_is_spa() {
        let html = r#"<html><body><div id="root"></div><script src="bundle.js"></script></body></html>"#;
        assert!(looks_like_spa(html));
    }

    #[test]
    fn content_rich_page_is_not_spa() {
        let html = format!(
            "<html><body><article>{}</article></body></html>",
            "word ".repeat(300)
        );
        assert!(!looks_like_spa(&html));
    }

    #[test]
    fn next_data_marker_flags_spa() {
        let html = r#"<html><body><div id="__next"></div><script id="__NEXT_DATA__">{}</script></body></html>"#;
        assert!(looks_like_spa(html));
    }

    #[test]
    fn diagnose_reports_indicators_without_gating() {
        let html = r#"<html><body><div id="root"></div></body></html>"#;
        let (indicators, confidence) = diagnose(html);
        assert!(!indicators.is_empty());
        assert!(confidence > 0.0);
    }

    #[test]
    fn empty_body_with_only_scripts_is_spa() {
        // spec.md §8 scenario S4: no named root container, no framework
        // marker, just an empty <body> after two external <script> tags in
        // <head>.
        let html = r#"<html><head><script src="/a.js"></script><script src="/b.js"></script></head><body></body></html>"#;
        assert!(looks_like_spa(html));
    }

    #[test]
    fn many_external_scripts_in_small_body_is_spa() {
        let mut html = String::from("<html><body>");
        for i in 0..6 {
            html.push_str(&format!(r#"<script src="/chunk{i}.js"></script>"#));
        }
        html.push_str("</body></html>");
        assert!(looks_like_spa(&html));
    }
}
