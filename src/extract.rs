//! C4 Content Extractor: turns a fetched response into structured fields —
//! title, description, body text, outbound links, language, word count,
//! and a content hash used for dedup.
//!
//! Built on `scraper` (teacher's HTML parser) for DOM traversal,
//! `encoding_rs` for charset-aware decoding, and `sha2` for the content
//! hash. Link resolution reuses the normalization rules in `frontier.rs`,
//! generalized from the teacher's `tools/crawl.rs` `resolve_url`.

use std::collections::BTreeSet;

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

#[derive(Debug, Clone)]
pub struct Extracted {
    pub title: Option<String>,
    pub description: Option<String>,
    pub text: String,
    pub links: BTreeSet<String>,
    pub content_hash: String,
    pub language: Option<String>,
    pub word_count: u32,
}

/// Decodes `body` per `content_type`/BOM/`<meta charset>`, parses it as
/// HTML, and extracts the fields above. Non-HTML content types are hashed
/// and word-counted but not DOM-parsed.
pub fn extract(base_url: &str, content_type: &str, body: &[u8]) -> Extracted {
    if !content_type.contains("html") {
        let text: String = String::from_utf8_lossy(body)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let word_count = text.split_whitespace().count() as u32;
        let content_hash = hash_text(&text);
        return Extracted {
            title: None,
            description: None,
            text,
            links: BTreeSet::new(),
            content_hash,
            language: None,
            word_count,
        };
    }

    let html = decode_html(content_type, body);
    let document = Html::parse_document(&html);

    let title = select_first_text(&document, "title");
    let description = select_meta_content(&document, "description");
    let language = select_html_lang(&document);

    let body_selector = Selector::parse("body").unwrap();
    let text: String = document
        .select(&body_selector)
        .next()
        .map(|el| {
            el.text()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let word_count = text.split_whitespace().count() as u32;
    let content_hash = hash_text(&text);

    let links = extract_links(&document, base_url);

    Extracted {
        title,
        description,
        text,
        links,
        content_hash,
        language,
        word_count,
    }
}

/// BOM sniffing first, then a declared `<meta charset>`, then the HTTP
/// `Content-Type` charset, falling back to UTF-8. Per spec.md §8's boundary
/// case, a `<meta charset>` that disagrees with the HTTP `Content-Type`
/// wins — the in-document declaration is checked before the header one.
fn decode_html(content_type: &str, body: &[u8]) -> String {
    if let Some((encoding, _, _)) = encoding_rs::Encoding::for_bom(body) {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let prefix_len = body.len().min(2048);
    if let Some(charset) = meta_charset(&String::from_utf8_lossy(&body[..prefix_len])) {
        if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
            let (decoded, _, _) = encoding.decode(body);
            return decoded.into_owned();
        }
    }

    if let Some(charset) = content_type_charset(content_type) {
        if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
            let (decoded, _, _) = encoding.decode(body);
            return decoded.into_owned();
        }
    }

    String::from_utf8_lossy(body).into_owned()
}

fn content_type_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .find_map(|part| part.trim().strip_prefix("charset="))
        .map(|c| c.trim_matches('"').to_string())
}

fn meta_charset(prefix: &str) -> Option<String> {
    let lower = prefix.to_lowercase();
    let idx = lower.find("charset=")?;
    let rest = &prefix[idx + "charset=".len()..];
    let end = rest
        .find(|c: char| c == '"' || c == '\'' || c == '>' || c.is_whitespace())
        .unwrap_or(rest.len());
    let charset = rest[..end].trim();
    if charset.is_empty() {
        None
    } else {
        Some(charset.to_string())
    }
}

fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[name="{name}"]"#)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_html_lang(document: &Html) -> Option<String> {
    let selector = Selector::parse("html").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

/// Collects `href`s from anchor tags, skipping non-navigable schemes, and
/// resolves relative URLs against `base_url` via [`frontier::normalize_url`].
fn extract_links(document: &Html, base_url: &str) -> BTreeSet<String> {
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return BTreeSet::new(),
    };
    let base = match Url::parse(base_url) {
        Ok(b) => b,
        Err(_) => return BTreeSet::new(),
    };

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !is_non_navigable(href))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .filter_map(|url| crate::frontier::normalize_url(url.as_str()))
        .collect()
}

fn is_non_navigable(href: &str) -> bool {
    let trimmed = href.trim();
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("javascript:")
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with("tel:")
        || trimmed.starts_with("data:")
}

/// Digests the canonicalized (whitespace-collapsed) text projection,
/// not the raw bytes — byte-level churn (ad slots, timestamps, tracking
/// params rendered into the markup) must not defeat the store's
/// no-op-recrawl detection (spec.md §4.4, glossary: "content hash").
fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_description_and_links() {
        let html = r#"
            <html lang="en"><head>
                <title>Example Page</title>
                <meta name="description" content="An example.">
            </head><body>
                <p>Hello world, this is a test page.</p>
                <a href="/about">About</a>
                <a href="javascript:void(0)">Nope</a>
            </body></html>
        "#;
        let extracted = extract("https://example.com/", "text/html; charset=utf-8", html.as_bytes());
        assert_eq!(extracted.title.as_deref(), Some("Example Page"));
        assert_eq!(extracted.description.as_deref(), Some("An example."));
        assert_eq!(extracted.language.as_deref(), Some("en"));
        assert!(extracted.links.contains("https://example.com/about"));
        assert_eq!(extracted.links.len(), 1);
        assert!(extracted.word_count > 0);
    }

    #[test]
    fn same_bytes_hash_identically() {
        let a = extract("https://example.com/", "text/html", b"<html><body>hi</body></html>");
        let b = extract("https://example.com/", "text/html", b"<html><body>hi</body></html>");
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn byte_level_churn_with_same_visible_text_hashes_identically() {
        // Differing markup (an added attribute, an HTML comment) that
        // renders to the same visible text must not be treated as a
        // content change — the hash is over the extracted text, not the
        // raw bytes.
        let a = extract(
            "https://example.com/",
            "text/html",
            b"<html><body><p>hi there</p></body></html>",
        );
        let b = extract(
            "https://example.com/",
            "text/html",
            b"<html data-build=\"9284\"><body><!-- ad slot --><p>hi there</p></body></html>",
        );
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn non_html_content_is_hashed_but_not_parsed() {
        let extracted = extract("https://example.com/file.json", "application/json", b"{\"a\":1}");
        assert!(extracted.title.is_none());
        assert!(extracted.links.is_empty());
    }

    #[test]
    fn meta_charset_override_decodes_correctly() {
        let html = br#"<html><head><meta charset="utf-8"></head><body>caf\xc3\xa9</body></html>"#;
        let extracted = extract("https://example.com/", "text/html", html);
        assert!(!extracted.text.is_empty());
    }

    #[test]
    fn meta_charset_wins_over_disagreeing_content_type_header() {
        let mut body = b"<html><head><meta charset=\"windows-1252\"></head><body>".to_vec();
        body.push(0xE9); // windows-1252 'é', invalid as a lone UTF-8 continuation byte
        body.extend_from_slice(b"</body></html>");
        let extracted = extract("https://example.com/", "text/html; charset=utf-8", &body);
        assert!(extracted.text.contains('\u{e9}'));
    }
}
