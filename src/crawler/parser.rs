//! HTML parser for extracting outgoing links
//!
//! This module pulls two kinds of links out of a page:
//! - Anchor elements (`<a href>`), with their text and attributes
//! - Resource links from `src` attributes (img, script, iframe, ...)
//!
//! Hrefs are returned as written; resolution against the page URL happens
//! when the engine canonicalizes them.

use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// An anchor element found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// The href attribute, trimmed
    pub href: String,
    /// The anchor's text content, whitespace-collapsed
    pub text: String,
    /// All attributes of the element
    pub attributes: BTreeMap<String, String>,
}

/// Links and metadata extracted from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Anchor elements worth following
    pub anchors: Vec<Anchor>,

    /// Values of `src` attributes
    pub other_links: Vec<String>,
}

/// Parses HTML content and extracts outgoing links
///
/// # Link Extraction Rules
///
/// **Anchors** (`<a href>`) are kept unless the href is empty, is a pure
/// `#fragment` link, or is longer than `max_href_length` bytes.
///
/// **Other links** are the values of every `src` attribute, minus empty
/// values and pure fragments.
///
/// Non-http(s) schemes (`mailto:`, `javascript:` ...) are left in place; the
/// canonicalizer marks them non-crawlable and the engine discards them.
///
/// # Example
///
/// ```
/// use sumi_engine::crawler::parse_html;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let parsed = parse_html(html, 2048);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.anchors[0].href, "/page");
/// ```
pub fn parse_html(html: &str, max_href_length: usize) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        anchors: extract_anchors(&document, max_href_length),
        other_links: extract_src_links(&document),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_anchors(document: &Html, max_href_length: usize) -> Vec<Anchor> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?.trim();
            if href.is_empty() || href.starts_with('#') || href.len() > max_href_length {
                return None;
            }

            let text = element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            let attributes = element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();

            Some(Anchor {
                href: href.to_string(),
                text,
                attributes,
            })
        })
        .collect()
}

fn extract_src_links(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("[src]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && !src.starts_with('#'))
        .map(str::to_string)
        .collect()
}
