//! HTTP fetching for the crawl engine
//!
//! The engine talks to the network only through the [`Fetcher`] trait, so
//! tests and embedders can supply their own. [`HttpFetcher`] is the reqwest
//! implementation used by the binary.
//!
//! Redirects are never followed by the client: 3xx responses come back as
//! documents so the engine can enqueue the `Location` target itself.

use crate::config::UserAgentConfig;
use crate::crawler::parser::{parse_html, Anchor};
use crate::url::CanonicalUrl;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Response};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Transport-level fetch failures
///
/// HTTP error statuses (404, 500, ...) are not fetch errors; they arrive as a
/// [`Document`] with that status code.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if error.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

/// A fetched response, reduced to what the engine and callbacks need
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub status_code: u16,
    /// Response headers with lowercase names
    pub headers: HashMap<String, String>,
    /// Response body (empty for HEAD requests)
    pub body: String,
    pub title: Option<String>,
    pub anchors: Vec<Anchor>,
    /// URLs from `src` attributes
    pub other_links: Vec<String>,
}

impl Document {
    /// Builds a document from a response, extracting links from HTML bodies
    pub fn from_parts(
        status_code: u16,
        headers: HashMap<String, String>,
        body: String,
        max_href_length: usize,
    ) -> Self {
        let mut document = Self {
            status_code,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
            body,
            ..Self::default()
        };

        if document.is_html() && !document.body.is_empty() {
            let parsed = parse_html(&document.body, max_href_length);
            document.title = parsed.title;
            document.anchors = parsed.anchors;
            document.other_links = parsed.other_links;
        }

        document
    }

    /// Looks up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when the content type is HTML or missing
    pub fn is_html(&self) -> bool {
        self.header("content-type")
            .map_or(true, |ct| ct.to_ascii_lowercase().contains("html"))
    }

    pub fn anchor_hrefs(&self) -> impl Iterator<Item = &str> {
        self.anchors.iter().map(|a| a.href.as_str())
    }

    /// Canonicalizes the page's outgoing links against `page`
    ///
    /// Anchors come first and carry their text and attributes, followed by
    /// `src` links. Fragment-only hrefs, hrefs longer than `max_href_length`,
    /// invalid URLs and non-http(s) URLs are left out.
    pub fn outgoing_urls(&self, page: &CanonicalUrl, max_href_length: usize) -> Vec<CanonicalUrl> {
        let usable = |href: &str| !href.is_empty() && !href.starts_with('#') && href.len() <= max_href_length;

        let anchors = self
            .anchors
            .iter()
            .filter(|anchor| usable(&anchor.href))
            .filter_map(|anchor| {
                CanonicalUrl::parse(&anchor.href, Some(page))
                    .ok()
                    .map(|url| url.with_anchor(anchor.text.clone(), anchor.attributes.clone()))
            });
        let others = self
            .other_links
            .iter()
            .filter(|href| usable(href))
            .filter_map(|href| CanonicalUrl::parse(href, Some(page)).ok());

        anchors
            .chain(others)
            .filter(CanonicalUrl::is_crawlable)
            .collect()
    }

    /// The redirect target, if this is a redirect response with a Location header
    pub fn redirect_location(&self) -> Option<&str> {
        if is_redirect_status(self.status_code) {
            self.header("location")
        } else {
            None
        }
    }
}

/// Status codes the engine treats as redirects
pub const REDIRECT_STATUSES: [u16; 6] = [300, 301, 302, 303, 307, 308];

pub fn is_redirect_status(status: u16) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

/// Network access used by the crawl engine
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches a page with GET
    async fn get(&self, url: &CanonicalUrl) -> Result<Document, FetchError>;

    /// Checks a page with HEAD; the returned document has no body or links
    async fn head(&self, url: &CanonicalUrl) -> Result<Document, FetchError>;

    /// Fetches the robots.txt body for the URL's origin
    ///
    /// Non-success statuses are reported as [`FetchError::Status`].
    async fn fetch_robots_txt(&self, url: &CanonicalUrl) -> Result<String, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_engine::config::UserAgentConfig;
/// use sumi_engine::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiEngine".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none()) // Redirects are enqueued by the engine
        .gzip(true)
        .brotli(true)
        .build()
}

fn collect_headers(response: &Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// reqwest-backed [`Fetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_href_length: usize,
}

impl HttpFetcher {
    /// Creates a fetcher with a client built from the user agent config
    pub fn new(config: &UserAgentConfig, max_href_length: usize) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?, max_href_length))
    }

    /// Creates a fetcher around an existing client
    ///
    /// The client should not follow redirects, otherwise the engine never sees them.
    pub fn with_client(client: Client, max_href_length: usize) -> Self {
        Self {
            client,
            max_href_length,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &CanonicalUrl) -> Result<Document, FetchError> {
        let target = url.canonical_form();
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(target, e))?;

        let status = response.status().as_u16();
        let headers = collect_headers(&response);
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(target, e))?;

        Ok(Document::from_parts(
            status,
            headers,
            body,
            self.max_href_length,
        ))
    }

    async fn head(&self, url: &CanonicalUrl) -> Result<Document, FetchError> {
        let target = url.canonical_form();
        let response = self
            .client
            .head(target)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(target, e))?;

        Ok(Document::from_parts(
            response.status().as_u16(),
            collect_headers(&response),
            String::new(),
            self.max_href_length,
        ))
    }

    async fn fetch_robots_txt(&self, url: &CanonicalUrl) -> Result<String, FetchError> {
        let target = url.robots_txt_url();
        let response = self
            .client
            .get(&target)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&target, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: target,
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&target, e))
    }
}
