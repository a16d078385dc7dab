use crate::url::domain::split_host;
use crate::{UrlError, UrlResult};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A URL in canonical form, with every derived field computed up front
///
/// Two `CanonicalUrl`s are equal exactly when their canonical forms are equal;
/// the raw input and anchor metadata do not take part in comparisons.
///
/// Only `http` and `https` URLs are crawlable. Any other scheme (or an opaque
/// URI such as `mailto:`) still parses, but yields a value whose
/// [`is_crawlable`](Self::is_crawlable) returns false.
#[derive(Debug, Clone)]
pub struct CanonicalUrl {
    raw: String,
    scheme: String,
    host: String,
    port: u16,
    path: String,
    suffix: String,
    domain: String,
    subdomain: String,
    canonical_form: String,
    anchor_text: Option<String>,
    anchor_attributes: BTreeMap<String, String>,
    was_extracted_from_anchor: bool,
    crawlable: bool,
}

impl CanonicalUrl {
    /// Parses and canonicalizes a URL, resolving it against `parent` if relative
    ///
    /// # Arguments
    ///
    /// * `raw` - The URL as written (absolute, protocol-relative or relative)
    /// * `parent` - The page the URL was found on, if any
    ///
    /// # Returns
    ///
    /// * `Ok(CanonicalUrl)` - The canonicalized URL
    /// * `Err(UrlError::InvalidUrl)` - No scheme could be resolved, or the host
    ///   or port is malformed
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_engine::url::CanonicalUrl;
    ///
    /// let url = CanonicalUrl::parse("HTTP://www.Example.com:80/a/../b", None).unwrap();
    /// assert_eq!(url.canonical_form(), "http://www.example.com/b");
    ///
    /// let child = CanonicalUrl::parse("c?x=1", Some(&url)).unwrap();
    /// assert_eq!(child.canonical_form(), "http://www.example.com/c?x=1");
    /// ```
    pub fn parse(raw: &str, parent: Option<&CanonicalUrl>) -> UrlResult<Self> {
        let trimmed = raw.trim();
        let input = match trimmed.find('#') {
            Some(idx) => &trimmed[..idx],
            None => trimmed,
        };

        if let Some((scheme, rest)) = split_scheme(input) {
            let scheme = scheme.to_ascii_lowercase();
            return match rest.strip_prefix("//") {
                Some(after) if is_navigable(&scheme) => {
                    Self::from_authority(raw, scheme, after.trim_start_matches('/'))
                }
                _ => Ok(Self::opaque(raw, scheme, rest)),
            };
        }

        let parent = parent
            .filter(|p| p.crawlable)
            .ok_or_else(|| UrlError::invalid(raw, "relative URL without a crawlable parent"))?;

        if let Some(after) = input.strip_prefix("//") {
            return Self::from_authority(raw, parent.scheme.clone(), after.trim_start_matches('/'));
        }

        let target = resolve_relative(parent.path_without_query(), input);
        Ok(Self::assemble(
            raw,
            parent.scheme.clone(),
            parent.host.clone(),
            parent.port,
            normalize_path(&target),
        ))
    }

    /// Attaches the text and attributes of the anchor element this URL came from
    pub fn with_anchor(mut self, text: impl Into<String>, attributes: BTreeMap<String, String>) -> Self {
        self.anchor_text = Some(text.into());
        self.anchor_attributes = attributes;
        self.was_extracted_from_anchor = true;
        self
    }

    fn from_authority(raw: &str, scheme: String, after: &str) -> UrlResult<Self> {
        let authority_end = after.find(['/', '?']).unwrap_or(after.len());
        let (authority, tail) = after.split_at(authority_end);

        // userinfo is never part of the canonical form
        let host_port = authority
            .rsplit_once('@')
            .map(|(_, host_port)| host_port)
            .unwrap_or(authority);
        let (host, port) = split_host_port(raw, host_port)?;
        let port = port.unwrap_or_else(|| default_port(&scheme));

        let path = match tail.chars().next() {
            None => "/".to_string(),
            Some('?') => format!("/{}", tail),
            Some(_) => tail.to_string(),
        };

        Ok(Self::assemble(raw, scheme, host, port, normalize_path(&path)))
    }

    fn assemble(raw: &str, scheme: String, host: String, port: u16, path: String) -> Self {
        let parts = split_host(&host);
        let canonical_form = if port == default_port(&scheme) {
            format!("{}://{}{}", scheme, host, path)
        } else {
            format!("{}://{}:{}{}", scheme, host, port, path)
        };

        Self {
            raw: raw.to_string(),
            scheme,
            host,
            port,
            path,
            suffix: parts.suffix,
            domain: parts.domain,
            subdomain: parts.subdomain,
            canonical_form,
            anchor_text: None,
            anchor_attributes: BTreeMap::new(),
            was_extracted_from_anchor: false,
            crawlable: true,
        }
    }

    fn opaque(raw: &str, scheme: String, rest: &str) -> Self {
        Self {
            raw: raw.to_string(),
            canonical_form: format!("{}:{}", scheme, rest),
            scheme,
            host: String::new(),
            port: 0,
            path: String::new(),
            suffix: String::new(),
            domain: String::new(),
            subdomain: String::new(),
            anchor_text: None,
            anchor_attributes: BTreeMap::new(),
            was_extracted_from_anchor: false,
            crawlable: false,
        }
    }

    /// The URL exactly as it was given
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercase scheme
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Lowercase host (empty for opaque URIs)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, or the scheme default
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Normalized path, including any query string
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Public suffix of the host
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Registrable domain of the host
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Host labels left of the registrable domain
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// `scheme://host[:port]path`, with the port shown only when non-default
    pub fn canonical_form(&self) -> &str {
        &self.canonical_form
    }

    pub fn anchor_text(&self) -> Option<&str> {
        self.anchor_text.as_deref()
    }

    pub fn anchor_attributes(&self) -> &BTreeMap<String, String> {
        &self.anchor_attributes
    }

    pub fn was_extracted_from_anchor(&self) -> bool {
        self.was_extracted_from_anchor
    }

    /// True for http(s) URLs the engine may fetch
    pub fn is_crawlable(&self) -> bool {
        self.crawlable
    }

    /// The path with the query string removed
    pub fn path_without_query(&self) -> &str {
        match self.path.find('?') {
            Some(idx) => &self.path[..idx],
            None => &self.path,
        }
    }

    /// `scheme://host[:port]`, the prefix shared by every URL on this origin
    pub fn origin(&self) -> &str {
        let path_len = self.path.len();
        &self.canonical_form[..self.canonical_form.len() - path_len]
    }

    /// The site's robots.txt location
    pub fn robots_txt_url(&self) -> String {
        format!("{}/robots.txt", self.origin())
    }
}

impl PartialEq for CanonicalUrl {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_form == other.canonical_form
    }
}

impl Eq for CanonicalUrl {}

impl Hash for CanonicalUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_form.hash(state);
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_form)
    }
}

impl FromStr for CanonicalUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, None)
    }
}

fn is_navigable(scheme: &str) -> bool {
    scheme == "http" || scheme == "https"
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "https" => 443,
        _ => 80,
    }
}

/// Splits `scheme:rest` when the text before the first ':' is a valid scheme
/// token and no '/', '?' or '#' precedes that ':'.
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let colon = input.find(':')?;
    let candidate = &input[..colon];

    let mut chars = candidate.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    if first_ok && rest_ok {
        Some((candidate, &input[colon + 1..]))
    } else {
        None
    }
}

fn split_host_port(raw: &str, authority: &str) -> UrlResult<(String, Option<u16>)> {
    let (host, port) = if authority.starts_with('[') {
        let close = authority
            .find(']')
            .ok_or_else(|| UrlError::invalid(raw, "unterminated IPv6 literal"))?;
        let rest = &authority[close + 1..];
        let port = match rest.strip_prefix(':') {
            Some(port) => Some(port),
            None if rest.is_empty() => None,
            None => return Err(UrlError::invalid(raw, "unexpected text after IPv6 literal")),
        };
        (&authority[..=close], port)
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(UrlError::invalid(raw, "empty host"));
    }

    let port = match port {
        None | Some("") => None,
        Some(digits) => Some(
            digits
                .parse::<u16>()
                .map_err(|_| UrlError::invalid(raw, format!("invalid port '{}'", digits)))?,
        ),
    };

    Ok((host.to_ascii_lowercase(), port))
}

/// Resolves a scheme-less, authority-less reference against a parent path
fn resolve_relative(parent_path: &str, reference: &str) -> String {
    if reference.is_empty() {
        return parent_path.to_string();
    }
    if reference.starts_with('/') {
        return reference.to_string();
    }
    if reference.starts_with('?') {
        return format!("{}{}", parent_path, reference);
    }

    let directory = match parent_path.rfind('/') {
        Some(idx) => &parent_path[..=idx],
        None => "/",
    };
    format!("{}{}", directory, reference)
}

/// Normalizes a path (with optional query) in one pass over its segments
///
/// Percent-escapes of unreserved characters are decoded and the remaining
/// escapes get uppercase hex digits. `.` segments are removed and `..` drops
/// the segment before it, never climbing above the root. The query is only
/// percent-normalized.
pub(crate) fn normalize_path(input: &str) -> String {
    let (path, query) = match input.find('?') {
        Some(idx) => (&input[..idx], Some(&input[idx + 1..])),
        None => (input, None),
    };

    let mut segments: Vec<String> = Vec::new();
    let mut trailing_slash = false;

    for raw_segment in path.strip_prefix('/').unwrap_or(path).split('/') {
        let mut segment = String::with_capacity(raw_segment.len());
        normalize_percent(raw_segment, &mut segment);

        match segment.as_str() {
            "." => trailing_slash = true,
            ".." => {
                segments.pop();
                trailing_slash = true;
            }
            _ => {
                segments.push(segment);
                trailing_slash = false;
            }
        }
    }

    let mut out = String::with_capacity(input.len() + 1);
    out.push('/');
    out.push_str(&segments.join("/"));
    if trailing_slash && !segments.is_empty() {
        out.push('/');
    }

    if let Some(query) = query {
        out.push('?');
        normalize_percent(query, &mut out);
    }

    out
}

fn normalize_percent(input: &str, out: &mut String) {
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let hi = chars.next();
        let lo = chars.next();
        let decoded = match (hi.and_then(|h| h.to_digit(16)), lo.and_then(|l| l.to_digit(16))) {
            (Some(h), Some(l)) => Some((h * 16 + l) as u8),
            _ => None,
        };

        match decoded {
            Some(byte) if is_unreserved(byte) => out.push(byte as char),
            _ => {
                out.push('%');
                for ch in [hi, lo].into_iter().flatten() {
                    out.push(ch.to_ascii_uppercase());
                }
            }
        }
    }
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}
