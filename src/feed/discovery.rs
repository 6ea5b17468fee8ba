use serde::Serialize;
use std::collections::HashSet;
use url::Url;

use super::classifier::FeedClassifier;
use super::fetcher::{Accept, Fetcher};
use super::robots::RobotsChecker;
use super::sanitize::tag_end;

/// One way of turning a site URL into a feed URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The URL itself is a feed
    Direct,
    /// A `<link>` tag in the page `<head>` points to a feed
    HtmlLinks,
    /// A well-known suffix on the site origin serves a feed
    CommonPaths,
}

/// Strategies in the order they are attempted.
pub const DEFAULT_STRATEGIES: [Strategy; 3] =
    [Strategy::Direct, Strategy::HtmlLinks, Strategy::CommonPaths];

/// Outcome of feed discovery. Never an error: a URL nothing resolves is
/// handed back unchanged as [`Discovery::Unresolved`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Discovery {
    Resolved { url: String, strategy: Strategy },
    Unresolved { url: String },
}

impl Discovery {
    /// The resolved feed URL, or the original input when unresolved.
    pub fn url(&self) -> &str {
        match self {
            Discovery::Resolved { url, .. } | Discovery::Unresolved { url } => url,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Discovery::Resolved { .. })
    }

    pub fn into_url(self) -> String {
        match self {
            Discovery::Resolved { url, .. } | Discovery::Unresolved { url } => url,
        }
    }
}

/// `<link>` tag shapes that advertise a feed, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPattern {
    AlternateRss,
    Rss,
    Atom,
}

const LINK_PATTERNS: [LinkPattern; 3] =
    [LinkPattern::AlternateRss, LinkPattern::Rss, LinkPattern::Atom];

impl LinkPattern {
    fn matches(self, attrs: &TagAttributes) -> bool {
        let Some(mime) = attrs.get("type").map(mime_essence) else {
            return false;
        };
        match self {
            LinkPattern::AlternateRss => {
                mime == "application/rss+xml"
                    && attrs
                        .get("rel")
                        .map(|rel| {
                            rel.split_ascii_whitespace()
                                .any(|token| token.eq_ignore_ascii_case("alternate"))
                        })
                        .unwrap_or(false)
            }
            LinkPattern::Rss => mime == "application/rss+xml",
            LinkPattern::Atom => mime == "application/atom+xml",
        }
    }
}

fn mime_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Resolves site URLs to feed URLs by trying each [`Strategy`] in order and
/// stopping at the first success. Every probe is sequential.
#[derive(Debug, Clone)]
pub struct FeedLocator {
    fetcher: Fetcher,
    classifier: FeedClassifier,
    robots: RobotsChecker,
    common_paths: Vec<String>,
    enforce_robots: bool,
    strategies: Vec<Strategy>,
}

impl FeedLocator {
    pub fn new(
        fetcher: Fetcher,
        classifier: FeedClassifier,
        robots: RobotsChecker,
        common_paths: Vec<String>,
        enforce_robots: bool,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            robots,
            common_paths,
            enforce_robots,
            strategies: DEFAULT_STRATEGIES.to_vec(),
        }
    }

    /// Replaces the strategy list (order is preserved as given).
    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Runs the strategy chain for `url`.
    pub async fn locate(&self, url: &str) -> Discovery {
        tracing::info!(url = %url, "Looking for feed");

        for &strategy in &self.strategies {
            if let Some(found) = self.attempt(strategy, url).await {
                tracing::info!(url = %url, feed = %found, strategy = ?strategy, "Feed resolved");
                return Discovery::Resolved {
                    url: found,
                    strategy,
                };
            }
            tracing::debug!(url = %url, strategy = ?strategy, "Strategy found nothing");
        }

        tracing::info!(url = %url, "No feed found, keeping original URL");
        Discovery::Unresolved {
            url: url.to_owned(),
        }
    }

    /// Runs a single strategy. Failures inside a strategy are absorbed.
    pub async fn attempt(&self, strategy: Strategy, url: &str) -> Option<String> {
        match strategy {
            Strategy::Direct => self
                .classifier
                .is_feed(url)
                .await
                .then(|| url.to_owned()),
            Strategy::HtmlLinks => self.scan_html(url).await,
            Strategy::CommonPaths => self.probe_common_paths(url).await,
        }
    }

    async fn scan_html(&self, url: &str) -> Option<String> {
        let base = Url::parse(url).ok()?;

        if !self.robots.is_allowed(url).await {
            tracing::warn!(url = %url, enforced = self.enforce_robots, "Page disallowed by robots.txt");
            if self.enforce_robots {
                return None;
            }
        }

        let html = match self.fetcher.get(url, Accept::Html).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Could not fetch page for link scan");
                return None;
            }
        };

        let candidates = feed_link_candidates(&html, &base);
        tracing::debug!(url = %url, candidates = candidates.len(), "Scanned page head");

        for candidate in candidates {
            if self.classifier.is_feed(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn probe_common_paths(&self, url: &str) -> Option<String> {
        let base = Url::parse(url).ok()?;

        for suffix in &self.common_paths {
            let Ok(candidate) = base.join(suffix) else {
                tracing::debug!(path = %suffix, "Invalid probe path");
                continue;
            };
            tracing::debug!(candidate = %candidate, "Probing common path");
            if self.classifier.is_feed(candidate.as_str()).await {
                return Some(candidate.to_string());
            }
        }
        None
    }
}

/// Feed URLs advertised in the page head, in probe order: all matches of the
/// first pattern in document order, then the next pattern, without repeats.
fn feed_link_candidates(html: &str, base: &Url) -> Vec<String> {
    let head = extract_head(html);
    let tags: Vec<TagAttributes> = link_tags(head).map(parse_attributes).collect();

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for pattern in LINK_PATTERNS {
        for attrs in tags.iter().filter(|attrs| pattern.matches(attrs)) {
            let Some(resolved) = attrs.get("href").and_then(|href| resolve_url(href, base))
            else {
                continue;
            };
            if seen.insert(resolved.clone()) {
                candidates.push(resolved);
            }
        }
    }
    candidates
}

/// The `<head>` section of a page, or the whole document when there is none.
fn extract_head(html: &str) -> &str {
    // ASCII lowercasing keeps byte offsets aligned with the original
    let lower = html.to_ascii_lowercase();

    let start = find_tag(&lower, "<head")
        .and_then(|pos| lower[pos..].find('>').map(|gt| pos + gt + 1));
    let Some(start) = start else {
        return html;
    };

    let end = lower[start..]
        .find("</head")
        .or_else(|| find_tag(&lower[start..], "<body"))
        .map(|pos| start + pos)
        .unwrap_or(html.len());
    &html[start..end]
}

/// Finds `<name` followed by whitespace, `/` or `>` (so `<head` skips `<header`).
fn find_tag(lower: &str, open: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(pos) = lower[search_from..].find(open) {
        let abs = search_from + pos;
        let next = lower[abs + open.len()..].chars().next();
        match next {
            Some(c) if c.is_whitespace() || c == '/' || c == '>' => return Some(abs),
            None => return None,
            _ => search_from = abs + open.len(),
        }
    }
    None
}

/// Iterates over the raw text of each `<link ...>` tag, skipping HTML comments.
fn link_tags(html: &str) -> impl Iterator<Item = &str> {
    let lower = html.to_ascii_lowercase();
    let mut tags = Vec::new();
    let mut pos = 0;

    while pos < lower.len() {
        let rest = &lower[pos..];
        let next_comment = rest.find("<!--");
        let next_link = find_tag(rest, "<link");

        match (next_comment, next_link) {
            (Some(c), Some(l)) if c < l => {
                pos += rest[c..].find("-->").map(|end| c + end + 3).unwrap_or(rest.len());
            }
            (Some(c), None) => {
                pos += rest[c..].find("-->").map(|end| c + end + 3).unwrap_or(rest.len());
            }
            (_, Some(l)) => {
                let start = pos + l;
                // Quoted values may contain `>`
                match tag_end(&html[start + 1..]) {
                    Some(gt) => {
                        let end = start + 1 + gt + 1;
                        tags.push(&html[start..end]);
                        pos = end;
                    }
                    None => pos = start + "<link".len(),
                }
            }
            (None, None) => break,
        }
    }

    tags.into_iter()
}

/// Attribute names (lowercased) and values of a single tag.
#[derive(Debug, Default)]
struct TagAttributes(Vec<(String, String)>);

impl TagAttributes {
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Tolerant attribute parser: double-quoted, single-quoted, unquoted and
/// valueless attributes.
fn parse_attributes(tag: &str) -> TagAttributes {
    let inner = tag.trim_start_matches('<').trim_end_matches('>');
    // Skip the tag name
    let mut rest = inner.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let mut attrs = Vec::new();

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(quote).unwrap_or(body.len());
                    rest = body.get(end + 1..).unwrap_or("");
                    body[..end].to_owned()
                }
                _ => {
                    let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                    rest = &after_eq[end..];
                    after_eq[..end].to_owned()
                }
            }
        } else {
            String::new()
        };

        if !name.is_empty() {
            attrs.push((name, value));
        }
    }

    TagAttributes(attrs)
}

/// Resolves an `href` (absolute, protocol-relative or relative) against the page URL.
fn resolve_url(href: &str, base: &Url) -> Option<String> {
    let href = href.trim().replace("&amp;", "&");
    if href.is_empty() {
        return None;
    }
    let resolved = base.join(&href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> Url {
        Url::parse("https://example.com/blog/post").unwrap()
    }

    // --- Head extraction ---

    #[test]
    fn test_extract_head_skips_header_element() {
        let html = "<html><header>x</header><HEAD lang=en><link rel=x></head><body></body>";
        assert_eq!(extract_head(html), "<link rel=x>");
    }

    #[test]
    fn test_extract_head_without_close_stops_at_body() {
        let html = "<head><link href=a><body><link href=b>";
        assert_eq!(extract_head(html), "<link href=a>");
    }

    #[test]
    fn test_extract_head_missing_uses_whole_document() {
        let html = "<link rel=alternate type=application/rss+xml href=/f>";
        assert_eq!(extract_head(html), html);
    }

    #[test]
    fn test_body_links_ignored_when_head_present() {
        let html = r#"<html><head><title>t</title></head><body>
            <link rel="alternate" type="application/rss+xml" href="/body-feed">
        </body></html>"#;
        assert!(feed_link_candidates(html, &base()).is_empty());
    }

    // --- Attribute parsing ---

    #[test]
    fn test_parse_attributes_quoting_styles() {
        let attrs = parse_attributes(r#"<link REL='alternate' type=application/rss+xml href="/a b" hidden>"#);
        assert_eq!(attrs.get("rel"), Some("alternate"));
        assert_eq!(attrs.get("type"), Some("application/rss+xml"));
        assert_eq!(attrs.get("href"), Some("/a b"));
        assert_eq!(attrs.get("hidden"), Some(""));
        assert_eq!(attrs.get("title"), None);
    }

    #[test]
    fn test_parse_attributes_self_closing() {
        let attrs = parse_attributes(r#"<link href="/feed"/>"#);
        assert_eq!(attrs.get("href"), Some("/feed"));
    }

    // --- Candidate ordering ---

    #[test]
    fn test_find_rss_link_in_html() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/feed.xml" title="RSS">
        </head><body></body></html>"#;
        assert_eq!(
            feed_link_candidates(html, &base()),
            vec!["https://example.com/feed.xml"]
        );
    }

    #[test]
    fn test_pattern_priority_over_document_order() {
        let html = r#"<head>
            <link type="application/atom+xml" rel="alternate" href="/atom">
            <link type="application/rss+xml" href="/bare-rss">
            <link rel="alternate" type="application/rss+xml" href="/alt-rss">
        </head>"#;
        assert_eq!(
            feed_link_candidates(html, &base()),
            vec![
                "https://example.com/alt-rss",
                "https://example.com/bare-rss",
                "https://example.com/atom",
            ]
        );
    }

    #[test]
    fn test_document_order_within_pattern_and_no_repeats() {
        let html = r#"<head>
            <link rel="alternate" type="application/rss+xml" href="/one">
            <link rel="alternate feed" type="application/rss+xml; charset=utf-8" href="/two">
            <link rel="alternate" type="application/rss+xml" href="https://example.com/one">
        </head>"#;
        assert_eq!(
            feed_link_candidates(html, &base()),
            vec!["https://example.com/one", "https://example.com/two"]
        );
    }

    #[test]
    fn test_commented_links_skipped() {
        let html = r#"<head>
            <!-- <link rel="alternate" type="application/rss+xml" href="/old"> -->
            <link rel="alternate" type="application/rss+xml" href="/new">
        </head>"#;
        assert_eq!(
            feed_link_candidates(html, &base()),
            vec!["https://example.com/new"]
        );
    }

    #[test]
    fn test_no_feed_link_in_html() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <link rel="alternate" hreflang="fr" href="/fr/">
        </head><body></body></html>"#;
        assert!(feed_link_candidates(html, &base()).is_empty());
    }

    #[test]
    fn test_link_without_href_skipped() {
        let html = r#"<head><link rel="alternate" type="application/rss+xml"></head>"#;
        assert!(feed_link_candidates(html, &base()).is_empty());
    }

    #[test]
    fn test_gt_inside_quoted_attribute() {
        let html = r#"<head>
            <link rel="alternate" type="application/rss+xml" title="News > Tech" href="/feed">
        </head>"#;
        assert_eq!(
            feed_link_candidates(html, &base()),
            vec!["https://example.com/feed"]
        );
    }

    #[test]
    fn test_unterminated_link_does_not_swallow_next() {
        let html = r#"<head><link href="/broken <link rel="alternate" type="application/rss+xml" href="/ok"></head>"#;
        let tags: Vec<&str> = link_tags(html).collect();
        assert_eq!(tags.last().copied(), Some(r#"<link rel="alternate" type="application/rss+xml" href="/ok">"#));
    }

    #[test]
    fn test_non_ascii_before_head_keeps_offsets() {
        let html = "<!doctype html><!-- ÉÀ€ --><html><head>\
            <link rel=\"alternate\" type=\"application/rss+xml\" href=\"/ü\"></head>";
        assert_eq!(
            feed_link_candidates(html, &base()),
            vec!["https://example.com/%C3%BC"]
        );
    }

    // --- URL resolution ---

    #[test]
    fn test_resolve_absolute_url() {
        assert_eq!(
            resolve_url("https://other.com/feed", &base()).as_deref(),
            Some("https://other.com/feed")
        );
    }

    #[test]
    fn test_resolve_root_relative() {
        assert_eq!(
            resolve_url("/feed.xml", &base()).as_deref(),
            Some("https://example.com/feed.xml")
        );
    }

    #[test]
    fn test_resolve_path_relative() {
        assert_eq!(
            resolve_url("feed.xml", &base()).as_deref(),
            Some("https://example.com/blog/feed.xml")
        );
    }

    #[test]
    fn test_resolve_protocol_relative_keeps_page_scheme() {
        let http_base = Url::parse("http://example.com/").unwrap();
        assert_eq!(
            resolve_url("//cdn.example.com/feed", &http_base).as_deref(),
            Some("http://cdn.example.com/feed")
        );
    }

    #[test]
    fn test_resolve_decodes_amp_entity() {
        assert_eq!(
            resolve_url("/feed?a=1&amp;b=2", &base()).as_deref(),
            Some("https://example.com/feed?a=1&b=2")
        );
    }

    #[test]
    fn test_resolve_rejects_non_http() {
        assert_eq!(resolve_url("javascript:alert(1)", &base()), None);
        assert_eq!(resolve_url("   ", &base()), None);
    }

    // --- Discovery value ---

    #[test]
    fn test_discovery_accessors() {
        let resolved = Discovery::Resolved {
            url: "https://a/feed".to_owned(),
            strategy: Strategy::CommonPaths,
        };
        assert!(resolved.is_resolved());
        assert_eq!(resolved.url(), "https://a/feed");

        let unresolved = Discovery::Unresolved {
            url: "https://a".to_owned(),
        };
        assert!(!unresolved.is_resolved());
        assert_eq!(unresolved.into_url(), "https://a");
    }

    #[test]
    fn test_discovery_serializes_with_status_tag() {
        let json = serde_json::to_value(Discovery::Resolved {
            url: "https://a/feed".to_owned(),
            strategy: Strategy::HtmlLinks,
        })
        .unwrap();
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["strategy"], "html_links");
    }
}
