//! The engine wires the feed components to one shared [`Fetcher`] and owns
//! the [`FeedCache`]. It exposes the operations the registry and the CLI
//! consume: `check_feed`, `find_feed` and `parse_feed`.

use std::sync::Arc;

use crate::config::Config;
use crate::feed::{
    Accept, Discovery, FeedCache, FeedClassifier, FeedError, FeedLocator, FetchError, Fetcher,
    ParsedFeed, RobotsChecker,
};
use crate::feed::parse_feed as parse_body;
use crate::registry::FeedSource;

#[derive(Debug)]
pub struct FeedEngine {
    fetcher: Fetcher,
    classifier: FeedClassifier,
    locator: FeedLocator,
    cache: FeedCache,
}

impl FeedEngine {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Ok(Self::from_fetcher(Fetcher::new(config)?, config))
    }

    /// Builds an engine around a caller-configured HTTP client.
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self::from_fetcher(Fetcher::with_client(client, config), config)
    }

    fn from_fetcher(fetcher: Fetcher, config: &Config) -> Self {
        let classifier = FeedClassifier::new(fetcher.clone());
        let robots = RobotsChecker::new(fetcher.clone(), config.robots_agent.as_str());
        let locator = FeedLocator::new(
            fetcher.clone(),
            classifier.clone(),
            robots,
            config.common_paths.clone(),
            config.enforce_robots,
        );
        Self {
            fetcher,
            classifier,
            locator,
            cache: FeedCache::new(config.cache_ttl(), config.cache_capacity),
        }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    pub fn locator(&self) -> &FeedLocator {
        &self.locator
    }

    /// `true` when `url` itself serves a parseable feed.
    pub async fn check_feed(&self, url: &str) -> bool {
        self.classifier.is_feed(url).await
    }

    /// Resolves `url` to a feed URL. Never fails; see [`Discovery`].
    pub async fn find_feed(&self, url: &str) -> Discovery {
        self.locator.locate(url).await
    }

    /// Returns the feed at `feed_url`, from the cache while fresh.
    ///
    /// On a miss the feed is fetched, parsed and stored, overwriting any stale
    /// entry. Failures are returned without touching the cache.
    pub async fn fetch_and_parse(&self, feed_url: &str) -> Result<Arc<ParsedFeed>, FeedError> {
        if let Some(cached) = self.cache.get(feed_url) {
            tracing::debug!(url = %feed_url, "Feed cache hit");
            return Ok(cached);
        }

        let bytes = self.fetcher.get(feed_url, Accept::Feed).await?;
        let parsed = Arc::new(parse_body(&bytes, feed_url)?);
        self.cache.put(feed_url, Arc::clone(&parsed));

        tracing::info!(url = %feed_url, items = parsed.items.len(), "Feed refreshed");
        Ok(parsed)
    }

    /// Parses a registered source: its resolved feed URL, or the site URL
    /// when discovery has not stored one yet.
    pub async fn parse_feed(&self, source: &FeedSource) -> Result<Arc<ParsedFeed>, FeedError> {
        self.fetch_and_parse(source.effective_url()).await
    }

    /// Parses every source one at a time, in order.
    ///
    /// A failing source is logged and reported in its slot; it never stops
    /// the rest of the batch.
    pub async fn parse_all(
        &self,
        sources: &[FeedSource],
    ) -> Vec<Result<Arc<ParsedFeed>, FeedError>> {
        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let result = self.parse_feed(source).await;
            if let Err(e) = &result {
                tracing::warn!(
                    source = %source.id,
                    url = %source.effective_url(),
                    error = %e,
                    "Failed to parse feed, continuing with the rest"
                );
            }
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Engine Test</title>
    <link>https://site.example/</link>
    <item><guid>a</guid><title>First</title></item>
</channel></rss>"#;

    fn engine() -> FeedEngine {
        let config = Config {
            allow_private_hosts: true,
            ..Config::default()
        };
        FeedEngine::new(&config).unwrap()
    }

    fn source(id: &str, site_url: &str, feed_url: Option<String>) -> FeedSource {
        FeedSource {
            id: id.to_owned(),
            site_url: site_url.to_owned(),
            resolved: feed_url.is_some(),
            feed_url,
        }
    }

    #[tokio::test]
    async fn test_second_parse_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine();
        let url = format!("{}/feed", server.uri());
        let first = engine.fetch_and_parse(&url).await.unwrap();
        let second = engine.fetch_and_parse(&url).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.title, "Engine Test");
        assert_eq!(engine.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let engine = engine();
        let url = format!("{}/feed", server.uri());
        assert!(engine.fetch_and_parse(&url).await.is_err());
        assert!(engine.fetch_and_parse(&url).await.is_err());
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_parse_feed_falls_back_to_site_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let site = format!("{}/", server.uri());
        let parsed = engine()
            .parse_feed(&source("s1", &site, None))
            .await
            .unwrap();
        assert_eq!(parsed.feed_url, site);
    }

    #[tokio::test]
    async fn test_parse_all_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let sources = vec![
            source("a", &server.uri(), Some(format!("{}/broken", server.uri()))),
            source("b", &server.uri(), Some(format!("{}/missing", server.uri()))),
            source("c", &server.uri(), Some(format!("{}/good", server.uri()))),
        ];
        let results = engine().parse_all(&sources).await;

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(FeedError::Parse(_))));
        assert!(matches!(
            results[1],
            Err(FeedError::Fetch(FetchError::HttpStatus(404)))
        ));
        assert_eq!(results[2].as_ref().unwrap().title, "Engine Test");
    }

    #[tokio::test]
    async fn test_check_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let engine = engine();
        assert!(engine.check_feed(&format!("{}/feed", server.uri())).await);
        assert!(!engine.check_feed(&format!("{}/other", server.uri())).await);
    }
}
