use super::fetcher::{Accept, Fetcher};
use super::parser::{parse_feed, ParsedFeed};
use super::FeedError;

/// Decides whether a URL serves a parseable RSS/Atom document.
#[derive(Debug, Clone)]
pub struct FeedClassifier {
    fetcher: Fetcher,
}

impl FeedClassifier {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    /// Fetches `url` and parses it as a feed, reporting why it is not one.
    ///
    /// An envelope with no title and no items still counts as a feed.
    pub async fn classify(&self, url: &str) -> Result<ParsedFeed, FeedError> {
        let bytes = self.fetcher.get(url, Accept::Feed).await?;
        Ok(parse_feed(&bytes, url)?)
    }

    /// Fail-closed boolean form of [`classify`](Self::classify).
    ///
    /// Every failure (network, status, size, parse) means "not a feed". No retry.
    pub async fn is_feed(&self, url: &str) -> bool {
        match self.classify(url).await {
            Ok(feed) => {
                tracing::debug!(url = %url, items = feed.items.len(), "Valid feed");
                true
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Not a valid feed");
                false
            }
        }
    }
}
