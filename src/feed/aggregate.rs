use serde::Serialize;

use super::parser::{FeedItem, ParsedFeed};

/// Back-reference from a merged item to the feed it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSourceRef {
    pub title: String,
    pub site_url: Option<String>,
    pub feed_url: String,
}

impl FeedSourceRef {
    /// Back-reference built from the feed document alone; `site_url` is the
    /// feed's own `<link>`.
    pub fn from_feed(feed: &ParsedFeed) -> Self {
        Self {
            title: feed.title.clone(),
            site_url: feed.link.clone(),
            feed_url: feed.feed_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedItem {
    #[serde(flatten)]
    pub item: FeedItem,
    pub feed_source: FeedSourceRef,
}

/// Flattens the items of several feeds into one timeline, most recent first.
///
/// The sort is stable, so equal dates keep input order. Items without a
/// publish date go last.
pub fn merge_and_sort<'a, I>(feeds: I) -> Vec<MergedItem>
where
    I: IntoIterator<Item = &'a ParsedFeed>,
{
    merge_tagged(feeds.into_iter().map(|feed| (feed, FeedSourceRef::from_feed(feed))))
}

/// [`merge_and_sort`] with a caller-supplied back-reference per feed, for
/// callers that know more about a feed than its document says.
pub fn merge_tagged<'a, I>(feeds: I) -> Vec<MergedItem>
where
    I: IntoIterator<Item = (&'a ParsedFeed, FeedSourceRef)>,
{
    let mut merged: Vec<MergedItem> = feeds
        .into_iter()
        .flat_map(|(feed, source)| {
            feed.items.iter().map(move |item| MergedItem {
                item: item.clone(),
                feed_source: source.clone(),
            })
        })
        .collect();

    // Option orders None below Some, so reversing puts undated items last
    merged.sort_by(|a, b| b.item.pub_date.cmp(&a.item.pub_date));
    merged
}
