//! Feed classification, discovery, parsing and caching.
//!
//! - [`FeedClassifier`] decides whether a URL serves a parseable RSS/Atom document
//! - [`RobotsChecker`] fetches and evaluates robots.txt (fail-open)
//! - [`FeedLocator`] resolves a site URL to a feed URL through an ordered
//!   [`Strategy`] list, first success wins
//! - [`FeedCache`] holds parsed feeds with a TTL and an LRU bound
//! - [`parse_feed`] decodes, sanitizes and normalizes raw feed bytes, and
//!   [`merge_and_sort`] builds a newest-first timeline across feeds
//!
//! Everything goes through one shared [`Fetcher`].

mod aggregate;
mod cache;
mod charset;
mod classifier;
mod discovery;
mod fetcher;
mod parser;
mod robots;
mod sanitize;

use thiserror::Error;

pub use aggregate::{merge_and_sort, merge_tagged, FeedSourceRef, MergedItem};
pub use cache::FeedCache;
pub use classifier::FeedClassifier;
pub use discovery::{Discovery, FeedLocator, Strategy, DEFAULT_STRATEGIES};
pub use fetcher::{Accept, FetchError, Fetcher};
pub use parser::{parse_feed, FeedItem, MediaContent, ParseError, ParsedFeed};
pub use robots::{RobotsChecker, RobotsRules};
pub use sanitize::sanitize_xml;

/// Why a URL could not be turned into a [`ParsedFeed`].
///
/// Lets callers tell "could not even fetch it" apart from "fetched, but it is
/// not a feed".
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}
