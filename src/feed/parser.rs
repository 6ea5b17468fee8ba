use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::charset::{declare_utf8, decode_body};
use super::sanitize::sanitize_xml;
use crate::util::{collapse_whitespace, strip_control_chars};

#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not markup at all (JSON, plain text, binary)
    #[error("not an RSS or Atom document")]
    NotXml,
    /// Feed XML that could not be parsed even after sanitation
    #[error("malformed feed: {0}")]
    Malformed(#[from] feed_rs::parser::ParseFeedError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFeed {
    pub title: String,
    pub description: Option<String>,
    /// Site URL advertised by the feed (not the feed URL itself)
    pub link: Option<String>,
    pub last_build_date: Option<DateTime<Utc>>,
    /// URL this feed was fetched from
    pub feed_url: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub guid: String,
    /// Publish date as epoch milliseconds
    pub pub_date: Option<i64>,
    pub content: Option<String>,
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_content: Option<MediaContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_thumbnail: Option<String>,
}

/// First `media:content` (or RSS enclosure) attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaContent {
    pub url: String,
    pub mime_type: Option<String>,
}

/// Decodes, sanitizes, parses and normalizes a feed body fetched from `feed_url`.
///
/// Only RSS and Atom are accepted. `feed-rs` also reads JSON Feed, so
/// bodies that do not start with markup are turned away before parsing.
pub fn parse_feed(bytes: &[u8], feed_url: &str) -> Result<ParsedFeed, ParseError> {
    let text = decode_body(bytes);
    if !text.trim_start().starts_with('<') {
        return Err(ParseError::NotXml);
    }

    let body = sanitize_xml(&text);
    let body = declare_utf8(&body);
    let feed = feed_rs::parser::parse(body.as_bytes())?;
    Ok(normalize(feed, feed_url))
}

fn clean(text: &str) -> String {
    collapse_whitespace(&strip_control_chars(text))
}

fn normalize(feed: Feed, feed_url: &str) -> ParsedFeed {
    let title = feed
        .title
        .map(|t| clean(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Feed".to_owned());

    let description = feed
        .description
        .map(|d| strip_control_chars(&d.content).trim().to_owned())
        .filter(|d| !d.is_empty());

    // Prefer a link that isn't the feed itself (Atom feeds list rel="self" too)
    let link = feed
        .links
        .iter()
        .map(|l| l.href.as_str())
        .find(|href| *href != feed_url && !href.is_empty())
        .map(str::to_owned);

    let items = feed.entries.into_iter().map(normalize_entry).collect();

    ParsedFeed {
        title,
        description,
        link,
        last_build_date: feed.updated,
        feed_url: feed_url.to_owned(),
        items,
    }
}

fn normalize_entry(entry: Entry) -> FeedItem {
    let link = entry.links.first().map(|l| l.href.clone());
    // Items without a publish date fall back to their last update
    let pub_date = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.timestamp_millis());

    let title = entry
        .title
        .map(|t| clean(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_owned());

    let content = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .filter(|c| !c.trim().is_empty());

    let creator = entry
        .authors
        .first()
        .map(|a| clean(&a.name))
        .filter(|name| !name.is_empty());

    let media_content = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find_map(|c| {
            c.url.as_ref().map(|url| MediaContent {
                url: url.to_string(),
                mime_type: c.content_type.as_ref().map(|m| m.to_string()),
            })
        });

    let media_thumbnail = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .find(|uri| !uri.is_empty());

    let existing_id = if entry.id.is_empty() {
        None
    } else {
        Some(entry.id.as_str())
    };
    let guid = generate_guid(existing_id, link.as_deref(), &title, pub_date);

    FeedItem {
        title,
        link,
        guid,
        pub_date,
        content,
        creator,
        media_content,
        media_thumbnail,
    }
}

fn generate_guid(
    existing: Option<&str>,
    url: Option<&str>,
    title: &str,
    published: Option<i64>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
