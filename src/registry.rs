//! Registration and maintenance of user-supplied feed sources.
//!
//! Feed records live in an external linked-data store and re-checks are
//! driven by an external scheduler. Both are reached through the
//! [`FeedStore`] and [`Scheduler`] traits; this module only decides what to
//! read, patch and schedule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::engine::FeedEngine;
use crate::feed::{merge_tagged, FeedSourceRef, MergedItem};

/// Predicate holding the site URL a user registered.
pub const AS_URL: &str = "https://www.w3.org/ns/activitystreams#url";
/// Predicate holding the resolved feed URL.
pub const AS_LINK: &str = "https://www.w3.org/ns/activitystreams#link";
/// Predicate holding the human-readable status line.
pub const AS_SUMMARY: &str = "https://www.w3.org/ns/activitystreams#summary";

/// Persistence collaborator holding feed records.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Returns the container body; records are under `ldp:contains`.
    async fn list(&self, container_uri: &str, filters: &Value, actor_uri: &str)
        -> anyhow::Result<Value>;

    async fn post(&self, container_uri: &str, resource: Value, actor_uri: &str)
        -> anyhow::Result<()>;

    async fn patch(&self, resource_uri: &str, triples_to_add: &[Triple], actor_uri: &str)
        -> anyhow::Result<()>;
}

/// Collaborator that calls `action_name` back at `time`.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn set(
        &self,
        key: &[String],
        time: DateTime<Utc>,
        action_name: &str,
        params: Value,
    ) -> anyhow::Result<()>;
}

/// A statement to add to a record. `object` is always a literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn literal(subject: &str, predicate: &str, object: impl Into<String>) -> Self {
        Self {
            subject: subject.to_owned(),
            predicate: predicate.to_owned(),
            object: object.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed feed record: {0}")]
    MalformedRecord(String),

    #[error("feed store request failed: {0:#}")]
    Store(anyhow::Error),

    #[error("scheduler request failed: {0:#}")]
    Scheduler(anyhow::Error),
}

/// A user-registered site, with the feed URL discovery stored for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSource {
    pub id: String,
    pub site_url: String,
    pub feed_url: Option<String>,
    pub resolved: bool,
}

impl FeedSource {
    /// Reads a stored record. Older records use `apods:url` / `apods:feedUrl`
    /// instead of `as:url` / `as:link`.
    ///
    /// Registration stores the site URL itself when no feed was found, so a
    /// link equal to the site URL reads back as unresolved. A site that is
    /// its own feed is marked resolved again by the next [`Registry::recheck`].
    pub fn from_record(record: &Value) -> Result<Self, RegistryError> {
        let id = text_field(record, &["id", "@id"])
            .ok_or_else(|| RegistryError::MalformedRecord("record has no id".to_owned()))?;
        let site_url = text_field(record, &["as:url", AS_URL, "apods:url"])
            .ok_or_else(|| RegistryError::MalformedRecord(format!("{id} has no site URL")))?;
        let feed_url = text_field(record, &["as:link", AS_LINK, "apods:feedUrl"]);

        Ok(Self {
            resolved: feed_url.as_deref().is_some_and(|feed| feed != site_url),
            id,
            site_url,
            feed_url,
        })
    }

    /// The URL to fetch: the stored feed URL, else the site URL.
    pub fn effective_url(&self) -> &str {
        self.feed_url.as_deref().unwrap_or(&self.site_url)
    }
}

/// First non-empty string among `keys`. JSON-LD values may also be wrapped
/// as `{"@id": ..}` or `{"@value": ..}`.
fn text_field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .filter_map(|value| match value {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map
                .get("@id")
                .or_else(|| map.get("@value"))
                .and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Container holding the feed records
    pub container_uri: String,
    /// Where the container is created when missing
    pub parent_container_uri: String,
    pub resource_type: String,
    /// Action the scheduler calls back for a re-check
    pub check_action: String,
    pub actor_uri: String,
}

impl RegistrySettings {
    pub fn for_pod(pod_url: &str, actor_uri: &str) -> Self {
        let pod_url = pod_url.trim_end_matches('/');
        Self {
            container_uri: format!("{pod_url}/data/as/service"),
            parent_container_uri: format!("{pod_url}/data"),
            resource_type: "as:Service".to_owned(),
            check_action: "feeds.recheck".to_owned(),
            actor_uri: actor_uri.to_owned(),
        }
    }
}

pub struct Registry {
    engine: Arc<FeedEngine>,
    store: Arc<dyn FeedStore>,
    scheduler: Arc<dyn Scheduler>,
    settings: RegistrySettings,
}

impl Registry {
    pub fn new(
        engine: Arc<FeedEngine>,
        store: Arc<dyn FeedStore>,
        scheduler: Arc<dyn Scheduler>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            engine,
            store,
            scheduler,
            settings,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Creates the record container if listing it fails. Never returns an
    /// error: a failed creation is logged and later calls will surface it.
    pub async fn ensure_container(&self) {
        let settings = &self.settings;
        match self
            .store
            .list(&settings.container_uri, &json!({}), &settings.actor_uri)
            .await
        {
            Ok(_) => tracing::debug!(container = %settings.container_uri, "Feed container exists"),
            Err(e) => {
                tracing::info!(container = %settings.container_uri, error = %e, "Creating feed container");
                let container = json!({
                    "@context": "https://www.w3.org/ns/activitystreams",
                    "@type": "ldp:Container",
                    "apods:type": settings.resource_type,
                });
                if let Err(e) = self
                    .store
                    .post(&settings.parent_container_uri, container, &settings.actor_uri)
                    .await
                {
                    tracing::error!(container = %settings.container_uri, error = %e, "Failed to create feed container");
                }
            }
        }
    }

    /// Handles a newly created record: resolves its feed URL, stores it
    /// with a status summary, and schedules a re-check.
    ///
    /// When discovery finds nothing the original site URL is stored.
    pub async fn register(&self, record: &Value) -> Result<FeedSource, RegistryError> {
        let result = self.register_inner(record).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Feed registration failed");
        }
        result
    }

    async fn register_inner(&self, record: &Value) -> Result<FeedSource, RegistryError> {
        let source = FeedSource::from_record(record)?;
        tracing::info!(id = %source.id, url = %source.site_url, "Registering feed source");

        let discovery = self.engine.find_feed(&source.site_url).await;
        if !discovery.is_resolved() {
            tracing::warn!(id = %source.id, url = %source.site_url, "No feed found, storing site URL");
        }
        let feed_url = discovery.url().to_owned();

        let triples = [
            Triple::literal(&source.id, AS_LINK, feed_url.as_str()),
            Triple::literal(&source.id, AS_SUMMARY, format!("RSS Feed: {}", source.site_url)),
        ];
        self.store
            .patch(&source.id, &triples, &self.settings.actor_uri)
            .await
            .map_err(RegistryError::Store)?;

        let key = [source.id.clone(), "check".to_owned()];
        self.scheduler
            .set(
                &key,
                Utc::now(),
                &self.settings.check_action,
                json!({ "feed": record }),
            )
            .await
            .map_err(RegistryError::Scheduler)?;

        Ok(FeedSource {
            feed_url: Some(feed_url),
            resolved: discovery.is_resolved(),
            ..source
        })
    }

    /// Scheduled re-check: keeps the stored feed URL while it still parses,
    /// otherwise rediscovers and patches the record if the result changed.
    pub async fn recheck(&self, record: &Value) -> Result<FeedSource, RegistryError> {
        let source = FeedSource::from_record(record)?;

        if let Some(feed_url) = &source.feed_url {
            if self.engine.check_feed(feed_url).await {
                tracing::debug!(id = %source.id, url = %feed_url, "Stored feed still valid");
                return Ok(FeedSource {
                    resolved: true,
                    ..source
                });
            }
        }

        let discovery = self.engine.find_feed(&source.site_url).await;
        if source.feed_url.as_deref() == Some(discovery.url()) {
            tracing::info!(id = %source.id, url = %discovery.url(), "Feed still unresolved");
            return Ok(FeedSource {
                resolved: discovery.is_resolved(),
                ..source
            });
        }

        tracing::info!(id = %source.id, url = %discovery.url(), "Feed URL changed, updating record");
        let triple = Triple::literal(&source.id, AS_LINK, discovery.url());
        self.store
            .patch(&source.id, &[triple], &self.settings.actor_uri)
            .await
            .map_err(RegistryError::Store)?;

        Ok(FeedSource {
            resolved: discovery.is_resolved(),
            feed_url: Some(discovery.into_url()),
            ..source
        })
    }

    /// Lists the stored records. Malformed ones are logged and skipped.
    pub async fn load_sources(&self) -> Result<Vec<FeedSource>, RegistryError> {
        let settings = &self.settings;
        let filters = json!({ "type": settings.resource_type });
        let body = self
            .store
            .list(&settings.container_uri, &filters, &settings.actor_uri)
            .await
            .map_err(RegistryError::Store)?;

        // A single-member container may be compacted to an object
        let records = match body.get("ldp:contains") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(single @ Value::Object(_)) => std::slice::from_ref(single),
            _ => &[],
        };

        let sources: Vec<FeedSource> = records
            .iter()
            .filter_map(|record| match FeedSource::from_record(record) {
                Ok(source) => Some(source),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping feed record");
                    None
                }
            })
            .collect();

        tracing::info!(count = sources.len(), "Loaded feed sources");
        Ok(sources)
    }

    /// Newest-first timeline across every stored source. Sources that fail
    /// to fetch or parse are left out.
    ///
    /// Each item's `feed_source.site_url` is the site the user registered,
    /// not the feed's own `<link>`.
    pub async fn articles(&self) -> Result<Vec<MergedItem>, RegistryError> {
        let sources = self.load_sources().await?;
        let results = self.engine.parse_all(&sources).await;
        let feeds: Vec<_> = sources
            .iter()
            .zip(results)
            .filter_map(|(source, result)| result.ok().map(|feed| (source, feed)))
            .collect();

        Ok(merge_tagged(feeds.iter().map(|(source, feed)| {
            let tag = FeedSourceRef {
                site_url: Some(source.site_url.clone()),
                ..FeedSourceRef::from_feed(feed)
            };
            (Arc::as_ref(feed), tag)
        })))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("engine", &self.engine)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
