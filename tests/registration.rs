//! Registry flows against an in-memory store and scheduler, with feeds
//! served by wiremock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedscout::registry::{FeedStore, Registry, RegistrySettings, Scheduler, Triple, AS_LINK};
use feedscout::{Config, FeedEngine};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<Value>>,
    patches: Mutex<Vec<(String, Vec<Triple>)>>,
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn list(&self, _: &str, _: &Value, _: &str) -> anyhow::Result<Value> {
        let records = self.records.lock().unwrap().clone();
        Ok(json!({ "ldp:contains": records }))
    }

    async fn post(&self, _: &str, _: Value, _: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn patch(&self, uri: &str, triples: &[Triple], _: &str) -> anyhow::Result<()> {
        self.patches
            .lock()
            .unwrap()
            .push((uri.to_owned(), triples.to_vec()));
        Ok(())
    }
}

struct FailingScheduler;

#[async_trait]
impl Scheduler for FailingScheduler {
    async fn set(&self, _: &[String], _: DateTime<Utc>, _: &str, _: Value) -> anyhow::Result<()> {
        anyhow::bail!("timer service unavailable")
    }
}

struct NoopScheduler;

#[async_trait]
impl Scheduler for NoopScheduler {
    async fn set(&self, _: &[String], _: DateTime<Utc>, _: &str, _: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

fn rss(title: &str, item: &str, date: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>{title}</title><link>https://mirror.example/</link>
<item><guid>{item}</guid><title>{item}</title><pubDate>{date}</pubDate></item>
</channel></rss>"#
    )
}

fn registry(store: Arc<MemoryStore>, scheduler: Arc<dyn Scheduler>) -> Registry {
    let config = Config {
        allow_private_hosts: true,
        ..Config::default()
    };
    Registry::new(
        Arc::new(FeedEngine::new(&config).unwrap()),
        store,
        scheduler,
        RegistrySettings::for_pod("http://pod.example", "http://pod.example/alice"),
    )
}

#[tokio::test]
async fn test_articles_merge_and_isolate_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/older"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(
            "Older",
            "jan-1",
            "Mon, 01 Jan 2024 00:00:00 GMT",
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/newer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(
            "Newer",
            "jan-2",
            "Tue, 02 Jan 2024 00:00:00 GMT",
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/not-a-feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>hi</body></html>"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::default());
    *store.records.lock().unwrap() = ["/older", "/down", "/not-a-feed", "/newer"]
        .iter()
        .enumerate()
        .map(|(i, route)| {
            json!({
                "id": format!("http://pod.example/data/as/service/{i}"),
                "as:url": format!("{}/site-{i}", server.uri()),
                "as:link": format!("{}{}", server.uri(), route),
            })
        })
        .collect();

    let items = registry(store, Arc::new(NoopScheduler)).articles().await.unwrap();

    let titles: Vec<&str> = items.iter().map(|m| m.item.title.as_str()).collect();
    assert_eq!(titles, vec!["jan-2", "jan-1"]);
    assert_eq!(items[0].feed_source.title, "Newer");
    assert_eq!(items[0].feed_source.feed_url, format!("{}/newer", server.uri()));
    // The registered site, not the feed's own <link>
    assert_eq!(
        items[0].feed_source.site_url,
        Some(format!("{}/site-3", server.uri()))
    );
    assert_eq!(
        items[1].feed_source.site_url,
        Some(format!("{}/site-0", server.uri()))
    );
}

#[tokio::test]
async fn test_register_direct_feed_keeps_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(
            "Direct",
            "x",
            "Mon, 01 Jan 2024 00:00:00 GMT",
        )))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::default());
    let registry = registry(Arc::clone(&store), Arc::new(NoopScheduler));
    let feed_url = format!("{}/feed.xml", server.uri());

    let source = registry
        .register(&json!({ "id": "r1", "as:url": feed_url }))
        .await
        .unwrap();

    assert_eq!(source.feed_url.as_deref(), Some(feed_url.as_str()));
    let patches = store.patches.lock().unwrap();
    assert_eq!(patches[0].0, "r1");
    assert_eq!(patches[0].1[0], Triple::literal("r1", AS_LINK, feed_url.as_str()));
}

#[tokio::test]
async fn test_register_surfaces_scheduler_failure() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::default());
    let registry = registry(Arc::clone(&store), Arc::new(FailingScheduler));

    let result = registry
        .register(&json!({ "id": "r2", "as:url": server.uri() }))
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("timer service unavailable"));
    // The record was still patched before scheduling failed
    assert_eq!(store.patches.lock().unwrap().len(), 1);
}
