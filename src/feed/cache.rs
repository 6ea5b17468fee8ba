use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::parser::ParsedFeed;

struct CacheEntry {
    fetched_at: Instant,
    data: Arc<ParsedFeed>,
}

/// Parsed feeds keyed by feed URL.
///
/// An entry is fresh while `now - fetched_at < ttl`. Stale entries are not
/// swept: a `get` on one is a miss and the next `put` overwrites it. Growth
/// is bounded by an LRU capacity. The mutex is never held across an await.
pub struct FeedCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl FeedCache {
    /// A zero capacity is raised to one.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        // A panic while holding the lock cannot leave an entry half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the cached feed if it is still fresh.
    pub fn get(&self, feed_url: &str) -> Option<Arc<ParsedFeed>> {
        let mut entries = self.lock();
        let entry = entries.get(feed_url)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(Arc::clone(&entry.data))
        } else {
            None
        }
    }

    /// Stores `data` under `feed_url`, replacing any previous entry.
    pub fn put(&self, feed_url: &str, data: Arc<ParsedFeed>) {
        let entry = CacheEntry {
            fetched_at: Instant::now(),
            data,
        };
        if let Some((evicted, _)) = self.lock().push(feed_url.to_owned(), entry) {
            if evicted != feed_url {
                tracing::debug!(evicted = %evicted, "Feed cache full, evicted least recently used");
            }
        }
    }

    /// Number of entries held, fresh or stale.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl std::fmt::Debug for FeedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedCache")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}
