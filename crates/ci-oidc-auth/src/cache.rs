//! Time-bounded document cache
//!
//! Maps a key (an issuer URL) to the last successfully fetched document and
//! the instant it was fetched. An entry is served while it is younger than the
//! TTL and replaced wholesale on the next fetch after that.
//!
//! # Concurrency
//!
//! Each key owns a slot guarded by an async mutex. A caller that finds the slot
//! empty or expired fetches while holding the slot, so concurrent misses for the
//! same issuer produce one outbound request; the others wait and then read the
//! freshly stored document. Different issuers never wait on each other.
//!
//! Failed fetches are not stored: the next caller retries immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default TTL for discovery documents and key sets (1 hour)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cached document with its fetch time
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// When the document was fetched
    pub fetched_at: Instant,
    /// The document
    pub document: V,
}

impl<V> CacheEntry<V> {
    /// Whether the entry is still fresh under `ttl`
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

type Slot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

/// Generic key → document cache with a fixed TTL
///
/// # Example
///
/// ```rust
/// # use ci_oidc_auth::cache::DocumentCache;
/// # use std::time::Duration;
/// # tokio_test::block_on(async {
/// let cache: DocumentCache<String> = DocumentCache::new(Duration::from_secs(3600));
///
/// let doc = cache
///     .get_or_fetch("https://issuer.example", || async {
///         Ok::<_, std::io::Error>("document".to_string())
///     })
///     .await?;
/// assert_eq!(doc, "document");
/// # Ok::<(), std::io::Error>(())
/// # });
/// ```
#[derive(Debug)]
pub struct DocumentCache<V> {
    slots: DashMap<String, Slot<V>>,
    ttl: Duration,
}

impl<V: Clone> DocumentCache<V> {
    /// Create an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
        }
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached document for `key`, or run `fetch` and cache its result
    ///
    /// # Errors
    ///
    /// Returns whatever `fetch` returns on failure. Nothing is cached in that case.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref()
            && entry.is_fresh(self.ttl)
        {
            debug!(key, "document cache hit");
            return Ok(entry.document.clone());
        }

        debug!(key, "document cache miss");
        let document = fetch().await?;

        *guard = Some(CacheEntry {
            fetched_at: Instant::now(),
            document: document.clone(),
        });

        Ok(document)
    }

    /// Store a document as if it had been fetched at `fetched_at`
    ///
    /// Lets callers build pre-seeded caches, e.g. with an entry that is
    /// already close to expiry.
    pub async fn insert_at(&self, key: &str, fetched_at: Instant, document: V) {
        let slot = self.slot(key);
        *slot.lock().await = Some(CacheEntry {
            fetched_at,
            document,
        });
    }

    /// Number of keys that have a slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no key has been seen yet
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: &str) -> Slot<V> {
        // Clone the Arc out so the shard lock is released before awaiting.
        Arc::clone(
            self.slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .value(),
        )
    }
}

impl<V: Clone> Default for DocumentCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
