//! Bounded, time-expiring in-memory cache.
//!
//! [`TtlCache`] is a lock-protected map with two limits:
//!
//! - **TTL**: entries older than the configured lifetime are treated as
//!   absent. Expiry is checked lazily on read and swept on write; there is no
//!   background task.
//! - **Capacity**: inserting a new key into a full cache evicts the entry
//!   that was inserted earliest. Re-inserting an existing key replaces its
//!   value and moves it to the back of the queue.
//!
//! [`PageCache`] partitions storage into [`Namespace`]s (full renders and
//! derived text views), each its own `TtlCache`, so one namespace filling up
//! never evicts entries of the other.
//!
//! Time is read from [`tokio::time::Instant`] so tests can drive expiry with a
//! paused clock.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::RepoLocator;
use crate::browser::RenderedPage;

/// Hit/miss counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
    /// Live entries at the time of the snapshot (may include not-yet-swept
    /// expired entries).
    pub size: usize,
}

struct Slot<V> {
    value: V,
    inserted_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Slot<V>>,
    order: VecDeque<K>,
    stats: CacheStats,
}

/// Lock-protected map with TTL expiry and insertion-order eviction.
pub struct TtlCache<K, V> {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    ///
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // A panic mid-update leaves at worst a stale entry; keep serving.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, slot: &Slot<V>, now: Instant) -> bool {
        now.saturating_duration_since(slot.inserted_at) >= self.ttl
    }

    /// Return a clone of the live value under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            },
            Some(slot) => self.is_expired(slot, now),
        };

        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return None;
        }

        inner.stats.hits += 1;
        inner.entries.get(key).map(|slot| slot.value.clone())
    }

    /// Store `value` under `key`, evicting the oldest insertion if full.
    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let mut inner = self.lock();

        self.sweep(&mut inner, now);

        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        } else {
            while inner.entries.len() >= self.capacity {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            Slot {
                value,
                inserted_at: now,
            },
        );
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            size: inner.entries.len(),
            ..inner.stats
        }
    }

    fn sweep(&self, inner: &mut Inner<K, V>, now: Instant) {
        let before = inner.entries.len();
        inner.entries.retain(|_, slot| now.saturating_duration_since(slot.inserted_at) < self.ttl);
        let swept = before - inner.entries.len();
        if swept > 0 {
            let Inner { entries, order, .. } = inner;
            order.retain(|k| entries.contains_key(k));
            inner.stats.expirations += swept as u64;
        }
    }
}

/// Cache partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Full rendered HTML snapshots.
    Rendered,
    /// Text views derived from a render (topic lists, full markdown).
    Derived,
}

/// Key of a cached item: repository plus an optional view discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Partition the key lives in.
    pub namespace: Namespace,
    /// Canonical repository key.
    pub locator: String,
    /// View name for derived entries.
    pub view: Option<String>,
}

impl CacheKey {
    /// Key of the full render of `locator`.
    pub fn rendered(locator: &RepoLocator) -> Self {
        Self {
            namespace: Namespace::Rendered,
            locator: locator.key(),
            view: None,
        }
    }

    /// Key of a derived view of `locator`, e.g. `"topics"`.
    pub fn derived(locator: &RepoLocator, view: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Derived,
            locator: locator.key(),
            view: Some(view.into()),
        }
    }
}

/// Process-wide page cache with one [`TtlCache`] per namespace.
pub struct PageCache {
    rendered: TtlCache<CacheKey, Arc<RenderedPage>>,
    derived: TtlCache<CacheKey, Arc<str>>,
}

impl PageCache {
    /// Both namespaces share the same capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            rendered: TtlCache::new(capacity, ttl),
            derived: TtlCache::new(capacity, ttl),
        }
    }

    /// Cached render of `locator`.
    #[tracing::instrument(skip(self), fields(key = %locator.key()))]
    pub fn page(&self, locator: &RepoLocator) -> Option<Arc<RenderedPage>> {
        let hit = self.rendered.get(&CacheKey::rendered(locator));
        tracing::debug!(hit = hit.is_some(), "rendered cache lookup");
        hit
    }

    /// Store a fresh render, replacing any previous one.
    pub fn store_page(&self, locator: &RepoLocator, page: Arc<RenderedPage>) {
        self.rendered.put(CacheKey::rendered(locator), page);
    }

    /// Cached text view.
    pub fn view(&self, locator: &RepoLocator, view: &str) -> Option<Arc<str>> {
        self.derived.get(&CacheKey::derived(locator, view))
    }

    /// Store a text view.
    pub fn store_view(&self, locator: &RepoLocator, view: &str, text: Arc<str>) {
        self.derived.put(CacheKey::derived(locator, view), text);
    }

    /// Counters per namespace.
    pub fn stats(&self) -> (CacheStats, CacheStats) {
        (self.rendered.stats(), self.derived.stats())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page(html: &str) -> Arc<RenderedPage> {
        Arc::new(RenderedPage::new("https://codewiki.google/github.com/a/b", html))
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_returns_identical_html() {
        let cache = PageCache::new(4, Duration::from_secs(60));
        let loc = RepoLocator::parse("a/b").unwrap();
        let html = "<html><body><h1>Überblick</h1>\u{00a0}</body></html>";

        cache.store_page(&loc, page(html));
        let cached = cache.page(&loc).unwrap();

        assert_eq!(cached.html.as_bytes(), html.as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, Duration::from_secs(10));
        cache.put("k", 1);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&"k"), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.stats().size, 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest_insertion() {
        let cache: TtlCache<u32, u32> = TtlCache::new(3, Duration::from_secs(60));
        for k in 0..3 {
            cache.put(k, k);
        }
        // Reading does not refresh insertion order.
        assert_eq!(cache.get(&0), Some(0));

        cache.put(3, 3);

        assert_eq!(cache.get(&0), None);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.get(&3), Some(3));
        assert_eq!(cache.stats().size, 3);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinsert_moves_key_to_back() {
        let cache: TtlCache<u32, &str> = TtlCache::new(2, Duration::from_secs(60));
        cache.put(1, "a");
        cache.put(2, "b");
        cache.put(1, "a2");
        cache.put(3, "c");

        assert_eq!(cache.get(&1), Some("a2"));
        assert_eq!(cache.get(&2), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_swept_before_evicting() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(5));
        cache.put(1, 1);
        tokio::time::advance(Duration::from_secs(3)).await;
        cache.put(2, 2);
        tokio::time::advance(Duration::from_secs(3)).await;

        // Key 1 has expired, so inserting 3 must not evict the live key 2.
        cache.put(3, 3);
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.get(&3), Some(3));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespaces_do_not_shadow_each_other() {
        let cache = PageCache::new(1, Duration::from_secs(60));
        let loc = RepoLocator::parse("a/b").unwrap();

        cache.store_page(&loc, page("<p>full</p>"));
        cache.store_view(&loc, "topics", Arc::from("# topics"));

        assert!(cache.page(&loc).is_some());
        assert_eq!(cache.view(&loc, "topics").as_deref(), Some("# topics"));
        assert!(cache.view(&loc, "contents").is_none());
    }
}
