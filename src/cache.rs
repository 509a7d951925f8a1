use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window applied when a `set` supplies no explicit TTL.
const DEFAULT_SLIDING_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Hard ceiling on the lifetime of sliding entries: no matter how often an
/// entry is read, it dies this long after insertion.
const DEFAULT_ABSOLUTE_CEILING: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug)]
enum Expiry {
    /// Entry dies at its deadline, reads notwithstanding.
    Absolute,
    /// Each read pushes the deadline forward by `window`, capped at the
    /// ceiling measured from insertion.
    Sliding { window: Duration },
}

#[derive(Clone, Debug)]
struct Entry<T> {
    value: T,
    inserted_at: Instant,
    deadline: Instant,
    expiry: Expiry,
}

/// Thread-safe in-memory cache with per-entry expiration.
///
/// Backed by a DashMap so reads are concurrent and lock-free for most cases.
/// The map itself is the key index: stale entries are dropped on read and
/// pruned on enumeration, so `list_keys` never reports a key that `get`
/// would refuse to serve. This matters because the cache doubles as an
/// administrative introspection surface, not just a performance layer.
#[derive(Clone, Debug)]
pub struct TtlCache<T: Clone> {
    inner: Arc<DashMap<String, Entry<T>>>,
    sliding_window: Duration,
    absolute_ceiling: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self::with_policy(DEFAULT_SLIDING_WINDOW, DEFAULT_ABSOLUTE_CEILING)
    }

    /// Build a cache with a custom default sliding window and ceiling.
    pub fn with_policy(sliding_window: Duration, absolute_ceiling: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            sliding_window,
            absolute_ceiling,
        }
    }

    /// Insert or update an entry.
    ///
    /// With `Some(ttl)` the entry expires that long from now, full stop.
    /// With `None` it gets the default policy: a sliding window refreshed on
    /// every read, under an absolute ceiling from insertion.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        let now = Instant::now();
        let (deadline, expiry) = match ttl {
            Some(ttl) => (now + ttl, Expiry::Absolute),
            None => (
                now + self.sliding_window.min(self.absolute_ceiling),
                Expiry::Sliding {
                    window: self.sliding_window,
                },
            ),
        };
        self.inner.insert(
            key.into(),
            Entry {
                value,
                inserted_at: now,
                deadline,
                expiry,
            },
        );
    }

    /// Look up a key. Returns a clone of the value if present and fresh.
    /// Reading a sliding entry extends its deadline.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        if let Some(mut entry) = self.inner.get_mut(key) {
            if now >= entry.deadline {
                // Stale — drop the guard before removing
                drop(entry);
                self.inner.remove(key);
                return None;
            }
            if let Expiry::Sliding { window } = entry.expiry {
                entry.deadline = (now + window).min(entry.inserted_at + self.absolute_ceiling);
            }
            return Some(entry.value.clone());
        }
        None
    }

    /// Evict a key. Returns `true` if it was present (fresh or stale).
    pub fn remove(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    /// On a hit, return the cached value. On a miss, run `factory`, store a
    /// produced value under `key` with the given TTL, and return it. A
    /// factory that yields `None` caches nothing, so the next call retries.
    ///
    /// There is no single-flight: concurrent callers racing the same missing
    /// key each run their own factory and the last write wins. Holding a
    /// shard lock across the factory's await would block unrelated keys,
    /// and every factory in this service is a re-derivable read.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(hit) = self.get(key) {
            tracing::debug!("cache hit for '{}'", key);
            return Ok(Some(hit));
        }
        tracing::debug!("cache miss for '{}', running factory", key);
        let produced = factory().await?;
        if let Some(value) = &produced {
            self.set(key, value.clone(), ttl);
        }
        Ok(produced)
    }

    /// Drop every entry. A no-op on an empty cache.
    pub fn clear_all(&self) {
        let count = self.inner.len();
        self.inner.clear();
        tracing::debug!("cache cleared, {} entry(ies) dropped", count);
    }

    /// Point-in-time snapshot of the live keys. Entries past their deadline
    /// are pruned first so the snapshot never contains a dangling key.
    pub fn list_keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.inner.retain(|_, entry| now < entry.deadline);
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of entries currently held, stale ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_value() {
        let cache = TtlCache::new();
        cache.set("k", "v".to_string(), None);
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn get_unknown_key_is_none() {
        let cache: TtlCache<String> = TtlCache::new();
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn remove_evicts_entry() {
        let cache = TtlCache::new();
        cache.set("k", 1u32, None);
        assert!(cache.remove("k"));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.remove("k"));
    }

    #[test]
    fn absolute_ttl_expires() {
        let cache = TtlCache::new();
        cache.set("k", 1u32, Some(Duration::from_millis(20)));
        assert_eq!(cache.get("k"), Some(1));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k"), None, "entry should be stale after TTL");
    }

    #[test]
    fn sliding_reads_extend_the_deadline() {
        let cache = TtlCache::with_policy(Duration::from_millis(60), Duration::from_secs(10));
        cache.set("k", 1u32, None);

        // Keep touching the entry more often than the window
        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(30));
            assert_eq!(cache.get("k"), Some(1));
        }

        // Now let the window lapse without a read
        std::thread::sleep(Duration::from_millis(90));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn sliding_entries_respect_the_ceiling() {
        let cache = TtlCache::with_policy(Duration::from_millis(40), Duration::from_millis(100));
        cache.set("k", 1u32, None);

        // Constant reads cannot keep the entry alive past the ceiling
        for _ in 0..8 {
            std::thread::sleep(Duration::from_millis(25));
            cache.get("k");
        }
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn clear_all_empties_the_index() {
        let cache = TtlCache::new();
        cache.set("a", 1u32, None);
        cache.set("b", 2u32, None);
        cache.clear_all();
        assert!(cache.list_keys().is_empty());
        assert!(cache.is_empty());

        // Clearing an already-empty cache is fine
        cache.clear_all();
    }

    #[test]
    fn list_keys_never_returns_dangling_keys() {
        let cache = TtlCache::new();
        cache.set("fresh", 1u32, Some(Duration::from_secs(60)));
        cache.set("stale", 2u32, Some(Duration::from_millis(10)));

        std::thread::sleep(Duration::from_millis(30));

        let keys = cache.list_keys();
        assert_eq!(keys, vec!["fresh".to_string()]);
        for key in keys {
            assert!(cache.get(&key).is_some());
        }
    }

    #[tokio::test]
    async fn get_or_create_runs_factory_once_per_miss() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = TtlCache::new();
        let calls = AtomicUsize::new(0);

        let value = cache
            .get_or_create("k", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(Some(7u32))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(7));

        // Hit: the factory must not run again
        let value = cache
            .get_or_create("k", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(Some(0u32))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_or_create_propagates_factory_errors() {
        let cache: TtlCache<u32> = TtlCache::new();
        let result = cache
            .get_or_create("k", None, || async { Err::<Option<u32>, _>("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test]
    async fn get_or_create_does_not_cache_absent_results() {
        let cache: TtlCache<u32> = TtlCache::new();

        let value = cache
            .get_or_create("k", None, || async { Ok::<_, ()>(None) })
            .await
            .unwrap();
        assert_eq!(value, None);
        assert!(cache.list_keys().is_empty());

        // The next call retries the factory
        let value = cache
            .get_or_create("k", None, || async { Ok::<_, ()>(Some(3u32)) })
            .await
            .unwrap();
        assert_eq!(value, Some(3));
    }
}
