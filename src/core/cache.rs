use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache whose entries expire after a time-to-live.
///
/// Every operation holds the map lock for its whole duration, so readers
/// never observe a partially written entry. A miss is always safe: callers
/// recompute from the store or the upstream source.
pub struct TtlCache<K, V> {
    inner: Mutex<HashMap<K, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the value if it has not expired. Expired entries are evicted.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().await;
        let expired = match cache.get(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => {
                debug!("Cache MISS for key: {:?}", key);
                return None;
            }
        };
        if expired {
            debug!("Cache entry expired for key: {:?}", key);
            cache.remove(key);
            return None;
        }
        debug!("Cache HIT for key: {:?}", key);
        cache.get(key).map(|entry| entry.value.clone())
    }

    /// Looks up several keys under one lock and returns only the live hits.
    pub async fn get_many<'a, I>(&self, keys: I) -> HashMap<K, V>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let now = Instant::now();
        let mut cache = self.inner.lock().await;
        let mut hits = HashMap::new();
        for key in keys {
            let Some(entry) = cache.get(key) else {
                continue;
            };
            if entry.is_expired(now) {
                cache.remove(key);
            } else {
                hits.insert(key.clone(), entry.value.clone());
            }
        }
        debug!("Cache batch lookup: {} hits", hits.len());
        hits
    }

    /// Stores `value` until `ttl` elapses, or the default TTL when `None`.
    pub async fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        let mut cache = self.inner.lock().await;
        debug!("Cache SET for key: {:?}", key);
        cache.insert(key, CacheEntry { value, expires_at });
    }

    pub async fn delete(&self, key: &K) {
        let mut cache = self.inner.lock().await;
        cache.remove(key);
        debug!("Cache DELETE for key: {:?}", key);
    }

    pub async fn clear(&self) {
        let mut cache = self.inner.lock().await;
        cache.clear();
        debug!("Cache CLEAR");
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
