use parking_lot::{Mutex, RwLock};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Cache LRU com expiração por entrada
pub struct TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    entries: Mutex<lru::LruCache<K, CacheEntry<V>>>,
    stats: RwLock<CacheStats>,
    ttl: Duration,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Estatísticas de cache
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub inserts: usize,
    pub evictions: usize,
    pub expirations: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Cria um cache com capacidade e TTL especificados; capacidade zero vira 1
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
            stats: RwLock::new(CacheStats::default()),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        let hit = entries
            .get(key)
            .map(|entry| (entry.expires_at > now, entry.value.clone()));

        match hit {
            Some((true, value)) => {
                self.stats.write().hits += 1;
                Some(value)
            }
            Some((false, _)) => {
                entries.pop(key);
                self.stats.write().expirations += 1;
                None
            }
            None => {
                self.stats.write().misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        let expires_at = Instant::now() + self.ttl;

        // `push` devolve a entrada substituída ou a menos usada que saiu
        if let Some((old_key, _)) = entries.push(key.clone(), CacheEntry { value, expires_at }) {
            if old_key != key {
                self.stats.write().evictions += 1;
            }
        }

        self.stats.write().inserts += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = TtlCache::new(4, Duration::ZERO);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.is_empty());
    }
}
