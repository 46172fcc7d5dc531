use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key-value store with per-key absolute expiry. Expired entries are removed
/// lazily on access; there is no background sweeper.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    default_ttl: Option<Duration>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(default_ttl: Option<Duration>) -> Self {
        TtlCache {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| &e.value)
    }

    /// Insert with an explicit TTL, or the cache default when `None`.
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>) {
        let ttl = ttl.or(self.default_ttl);
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
    }

    pub fn has(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key; `true` iff a non-expired entry existed.
    pub fn delete(&mut self, key: &K) -> bool {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some(entry) => !entry.is_expired(now),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over non-expired entries. Expired ones are dropped first.
    pub fn iter(&mut self) -> impl Iterator<Item = (&K, &V)> {
        let now = Instant::now();
        self.entries.retain(|_, e| !e.is_expired(now));
        self.entries.iter().map(|(k, e)| (k, &e.value))
    }

    pub fn len(&mut self) -> usize {
        let now = Instant::now();
        self.entries.retain(|_, e| !e.is_expired(now));
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}
