//! Short-lived in-memory caches owned by the router.
//!
//! The store is the source of truth; these hold only transient state that
//! never needs to survive a restart: the self-echo dedup window and the
//! tool-input entries behind "Details" buttons.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Key-value cache whose entries expire after a fixed TTL.
///
/// Expired entries are swept on every insert, so the cache stays bounded
/// by the insert rate over one TTL window.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (V, Instant)>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    /// Create a cache with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Insert an entry, sweeping expired ones first.
    pub fn insert(&mut self, key: K, value: V) {
        let now = Instant::now();
        self.entries
            .retain(|_, (_, deadline)| *deadline > now);
        self.entries.insert(key, (value, now + self.ttl));
    }

    /// Fetch a live entry.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|(value, deadline)| {
            if *deadline > Instant::now() {
                Some(value)
            } else {
                None
            }
        })
    }

    /// Remove an entry, returning it if it was still live.
    pub fn take(&mut self, key: &K) -> Option<V> {
        let (value, deadline) = self.entries.remove(key)?;
        if deadline > Instant::now() {
            Some(value)
        } else {
            None
        }
    }

    /// Number of entries, counting not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Membership set with a TTL per entry; used for self-echo suppression.
#[derive(Debug)]
pub struct TtlSet<K: Eq + Hash> {
    inner: TtlCache<K, ()>,
}

impl<K: Eq + Hash> TtlSet<K> {
    /// Create a set with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(ttl),
        }
    }

    /// Record a key.
    pub fn insert(&mut self, key: K) {
        self.inner.insert(key, ());
    }

    /// Remove a key, reporting whether it was live; one suppression per
    /// recorded injection.
    pub fn take(&mut self, key: &K) -> bool {
        self.inner.take(key).is_some()
    }

    /// Non-consuming membership check.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.get(key).is_some()
    }
}
