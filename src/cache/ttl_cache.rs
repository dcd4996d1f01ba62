use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removals: AtomicU64,
}

/// Concurrent cache whose entries expire `ttl` after insertion.
///
/// When full, an insert first purges expired entries and then evicts the
/// oldest one. Clones share storage.
#[derive(Debug)]
pub struct TtlCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    counters: Arc<Counters>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// A zero TTL means every entry is expired on arrival.
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }

        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.make_room();
        }

        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        self.data.insert(key, entry).map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let lookup = self
            .data
            .get(key)
            .map(|entry| (!entry.is_expired(self.ttl)).then(|| entry.value.clone()));

        // El guard de lectura ya se soltó; se puede remover sin bloquear
        let hit = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                if self
                    .data
                    .remove_if(key, |_, entry| entry.is_expired(self.ttl))
                    .is_some()
                {
                    self.counters.expired_removals.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
            None => None,
        };

        match hit {
            Some(_) => self.counters.hits.fetch_add(1, Ordering::Relaxed),
            None => self.counters.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            self.counters
                .expired_removals
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }
        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expired_removals: self.counters.expired_removals.load(Ordering::Relaxed),
        }
    }

    fn make_room(&self) {
        if self.cleanup_expired() > 0 && self.data.len() < self.capacity {
            return;
        }

        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if self.data.remove(&key).is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            counters: self.counters.clone(),
            capacity: self.capacity,
            ttl: self.ttl,
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removals: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
