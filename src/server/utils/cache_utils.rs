use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// how a store gets rid of entries, picked at startup from config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// keep everything for the process lifetime
    Unbounded,
    /// drop the oldest insert once full
    Capacity(usize),
    /// entries older than this are treated as missing
    Ttl(Duration),
    CapacityAndTtl { capacity: usize, ttl: Duration },
}

impl EvictionPolicy {
    /// 0 means "no bound" for either dimension
    pub fn from_limits(capacity: usize, ttl_secs: u64) -> Self {
        match (capacity, ttl_secs) {
            (0, 0) => Self::Unbounded,
            (capacity, 0) => Self::Capacity(capacity),
            (0, ttl) => Self::Ttl(Duration::from_secs(ttl)),
            (capacity, ttl) => Self::CapacityAndTtl {
                capacity,
                ttl: Duration::from_secs(ttl),
            },
        }
    }

    fn capacity(&self) -> Option<usize> {
        match self {
            Self::Capacity(capacity) | Self::CapacityAndTtl { capacity, .. } => Some(*capacity),
            _ => None,
        }
    }

    fn ttl(&self) -> Option<Duration> {
        match self {
            Self::Ttl(ttl) | Self::CapacityAndTtl { ttl, .. } => Some(*ttl),
            _ => None,
        }
    }
}

pub type DynCacheStore<V> = Arc<dyn CacheStore<V> + Send + Sync>;

/// string keyed store shared between request handlers, concurrent writers to the same key are
/// last-writer-wins
pub trait CacheStore<V> {
    fn get(&self, key: &str) -> Option<V>;

    fn insert(&self, key: &str, value: V);

    fn remove(&self, key: &str) -> Option<V>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct MemoryCacheStore<V> {
    entries: DashMap<String, CacheEntry<V>>,
    policy: EvictionPolicy,
}

impl<V: Clone> MemoryCacheStore<V> {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        self.policy
            .ttl()
            .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl)
    }

    fn purge_expired(&self) {
        if self.policy.ttl().is_some() {
            self.entries.retain(|_, entry| !self.is_expired(entry));
        }
    }

    // capacity is best effort, two concurrent inserts can overshoot by one each
    fn make_room(&self, capacity: usize) {
        self.purge_expired();

        while self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.inserted_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl<V: Clone + Send + Sync> CacheStore<V> for MemoryCacheStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if !self.is_expired(&entry) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }

        // the read guard is gone by now, removing while holding it would deadlock the shard
        self.entries
            .remove_if(key, |_, entry| self.is_expired(entry));
        None
    }

    fn insert(&self, key: &str, value: V) {
        if let Some(capacity) = self.policy.capacity() {
            if capacity == 0 {
                return;
            }
            if !self.entries.contains_key(key) {
                self.make_room(capacity);
            }
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
