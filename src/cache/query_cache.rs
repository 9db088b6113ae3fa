use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::debug;

use crate::core::types::ResourceKey;

/// One memoized existence answer.
#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    found: bool,
    computed_at: SystemTime,
}

/// Per-source bucket. `populated_at` tracks the most recent write so that
/// staleness against the file's modification time is a single comparison,
/// not a per-entry scan.
struct KeyBucket {
    populated_at: SystemTime,
    entries: HashMap<String, CacheEntry>,
}

/// Memoized "does variable X exist in source K" answers.
///
/// Writers race harmlessly: the same query on the same data always yields the
/// same answer, so concurrent misses may each hit the backend once and both
/// store the identical value. Entries never outlive the pooled resource that
/// produced them; the pool clears a key's bucket whenever it evicts or
/// invalidates that resource.
pub struct QueryCache {
    buckets: RwLock<HashMap<ResourceKey, KeyBucket>>,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
}

impl QueryCache {
    pub fn new() -> Self {
        QueryCache {
            buckets: RwLock::new(HashMap::new()),
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, key: &ResourceKey, variable: &str) -> Option<bool> {
        let buckets = self.buckets.read();
        let hit = buckets
            .get(key)
            .and_then(|bucket| bucket.entries.get(variable))
            .map(|entry| entry.found);
        match hit {
            Some(found) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(found)
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: &ResourceKey, variable: &str, found: bool) {
        let now = SystemTime::now();
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(key.clone()).or_insert_with(|| KeyBucket {
            populated_at: now,
            entries: HashMap::new(),
        });
        bucket.populated_at = now;
        bucket.entries.insert(
            variable.to_string(),
            CacheEntry {
                found,
                computed_at: now,
            },
        );
    }

    /// Drop the whole bucket for `key` when the source file was modified
    /// after the cache was last populated. Returns true when invalidated.
    pub fn invalidate_if_stale(&self, key: &ResourceKey, mod_time: SystemTime) -> bool {
        let mut buckets = self.buckets.write();
        let stale = buckets
            .get(key)
            .is_some_and(|bucket| mod_time > bucket.populated_at);
        if stale {
            buckets.remove(key);
            debug!(key = %key, "query cache invalidated: source modified");
        }
        stale
    }

    /// When the entry was computed, for diagnostics.
    pub fn computed_at(&self, key: &ResourceKey, variable: &str) -> Option<SystemTime> {
        let buckets = self.buckets.read();
        buckets
            .get(key)
            .and_then(|bucket| bucket.entries.get(variable))
            .map(|entry| entry.computed_at)
    }

    /// Drop every entry for `key`. Called by the pool on eviction and
    /// invalidation so cache entries never outlive their resource.
    pub fn clear(&self, key: &ResourceKey) {
        self.buckets.write().remove(key);
    }

    pub fn clear_all(&self) {
        self.buckets.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let buckets = self.buckets.read();
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            keys: buckets.len(),
            entries: buckets.values().map(|b| b.entries.len()).sum(),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        QueryCache::new()
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub keys: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
