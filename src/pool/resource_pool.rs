use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::backend::{ConnectionProfile, Predicate, QueryBackend, QueryHandle};
use crate::cache::QueryCache;
use crate::core::config::PoolConfig;
use crate::core::error::Result;
use crate::core::types::{ResourceKey, Row};
use crate::pool::recovery::ConnectionRecovery;

/// One pooled, open backend handle. Owned exclusively by the pool; callers
/// borrow it through an `Arc` and must never close it.
#[derive(Debug)]
pub struct PooledResource {
    key: ResourceKey,
    path: PathBuf,
    handle: Box<dyn QueryHandle>,
    created_at: Instant,
    epoch: Instant,
    last_access_ms: AtomicU64,
    valid: AtomicBool,
}

impl PooledResource {
    fn new(key: ResourceKey, path: PathBuf, handle: Box<dyn QueryHandle>, epoch: Instant) -> Self {
        let resource = PooledResource {
            key,
            path,
            handle,
            created_at: Instant::now(),
            epoch,
            last_access_ms: AtomicU64::new(0),
            valid: AtomicBool::new(true),
        };
        resource.touch();
        resource
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Run one query on the pooled handle.
    pub fn query(&self, predicate: &Predicate) -> Result<Vec<Row>> {
        self.handle.query(predicate)
    }

    /// Valid flag plus the handle's own liveness check. No I/O.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst) && self.handle.is_alive()
    }

    /// Flag the resource so the next `get` recreates it. Callers use this
    /// after a query failure that points at the connection rather than the
    /// predicate.
    pub fn mark_broken(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    fn touch(&self) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.last_access_ms.store(ms, Ordering::Relaxed);
    }

    fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    fn close(&self) -> Result<()> {
        self.valid.store(false, Ordering::SeqCst);
        self.handle.close()
    }
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub count: usize,
    pub max_size: usize,
    pub keys: Vec<String>,
}

/// Keyed pool of open backend handles, bounded in size and idle time.
///
/// `get` runs a double-checked pattern: an unlocked map read first (the
/// common "already pooled" path), then the creation mutex plus a re-check
/// before any eviction or backend open. Two callers racing on the same
/// missing key therefore trigger exactly one backend open.
pub struct ResourcePool {
    config: PoolConfig,
    recovery: ConnectionRecovery,
    cache: Arc<QueryCache>,
    epoch: Instant,
    entries: RwLock<HashMap<ResourceKey, Arc<PooledResource>>>,
    create_lock: Mutex<()>,
}

impl ResourcePool {
    pub fn new(backend: Arc<dyn QueryBackend>, cache: Arc<QueryCache>, config: PoolConfig) -> Self {
        ResourcePool::with_profiles(backend, cache, config, Vec::new())
    }

    /// Build a pool with an explicit connection-profile fallback chain.
    pub fn with_profiles(
        backend: Arc<dyn QueryBackend>,
        cache: Arc<QueryCache>,
        config: PoolConfig,
        profiles: Vec<ConnectionProfile>,
    ) -> Self {
        ResourcePool {
            config,
            recovery: ConnectionRecovery::new(backend, profiles),
            cache,
            epoch: Instant::now(),
            entries: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn QueryBackend> {
        self.recovery.backend()
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Borrow the pooled resource for `path`, creating or recreating it as
    /// needed. A resource is never returned while invalid.
    pub fn get(&self, path: &Path) -> Result<Arc<PooledResource>> {
        let key = ResourceKey::normalize(path);

        // Fast path: present and valid.
        {
            let entries = self.entries.read();
            if let Some(resource) = entries.get(&key) {
                if self.recovery.validate(resource) {
                    resource.touch();
                    return Ok(Arc::clone(resource));
                }
            }
        }

        let _creating = self.create_lock.lock();

        // Re-check: another caller may have created it while we waited.
        {
            let entries = self.entries.read();
            if let Some(resource) = entries.get(&key) {
                if self.recovery.validate(resource) {
                    resource.touch();
                    return Ok(Arc::clone(resource));
                }
            }
        }

        // Drop any invalid entry, then make room if the pool is full.
        {
            let mut entries = self.entries.write();
            if let Some(stale) = entries.remove(&key) {
                debug!(key = %key, "recreating invalid pooled resource");
                self.retire(&stale);
            }
            if entries.len() >= self.config.max_size {
                self.evict_lru(&mut entries);
            }
        }

        // Construction failures propagate; no partial entry is inserted.
        let handle = self.recovery.recreate(path)?;
        let resource = Arc::new(PooledResource::new(
            key.clone(),
            path.to_path_buf(),
            handle,
            self.epoch,
        ));
        self.entries.write().insert(key, Arc::clone(&resource));
        debug!(path = %path.display(), "pooled new resource");
        Ok(resource)
    }

    /// Remove and close the resource for `path`, if pooled.
    pub fn remove(&self, path: &Path) {
        let key = ResourceKey::normalize(path);
        let _creating = self.create_lock.lock();
        let removed = self.entries.write().remove(&key);
        if let Some(resource) = removed {
            self.retire(&resource);
        }
    }

    /// Close every pooled resource and drop all cache entries.
    pub fn clear_all(&self) {
        let _creating = self.create_lock.lock();
        let drained: Vec<Arc<PooledResource>> = {
            let mut entries = self.entries.write();
            entries.drain().map(|(_, r)| r).collect()
        };
        for resource in &drained {
            self.retire(resource);
        }
        debug!(closed = drained.len(), "pool cleared");
    }

    /// Close every entry idle longer than the configured timeout. Runs under
    /// the creation mutex so a sweep never races a creation of the same key.
    pub fn sweep_idle(&self) -> usize {
        let _creating = self.create_lock.lock();
        let cutoff = self.config.idle_timeout.as_millis() as u64;
        let now_ms = self.epoch.elapsed().as_millis() as u64;

        let idle: Vec<Arc<PooledResource>> = {
            let mut entries = self.entries.write();
            let keys: Vec<ResourceKey> = entries
                .iter()
                .filter(|(_, r)| now_ms.saturating_sub(r.last_access_ms()) > cutoff)
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };
        for resource in &idle {
            self.retire(resource);
        }
        if !idle.is_empty() {
            debug!(swept = idle.len(), "idle pooled resources closed");
        }
        idle.len()
    }

    pub fn stats(&self) -> PoolStats {
        let entries = self.entries.read();
        let mut keys: Vec<String> = entries.keys().map(|k| k.as_str().to_string()).collect();
        keys.sort();
        PoolStats {
            count: entries.len(),
            max_size: self.config.max_size,
            keys,
        }
    }

    /// Open handles for a list of paths on a background thread, reusing the
    /// pool. Failures are logged and skipped; warm-up must never fail a
    /// caller.
    pub fn preload(self: &Arc<Self>, paths: Vec<PathBuf>) -> std::thread::JoinHandle<()> {
        let pool = Arc::clone(self);
        std::thread::spawn(move || {
            for path in paths {
                if let Err(err) = pool.get(&path) {
                    debug!(path = %path.display(), error = %err, "preload skipped");
                }
            }
        })
    }

    /// Evict the entry with the oldest access time. Caller holds both the
    /// creation mutex and the entries write lock.
    fn evict_lru(&self, entries: &mut HashMap<ResourceKey, Arc<PooledResource>>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, r)| r.last_access_ms())
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            if let Some(resource) = entries.remove(&key) {
                debug!(key = %key, "evicting least-recently-used resource");
                self.retire(&resource);
            }
        }
    }

    /// Close a resource and drop its cache bucket. Close errors must never
    /// fail the caller's unrelated operation, so they are logged and
    /// swallowed.
    fn retire(&self, resource: &PooledResource) {
        if let Err(err) = resource.close() {
            warn!(key = %resource.key(), error = %err, "error closing pooled handle");
        }
        self.cache.clear(resource.key());
    }
}
