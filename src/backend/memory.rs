//! In-process reference backend.
//!
//! Serves registered tables of rows per source path, with knobs to simulate
//! the failure modes the pool and recovery layers must handle: driver-profile
//! rejection, broken handles, batch-query failure, slow queries, and source
//! modification. Used by the test suites, the bench, and the demo; real
//! deployments plug in their own [`QueryBackend`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

use crate::backend::{ConnectionProfile, Predicate, QueryBackend, QueryHandle};
use crate::core::error::{Error, Result};
use crate::core::types::{ResourceKey, Row};

struct SourceData {
    tables: HashMap<String, Vec<Row>>,
    mod_time: SystemTime,
    /// Shared with every handle opened for this path; `poison` flips it.
    alive: Arc<AtomicBool>,
}

#[derive(Default)]
struct Inner {
    sources: HashMap<ResourceKey, SourceData>,
}

/// Shared, clonable in-memory backend.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<Inner>>,
    accepted: Arc<RwLock<Option<Vec<ConnectionProfile>>>>,
    fail_batch: Arc<AtomicBool>,
    query_delay: Arc<RwLock<Option<Duration>>>,
    open_calls: Arc<AtomicUsize>,
    query_calls: Arc<AtomicUsize>,
    closed_handles: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Register (or replace) a table of rows for a source path.
    pub fn register_table(&self, path: &Path, table: &str, rows: Vec<Row>) {
        let key = ResourceKey::normalize(path);
        let mut inner = self.inner.write();
        let source = inner.sources.entry(key).or_insert_with(|| SourceData {
            tables: HashMap::new(),
            mod_time: SystemTime::now(),
            alive: Arc::new(AtomicBool::new(true)),
        });
        source.tables.insert(table.to_string(), rows);
    }

    /// Convenience: register a table holding one value column.
    pub fn register_values(&self, path: &Path, table: &str, column: &str, values: &[&str]) {
        let rows = values
            .iter()
            .map(|v| Row::new().with_field(column, *v))
            .collect();
        self.register_table(path, table, rows);
    }

    /// Advance the source's modification time, as if the file were rewritten.
    pub fn touch(&self, path: &Path) {
        let key = ResourceKey::normalize(path);
        let mut inner = self.inner.write();
        if let Some(source) = inner.sources.get_mut(&key) {
            source.mod_time = SystemTime::now() + Duration::from_secs(1);
        }
    }

    /// Mark every handle currently open for this path as dead.
    pub fn poison(&self, path: &Path) {
        let key = ResourceKey::normalize(path);
        let mut inner = self.inner.write();
        if let Some(source) = inner.sources.get_mut(&key) {
            source.alive.store(false, Ordering::SeqCst);
            // Future opens get a fresh liveness flag.
            source.alive = Arc::new(AtomicBool::new(true));
        }
    }

    /// Restrict which connection profiles `open` accepts; others fail with a
    /// driver mismatch. `None` accepts everything.
    pub fn accept_only(&self, profiles: Option<Vec<ConnectionProfile>>) {
        *self.accepted.write() = profiles;
    }

    /// Make IN-list queries fail, forcing the batch engine's per-item fallback.
    pub fn fail_batch_queries(&self, fail: bool) {
        self.fail_batch.store(fail, Ordering::SeqCst);
    }

    /// Add fixed latency to every query.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        *self.query_delay.write() = delay;
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn closed_handles(&self) -> usize {
        self.closed_handles.load(Ordering::SeqCst)
    }
}

impl QueryBackend for MemoryBackend {
    fn open(&self, path: &Path, profile: &ConnectionProfile) -> Result<Box<dyn QueryHandle>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(accepted) = self.accepted.read().as_ref() {
            if !accepted.contains(profile) {
                return Err(Error::DriverMismatch(format!(
                    "provider {profile} is not registered"
                )));
            }
        }

        let key = ResourceKey::normalize(path);
        let inner = self.inner.read();
        let source = inner
            .sources
            .get(&key)
            .ok_or_else(|| Error::resource_unavailable(path, "no such source"))?;

        Ok(Box::new(MemoryHandle {
            key,
            inner: self.inner.clone(),
            alive: source.alive.clone(),
            closed: AtomicBool::new(false),
            fail_batch: self.fail_batch.clone(),
            query_delay: self.query_delay.clone(),
            query_calls: self.query_calls.clone(),
            closed_handles: self.closed_handles.clone(),
        }))
    }

    fn source_mod_time(&self, path: &Path) -> Result<SystemTime> {
        let key = ResourceKey::normalize(path);
        let inner = self.inner.read();
        inner
            .sources
            .get(&key)
            .map(|s| s.mod_time)
            .ok_or_else(|| Error::resource_unavailable(path, "no such source"))
    }
}

struct MemoryHandle {
    key: ResourceKey,
    inner: Arc<RwLock<Inner>>,
    alive: Arc<AtomicBool>,
    closed: AtomicBool,
    fail_batch: Arc<AtomicBool>,
    query_delay: Arc<RwLock<Option<Duration>>>,
    query_calls: Arc<AtomicUsize>,
    closed_handles: Arc<AtomicUsize>,
}

impl QueryHandle for MemoryHandle {
    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.alive.load(Ordering::SeqCst)
    }

    fn query(&self, predicate: &Predicate) -> Result<Vec<Row>> {
        if !self.is_alive() {
            return Err(Error::QueryFailed("handle is closed or dead".into()));
        }
        let delay = *self.query_delay.read();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_batch.load(Ordering::SeqCst)
            && matches!(predicate.matcher, crate::backend::predicate::Matcher::AnyOf(_))
        {
            return Err(Error::QueryFailed("IN-list predicate rejected".into()));
        }

        let inner = self.inner.read();
        let source = inner
            .sources
            .get(&self.key)
            .ok_or_else(|| Error::QueryFailed(format!("source vanished: {}", self.key)))?;
        let rows = source
            .tables
            .get(&predicate.table)
            .ok_or_else(|| Error::QueryFailed(format!("no such table: {}", predicate.table)))?;

        Ok(rows
            .iter()
            .filter(|row| {
                row.get(&predicate.column)
                    .is_some_and(|value| predicate.matches(value))
            })
            .cloned()
            .collect())
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_handles.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
