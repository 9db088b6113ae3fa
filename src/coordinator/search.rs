use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::Predicate;
use crate::batch::BatchQueryEngine;
use crate::coordinator::validation;
use crate::core::config::{CoordinatorConfig, EngineConfig, SourceSet};
use crate::core::error::{Error, Result};
use crate::core::types::{Row, SourceRole};
use crate::pool::ResourcePool;

/// Outcome of one coordinated search across the four sources.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatedSearchResult {
    pub variable: String,
    pub searched_at: DateTime<Utc>,
    /// Per-role existence. A role whose source could not be opened reports
    /// `false` here and an entry in `validation_errors`.
    pub per_source_found: HashMap<SourceRole, bool>,
    /// Row snapshots for roles where the variable was found. Omitted when the
    /// existence answer came from the query cache.
    pub rows: HashMap<SourceRole, Vec<Row>>,
    /// Relaxed cross-source consistency findings. Informational only.
    pub validation_warnings: Vec<String>,
    /// Per-source acquisition and query failures. The search still completes
    /// unless every source fails.
    pub validation_errors: Vec<String>,
    /// CRC-32 over the variable, timestamp, and the four existence flags.
    /// Two results with equal hashes described the same observed state.
    pub consistency_hash: String,
}

impl CoordinatedSearchResult {
    pub fn found_anywhere(&self) -> bool {
        self.per_source_found.values().any(|f| *f)
    }

    pub fn found_in(&self, role: SourceRole) -> bool {
        self.per_source_found.get(&role).copied().unwrap_or(false)
    }
}

/// Shared slot for one in-flight search. The leader fills it, everyone else
/// blocks on the condvar and clones the outcome.
struct Flight {
    slot: Mutex<Option<Result<CoordinatedSearchResult>>>,
    ready: Condvar,
}

impl Flight {
    fn new() -> Self {
        Flight {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<CoordinatedSearchResult> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut slot);
        }
    }

    fn complete(&self, result: Result<CoordinatedSearchResult>) {
        *self.slot.lock() = Some(result);
        self.ready.notify_all();
    }
}

/// Runs one variable lookup across the four configured sources, reusing the
/// pool and query cache, deduplicating concurrent identical searches, and
/// attaching relaxed consistency findings to the result.
pub struct SearchCoordinator {
    pool: Arc<ResourcePool>,
    engine: BatchQueryEngine,
    sources: SourceSet,
    config: CoordinatorConfig,
    inflight: Mutex<HashMap<String, Arc<Flight>>>,
    recent: Mutex<LruCache<String, CoordinatedSearchResult>>,
    last_search: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl SearchCoordinator {
    pub fn new(pool: Arc<ResourcePool>, sources: SourceSet) -> Self {
        SearchCoordinator::with_config(
            pool,
            sources,
            CoordinatorConfig::default(),
            EngineConfig::default(),
        )
    }

    pub fn with_config(
        pool: Arc<ResourcePool>,
        sources: SourceSet,
        config: CoordinatorConfig,
        engine: EngineConfig,
    ) -> Self {
        let capacity =
            NonZeroUsize::new(config.result_cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        SearchCoordinator {
            pool,
            engine: BatchQueryEngine::new(engine),
            sources,
            config,
            inflight: Mutex::new(HashMap::new()),
            recent: Mutex::new(LruCache::new(capacity)),
            last_search: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Search all four sources for `variable`.
    ///
    /// Fails only on an empty variable name or when no source at all could be
    /// opened. Per-source failures and cross-source inconsistencies are
    /// reported inside the result instead.
    ///
    /// Concurrent searches for the same variable are single-flighted: one
    /// caller does the work, the rest wait and share its outcome.
    pub fn search(&self, variable: &str) -> Result<CoordinatedSearchResult> {
        let variable = variable.trim();
        if variable.is_empty() {
            return Err(Error::invalid_argument("variable name must not be empty"));
        }

        let flight_key = variable.to_lowercase();
        let (flight, leader) = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&flight_key) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(Flight::new());
                    inflight.insert(flight_key.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };
        if !leader {
            debug!(variable, "joining in-flight search");
            return flight.wait();
        }

        let result = self.search_sources(variable);
        self.inflight.lock().remove(&flight_key);
        if let Ok(outcome) = &result {
            self.record(&flight_key, outcome);
        }
        flight.complete(result.clone());
        result
    }

    /// True when the same variable (case-insensitively) completed a search
    /// within the freshness window. UI feedback only, not a correctness cache.
    pub fn was_recent_search(&self, variable: &str) -> bool {
        let variable = variable.trim();
        let last = self.last_search.lock();
        match last.as_ref() {
            Some((name, at)) if name.eq_ignore_ascii_case(variable) => {
                let age = Utc::now().signed_duration_since(*at);
                age.to_std()
                    .is_ok_and(|age| age <= self.config.freshness_window)
            }
            _ => false,
        }
    }

    /// The retained result of an earlier search, if still in the LRU.
    pub fn cached_result(&self, variable: &str) -> Option<CoordinatedSearchResult> {
        let key = variable.trim().to_lowercase();
        self.recent.lock().get(&key).cloned()
    }

    /// Drop all coordinator state and close every pooled handle.
    pub fn reset(&self) {
        self.recent.lock().clear();
        *self.last_search.lock() = None;
        self.pool.clear_all();
        self.pool.cache().clear_all();
        info!("search coordinator reset");
    }

    fn search_sources(&self, variable: &str) -> Result<CoordinatedSearchResult> {
        let searched_at = Utc::now();
        let mut per_source_found: HashMap<SourceRole, bool> = HashMap::new();
        let mut rows: HashMap<SourceRole, Vec<Row>> = HashMap::new();
        let mut validation_errors: Vec<String> = Vec::new();
        let mut acquired = 0usize;
        let mut acquisition_failure: Option<Error> = None;

        let requested = vec![variable.to_string()];
        for spec in self.sources.iter() {
            let resource = match self.pool.get(&spec.path) {
                Ok(resource) => resource,
                Err(err) => {
                    per_source_found.insert(spec.role, false);
                    validation_errors.push(format!("{}: {err}", spec.role.label()));
                    acquisition_failure.get_or_insert(err);
                    continue;
                }
            };
            acquired += 1;

            // Invalidate before consulting the cache, so a touched source
            // does not pass off a stale entry as a hit.
            if let Ok(mod_time) = self.pool.backend().source_mod_time(resource.path()) {
                self.pool.cache().invalidate_if_stale(resource.key(), mod_time);
            }
            // computed_at, unlike get, does not skew hit/miss counters.
            let answered_from_cache = self
                .pool
                .cache()
                .computed_at(resource.key(), variable)
                .is_some();
            let report = self.engine.check_existence_cached(
                self.pool.backend().as_ref(),
                self.pool.cache(),
                &resource,
                &spec.table,
                &spec.column,
                &requested,
            );
            let found = report.is_found(variable);
            per_source_found.insert(spec.role, found);

            if let Some(err) = report.failure(variable) {
                // The query threw; that is an error slot, not "not found".
                // The handle is not trusted again: the next get recreates it.
                validation_errors.push(format!("{}: query failed: {err}", spec.role.label()));
                resource.mark_broken();
            } else if found && !answered_from_cache {
                let predicate = Predicate::equals(&spec.table, &spec.column, variable);
                match resource.query(&predicate) {
                    Ok(matched) => {
                        rows.insert(spec.role, matched);
                    }
                    Err(err) => {
                        validation_errors
                            .push(format!("{}: row snapshot failed: {err}", spec.role.label()));
                        resource.mark_broken();
                    }
                }
            }
        }

        if acquired == 0 {
            // No query ever ran; surface the first acquisition error with
            // its own type rather than inventing a query failure.
            if let Some(err) = acquisition_failure {
                return Err(err);
            }
        }

        let validation_warnings = validation::consistency_warnings(&per_source_found);
        let consistency_hash = consistency_hash(variable, searched_at, &per_source_found);
        debug!(
            variable,
            found = per_source_found.values().filter(|f| **f).count(),
            warnings = validation_warnings.len(),
            "coordinated search finished"
        );

        Ok(CoordinatedSearchResult {
            variable: variable.to_string(),
            searched_at,
            per_source_found,
            rows,
            validation_warnings,
            validation_errors,
            consistency_hash,
        })
    }

    fn record(&self, flight_key: &str, outcome: &CoordinatedSearchResult) {
        self.recent
            .lock()
            .put(flight_key.to_string(), outcome.clone());
        *self.last_search.lock() = Some((outcome.variable.clone(), outcome.searched_at));
    }
}

/// CRC-32 of `variable|timestamp|flags`, flags in fixed search order. Stable
/// across runs for the same observed state within one second.
fn consistency_hash(
    variable: &str,
    searched_at: DateTime<Utc>,
    per_source_found: &HashMap<SourceRole, bool>,
) -> String {
    let mut input = format!("{variable}|{}", searched_at.format("%Y%m%d%H%M%S"));
    input.push('|');
    for role in SourceRole::SEARCH_ORDER {
        let found = per_source_found.get(&role).copied().unwrap_or(false);
        input.push(if found { '1' } else { '0' });
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(input.as_bytes());
    format!("{:08x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::cache::QueryCache;
    use crate::core::config::{PoolConfig, SourceSpec};
    use std::path::PathBuf;
    use std::time::Duration;

    fn fixture() -> (Arc<MemoryBackend>, SearchCoordinator) {
        let backend = Arc::new(MemoryBackend::new());
        backend.register_values(
            &PathBuf::from("/mem/new_if.xlsx"),
            "Interfaces",
            "Label",
            &["Eng_Speed", "Brk_Torque"],
        );
        backend.register_values(
            &PathBuf::from("/mem/old_if.xlsx"),
            "Interfaces",
            "Label",
            &["Eng_Speed"],
        );
        backend.register_values(
            &PathBuf::from("/mem/new_df.xlsx"),
            "Dataflow",
            "Signal",
            &["Eng_Speed", "Brk_Torque"],
        );
        backend.register_values(
            &PathBuf::from("/mem/old_df.xlsx"),
            "Dataflow",
            "Signal",
            &["Eng_Speed"],
        );
        let coordinator = coordinator_for(&backend);
        (backend, coordinator)
    }

    fn coordinator_for(backend: &Arc<MemoryBackend>) -> SearchCoordinator {
        let pool = Arc::new(ResourcePool::new(
            backend.clone(),
            Arc::new(QueryCache::new()),
            PoolConfig::default(),
        ));
        let sources = SourceSet::new([
            SourceSpec::new(
                SourceRole::NewInterface,
                "/mem/new_if.xlsx",
                "Interfaces",
                "Label",
            ),
            SourceSpec::new(
                SourceRole::OldInterface,
                "/mem/old_if.xlsx",
                "Interfaces",
                "Label",
            ),
            SourceSpec::new(
                SourceRole::NewDataflow,
                "/mem/new_df.xlsx",
                "Dataflow",
                "Signal",
            ),
            SourceSpec::new(
                SourceRole::OldDataflow,
                "/mem/old_df.xlsx",
                "Dataflow",
                "Signal",
            ),
        ])
        .unwrap();
        SearchCoordinator::new(pool, sources)
    }

    #[test]
    fn search_reports_per_source_existence() {
        let (_, coordinator) = fixture();
        let result = coordinator.search("Brk_Torque").unwrap();

        assert!(result.found_in(SourceRole::NewInterface));
        assert!(!result.found_in(SourceRole::OldInterface));
        assert!(result.found_in(SourceRole::NewDataflow));
        assert!(!result.found_in(SourceRole::OldDataflow));
        assert!(result.rows.contains_key(&SourceRole::NewInterface));
        assert!(!result.rows.contains_key(&SourceRole::OldInterface));
        assert!(result.validation_errors.is_empty());
        assert!(result
            .validation_warnings
            .iter()
            .any(|w| w.contains("newly added")));
    }

    #[test]
    fn fully_present_variable_is_comparison_ready() {
        let (_, coordinator) = fixture();
        let result = coordinator.search("Eng_Speed").unwrap();
        assert!(result.found_anywhere());
        assert_eq!(result.validation_warnings.len(), 1);
        assert!(result.validation_warnings[0].contains("ready for comparison"));
    }

    #[test]
    fn empty_variable_is_rejected_before_any_backend_work() {
        let (backend, coordinator) = fixture();
        let err = coordinator.search("   ").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(backend.open_calls(), 0);
    }

    #[test]
    fn missing_source_is_a_warning_not_a_failure() {
        let backend = Arc::new(MemoryBackend::new());
        backend.register_values(
            &PathBuf::from("/mem/new_if.xlsx"),
            "Interfaces",
            "Label",
            &["Eng_Speed"],
        );
        // The other three sources are never registered.
        let coordinator = coordinator_for(&backend);

        let result = coordinator.search("Eng_Speed").unwrap();
        assert!(result.found_in(SourceRole::NewInterface));
        assert!(!result.found_in(SourceRole::OldInterface));
        assert_eq!(result.validation_errors.len(), 3);
        // Every role gets a slot even when its source failed to open.
        assert_eq!(result.per_source_found.len(), 4);
    }

    #[test]
    fn all_sources_unavailable_is_terminal() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator = coordinator_for(&backend);
        // The terminal error keeps its acquisition type; no query ever ran.
        let err = coordinator.search("Eng_Speed").unwrap_err();
        assert!(err.is_resource_unavailable());
    }

    fn fixture_with_failing_new_interface() -> (Arc<MemoryBackend>, SearchCoordinator) {
        let backend = Arc::new(MemoryBackend::new());
        // The new-interface source opens fine but lacks the configured
        // table, so every query against it throws.
        backend.register_values(
            &PathBuf::from("/mem/new_if.xlsx"),
            "WrongTable",
            "Label",
            &["Eng_Speed"],
        );
        backend.register_values(
            &PathBuf::from("/mem/old_if.xlsx"),
            "Interfaces",
            "Label",
            &["Eng_Speed"],
        );
        backend.register_values(
            &PathBuf::from("/mem/new_df.xlsx"),
            "Dataflow",
            "Signal",
            &["Eng_Speed"],
        );
        backend.register_values(
            &PathBuf::from("/mem/old_df.xlsx"),
            "Dataflow",
            "Signal",
            &["Eng_Speed"],
        );
        let coordinator = coordinator_for(&backend);
        (backend, coordinator)
    }

    #[test]
    fn query_failure_is_an_error_slot_not_absence() {
        let (_, coordinator) = fixture_with_failing_new_interface();

        let result = coordinator.search("Eng_Speed").unwrap();
        assert!(!result.found_in(SourceRole::NewInterface));
        assert!(result.found_in(SourceRole::OldInterface));
        assert_eq!(result.validation_errors.len(), 1);
        assert!(result.validation_errors[0].contains("new interface"));
        assert!(result.validation_errors[0].contains("query failed"));

        // The failure was not memoized as a definitive "not found": the
        // retry hits the source again and reports the error again.
        let again = coordinator.search("Eng_Speed").unwrap();
        assert_eq!(again.validation_errors.len(), 1);
    }

    #[test]
    fn throwing_handle_is_recreated_on_the_next_search() {
        let (backend, coordinator) = fixture_with_failing_new_interface();

        coordinator.search("Eng_Speed").unwrap();
        let opens = backend.open_calls();

        coordinator.search("Eng_Speed").unwrap();
        // Only the failing source's handle is recreated; the healthy three
        // are reused.
        assert_eq!(backend.open_calls(), opens + 1);
    }

    #[test]
    fn repeat_search_is_answered_from_cache() {
        let (backend, coordinator) = fixture();
        coordinator.search("Eng_Speed").unwrap();
        let queries_after_first = backend.query_calls();

        let again = coordinator.search("Eng_Speed").unwrap();
        assert!(again.found_anywhere());
        // Existence comes from the cache and the row snapshot is skipped.
        assert_eq!(backend.query_calls(), queries_after_first);
        assert!(again.rows.is_empty());
    }

    #[test]
    fn modified_source_is_requeried() {
        let (backend, coordinator) = fixture();
        coordinator.search("Eng_Speed").unwrap();
        let queries_after_first = backend.query_calls();

        backend.touch(&PathBuf::from("/mem/new_if.xlsx"));
        coordinator.search("Eng_Speed").unwrap();
        assert!(backend.query_calls() > queries_after_first);
    }

    #[test]
    fn concurrent_identical_searches_run_once() {
        let (backend, coordinator) = fixture();
        backend.set_query_delay(Some(Duration::from_millis(20)));
        let coordinator = Arc::new(coordinator);
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    coordinator.search("Eng_Speed").unwrap()
                })
            })
            .collect();
        let results: Vec<CoordinatedSearchResult> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        // One existence query per source plus one row snapshot per source
        // where the variable exists; no duplicated work for the waiters.
        assert_eq!(backend.query_calls(), 8);
        let hash = &results[0].consistency_hash;
        assert!(results.iter().all(|r| r.consistency_hash == *hash));
    }

    #[test]
    fn recency_is_case_insensitive_and_windowed() {
        let (_, coordinator) = fixture();
        assert!(!coordinator.was_recent_search("Eng_Speed"));
        coordinator.search("Eng_Speed").unwrap();
        assert!(coordinator.was_recent_search("ENG_SPEED"));
        assert!(!coordinator.was_recent_search("Brk_Torque"));
    }

    #[test]
    fn cached_result_survives_in_the_lru() {
        let (_, coordinator) = fixture();
        assert!(coordinator.cached_result("Eng_Speed").is_none());
        let result = coordinator.search("Eng_Speed").unwrap();
        let cached = coordinator.cached_result("eng_speed").unwrap();
        assert_eq!(cached.consistency_hash, result.consistency_hash);
    }

    #[test]
    fn reset_clears_pool_and_coordinator_state() {
        let (_, coordinator) = fixture();
        coordinator.search("Eng_Speed").unwrap();
        assert!(coordinator.pool().stats().count > 0);

        coordinator.reset();
        assert_eq!(coordinator.pool().stats().count, 0);
        assert!(coordinator.cached_result("Eng_Speed").is_none());
        assert!(!coordinator.was_recent_search("Eng_Speed"));
    }

    #[test]
    fn consistency_hash_is_stable_for_equal_state() {
        let at = Utc::now();
        let flags = HashMap::from([(SourceRole::NewInterface, true)]);
        let a = consistency_hash("Eng_Speed", at, &flags);
        let b = consistency_hash("Eng_Speed", at, &flags);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);

        let other = consistency_hash("Brk_Torque", at, &flags);
        assert_ne!(a, other);
    }

    #[test]
    fn result_serializes_to_json() {
        let (_, coordinator) = fixture();
        let result = coordinator.search("Eng_Speed").unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("consistency_hash"));
        assert!(json.contains("Eng_Speed"));
    }
}
