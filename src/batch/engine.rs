use std::collections::HashMap;

use tracing::debug;

use crate::backend::{Predicate, QueryBackend};
use crate::cache::QueryCache;
use crate::core::config::EngineConfig;
use crate::core::error::Error;
use crate::pool::resource_pool::PooledResource;

/// Per-variable outcome of a batched existence check.
///
/// `found` always carries every requested variable. A variable whose query
/// threw is reported `false` there and additionally listed in `failures`
/// with the error, so callers can tell "queried, absent" from "query
/// failed" instead of trusting a folded `false`.
#[derive(Debug, Default)]
pub struct ExistenceReport {
    pub found: HashMap<String, bool>,
    pub failures: HashMap<String, Error>,
}

impl ExistenceReport {
    pub fn is_found(&self, variable: &str) -> bool {
        self.found.get(variable).copied().unwrap_or(false)
    }

    pub fn failure(&self, variable: &str) -> Option<&Error> {
        self.failures.get(variable)
    }
}

/// Rewrites N individual existence checks against one handle into IN-list
/// queries, degrading to per-value queries when the backend rejects a batch.
pub struct BatchQueryEngine {
    config: EngineConfig,
}

impl BatchQueryEngine {
    pub fn new(config: EngineConfig) -> Self {
        BatchQueryEngine { config }
    }

    /// Check which of `variables` exist in `table.column` of the pooled
    /// source.
    ///
    /// One bad variable never sinks the batch: a chunk whose IN-list query
    /// is rejected degrades to per-value queries, and a value whose query
    /// still fails lands in the report's `failures`. An empty input returns
    /// an empty report without touching the backend.
    pub fn check_existence(
        &self,
        resource: &PooledResource,
        table: &str,
        column: &str,
        variables: &[String],
    ) -> ExistenceReport {
        let mut report = ExistenceReport::default();
        if variables.is_empty() {
            return report;
        }
        for variable in variables {
            report.found.insert(variable.clone(), false);
        }

        for chunk in self.chunks(table, column, variables) {
            let predicate = Predicate::any_of(table, column, chunk.clone());
            match resource.query(&predicate) {
                Ok(rows) => {
                    for row in rows {
                        if let Some(value) = row.get(column) {
                            if let Some(found) = report.found.get_mut(value) {
                                *found = true;
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!(
                        key = %resource.key(),
                        error = %err,
                        "batch query failed, falling back to per-variable queries"
                    );
                    for variable in &chunk {
                        let single = Predicate::equals(table, column, variable.clone());
                        match resource.query(&single) {
                            Ok(rows) => {
                                report.found.insert(variable.clone(), !rows.is_empty());
                            }
                            Err(err) => {
                                debug!(variable = %variable, error = %err, "per-variable query failed");
                                report.failures.insert(variable.clone(), err);
                            }
                        }
                    }
                }
            }
        }
        report
    }

    /// Cache-fronted variant: invalidates the source's cache bucket when the
    /// file was modified, answers what it can from cache, and queries only
    /// the misses. Only definitive answers are stored; a failed lookup is
    /// never memoized as "not found".
    pub fn check_existence_cached(
        &self,
        backend: &dyn QueryBackend,
        cache: &QueryCache,
        resource: &PooledResource,
        table: &str,
        column: &str,
        variables: &[String],
    ) -> ExistenceReport {
        let mut report = ExistenceReport::default();
        if variables.is_empty() {
            return report;
        }

        if let Ok(mod_time) = backend.source_mod_time(resource.path()) {
            cache.invalidate_if_stale(resource.key(), mod_time);
        }

        let mut misses: Vec<String> = Vec::new();
        for variable in variables {
            match cache.get(resource.key(), variable) {
                Some(found) => {
                    report.found.insert(variable.clone(), found);
                }
                None => misses.push(variable.clone()),
            }
        }

        if !misses.is_empty() {
            let fresh = self.check_existence(resource, table, column, &misses);
            for (variable, found) in fresh.found {
                if !fresh.failures.contains_key(&variable) {
                    cache.put(resource.key(), &variable, found);
                }
                report.found.insert(variable, found);
            }
            report.failures.extend(fresh.failures);
        }
        report
    }

    /// Split the variables into IN-list chunks bounded both by value count
    /// and rendered predicate length.
    fn chunks(&self, table: &str, column: &str, variables: &[String]) -> Vec<Vec<String>> {
        let mut chunks: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        for variable in variables {
            current.push(variable.clone());
            let rendered_len = Predicate::any_of(table, column, current.clone())
                .render()
                .len();
            if current.len() >= self.config.max_values_per_query
                || rendered_len >= self.config.max_predicate_len
            {
                chunks.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

impl Default for BatchQueryEngine {
    fn default() -> Self {
        BatchQueryEngine::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::cache::QueryCache;
    use crate::core::config::PoolConfig;
    use crate::pool::resource_pool::ResourcePool;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn fixture() -> (Arc<MemoryBackend>, Arc<ResourcePool>, PathBuf) {
        let backend = Arc::new(MemoryBackend::new());
        let path = PathBuf::from("/mem/batch.xlsx");
        backend.register_values(
            &path,
            "Interfaces",
            "Label",
            &["Eng_Speed", "Brk_Torque", "Veh_Accel"],
        );
        let pool = Arc::new(ResourcePool::new(
            backend.clone(),
            Arc::new(QueryCache::new()),
            PoolConfig::default(),
        ));
        (backend, pool, path)
    }

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn one_query_for_many_variables() {
        let (backend, pool, path) = fixture();
        let resource = pool.get(&path).unwrap();
        let engine = BatchQueryEngine::default();

        let report = engine.check_existence(
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed", "Veh_Accel", "No_Such_Var"]),
        );
        assert_eq!(backend.query_calls(), 1);
        assert_eq!(report.found.len(), 3);
        assert!(report.is_found("Eng_Speed"));
        assert!(report.is_found("Veh_Accel"));
        assert!(!report.is_found("No_Such_Var"));
        assert!(report.failures.is_empty());
    }

    #[test]
    fn empty_input_never_touches_the_backend() {
        let (backend, pool, path) = fixture();
        let resource = pool.get(&path).unwrap();
        let engine = BatchQueryEngine::default();

        let report = engine.check_existence(&resource, "Interfaces", "Label", &[]);
        assert!(report.found.is_empty());
        assert_eq!(backend.query_calls(), 0);
    }

    #[test]
    fn batch_failure_degrades_to_per_variable_queries() {
        let (backend, pool, path) = fixture();
        let resource = pool.get(&path).unwrap();
        backend.fail_batch_queries(true);
        let engine = BatchQueryEngine::default();

        let report = engine.check_existence(
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed", "No_Such_Var"]),
        );
        assert!(report.is_found("Eng_Speed"));
        assert!(!report.is_found("No_Such_Var"));
        // The fallback resolved every value, so nothing is a failure.
        assert!(report.failures.is_empty());
        // One rejected batch plus one query per variable.
        assert_eq!(backend.query_calls(), 3);
    }

    #[test]
    fn failing_source_reports_failures_not_absence() {
        let (backend, pool, _) = fixture();
        let path = PathBuf::from("/mem/broken.xlsx");
        // Openable source whose configured table does not exist, so every
        // query on it throws.
        backend.register_values(&path, "WrongTable", "Label", &["Eng_Speed"]);
        let resource = pool.get(&path).unwrap();
        let engine = BatchQueryEngine::default();

        let report = engine.check_existence(
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed", "Brk_Torque"]),
        );
        assert!(!report.is_found("Eng_Speed"));
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            report.failure("Eng_Speed"),
            Some(Error::QueryFailed(_))
        ));
    }

    #[test]
    fn oversized_input_is_chunked() {
        let (backend, pool, path) = fixture();
        let resource = pool.get(&path).unwrap();
        let engine = BatchQueryEngine::new(EngineConfig {
            max_values_per_query: 10,
            max_predicate_len: 8000,
        });

        let many: Vec<String> = (0..25).map(|i| format!("Var_{i}")).collect();
        let report = engine.check_existence(&resource, "Interfaces", "Label", &many);
        assert_eq!(report.found.len(), 25);
        assert_eq!(backend.query_calls(), 3);
    }

    #[test]
    fn cached_variant_skips_known_answers() {
        let (backend, pool, path) = fixture();
        let resource = pool.get(&path).unwrap();
        let cache = QueryCache::new();
        let engine = BatchQueryEngine::default();

        let first = engine.check_existence_cached(
            backend.as_ref(),
            &cache,
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed", "No_Such_Var"]),
        );
        assert!(first.is_found("Eng_Speed"));
        let calls_after_first = backend.query_calls();

        let second = engine.check_existence_cached(
            backend.as_ref(),
            &cache,
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed", "No_Such_Var"]),
        );
        assert_eq!(second.found, first.found);
        assert_eq!(backend.query_calls(), calls_after_first);
    }

    #[test]
    fn failed_lookups_are_not_memoized() {
        let (backend, pool, _) = fixture();
        let path = PathBuf::from("/mem/broken.xlsx");
        backend.register_values(&path, "WrongTable", "Label", &["Eng_Speed"]);
        let resource = pool.get(&path).unwrap();
        let cache = QueryCache::new();
        let engine = BatchQueryEngine::default();

        let first = engine.check_existence_cached(
            backend.as_ref(),
            &cache,
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed"]),
        );
        assert!(first.failure("Eng_Speed").is_some());
        let calls_after_first = backend.query_calls();

        // The failure was not cached as "not found": the retry hits the
        // backend again instead of trusting a memoized false.
        let second = engine.check_existence_cached(
            backend.as_ref(),
            &cache,
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed"]),
        );
        assert!(second.failure("Eng_Speed").is_some());
        assert!(backend.query_calls() > calls_after_first);
    }

    #[test]
    fn modified_source_forces_requery() {
        let (backend, pool, path) = fixture();
        let resource = pool.get(&path).unwrap();
        let cache = QueryCache::new();
        let engine = BatchQueryEngine::default();

        engine.check_existence_cached(
            backend.as_ref(),
            &cache,
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed"]),
        );
        let calls_after_first = backend.query_calls();

        backend.touch(&path);
        let again = engine.check_existence_cached(
            backend.as_ref(),
            &cache,
            &resource,
            "Interfaces",
            "Label",
            &vars(&["Eng_Speed"]),
        );
        assert!(again.is_found("Eng_Speed"));
        assert_eq!(backend.query_calls(), calls_after_first + 1);
    }
}
