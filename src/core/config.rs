use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{Error, Result};
use crate::core::types::SourceRole;

/// Resource pool sizing and sweep timing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Hard cap on concurrently open handles. The least-recently-used entry
    /// is evicted before a new one is created past this limit.
    pub max_size: usize,
    /// Entries idle longer than this are closed by the background sweep.
    pub idle_timeout: Duration,
    /// Interval between background sweeps.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_size: 8,
            idle_timeout: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Batch query engine limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum values folded into one IN-list query; larger inputs are chunked.
    pub max_values_per_query: usize,
    /// Backends tend to reject very long predicates; chunks are also split
    /// when the rendered clause would exceed this many characters.
    pub max_predicate_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_values_per_query: 50,
            max_predicate_len: 8000,
        }
    }
}

/// Coordinator recency tracking.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a completed search counts as "just searched" for UI feedback.
    /// Not a correctness cache.
    pub freshness_window: Duration,
    /// Capacity of the recent-result LRU.
    pub result_cache_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            freshness_window: Duration::from_secs(30),
            result_cache_size: 64,
        }
    }
}

/// One searchable source: where it lives and which table/column holds the
/// variable names.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub role: SourceRole,
    pub path: PathBuf,
    pub table: String,
    pub column: String,
}

impl SourceSpec {
    pub fn new(
        role: SourceRole,
        path: impl Into<PathBuf>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        SourceSpec {
            role,
            path: path.into(),
            table: table.into(),
            column: column.into(),
        }
    }
}

/// The four sources of one coordinated search, held in fixed search order.
#[derive(Debug, Clone)]
pub struct SourceSet {
    specs: [SourceSpec; 4],
}

impl SourceSet {
    /// Build a set from four specs, one per role. Order of the arguments does
    /// not matter; the set always iterates in [`SourceRole::SEARCH_ORDER`].
    pub fn new(specs: [SourceSpec; 4]) -> Result<Self> {
        let mut ordered: [Option<SourceSpec>; 4] = [None, None, None, None];
        for spec in specs {
            let slot = SourceRole::SEARCH_ORDER
                .iter()
                .position(|r| *r == spec.role)
                .expect("SEARCH_ORDER covers every role");
            if ordered[slot].is_some() {
                return Err(Error::invalid_argument(format!(
                    "duplicate source role: {}",
                    spec.role.label()
                )));
            }
            ordered[slot] = Some(spec);
        }
        // All four slots are filled: four specs, no duplicates.
        let specs = ordered.map(|s| s.expect("all roles present"));
        Ok(SourceSet { specs })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceSpec> {
        self.specs.iter()
    }

    pub fn get(&self, role: SourceRole) -> &SourceSpec {
        let slot = SourceRole::SEARCH_ORDER
            .iter()
            .position(|r| *r == role)
            .expect("SEARCH_ORDER covers every role");
        &self.specs[slot]
    }
}
