//! Walkthrough of the public API: build a backend with four sources, pool
//! handles, run coordinated searches, and inspect the warnings.
//!
//! Run with: cargo run --example simple_usage

use std::path::PathBuf;
use std::sync::Arc;

use varscan::{
    CancellationToken, MemoryBackend, PoolConfig, PoolSweeper, QueryCache, ResourcePool,
    SearchCoordinator, SourceRole, SourceSet, SourceSpec,
};

fn main() -> varscan::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    // An in-memory stand-in for the four workbook files.
    let backend = Arc::new(MemoryBackend::new());
    backend.register_values(
        &PathBuf::from("/data/new_interface.xlsx"),
        "Interfaces",
        "Label",
        &["Eng_Speed", "Brk_Torque", "Veh_Accel"],
    );
    backend.register_values(
        &PathBuf::from("/data/old_interface.xlsx"),
        "Interfaces",
        "Label",
        &["Eng_Speed", "Brk_Torque"],
    );
    backend.register_values(
        &PathBuf::from("/data/new_dataflow.xlsx"),
        "Dataflow",
        "Signal",
        &["Eng_Speed", "Veh_Accel"],
    );
    backend.register_values(
        &PathBuf::from("/data/old_dataflow.xlsx"),
        "Dataflow",
        "Signal",
        &["Eng_Speed"],
    );

    let pool = Arc::new(ResourcePool::new(
        backend.clone(),
        Arc::new(QueryCache::new()),
        PoolConfig::default(),
    ));
    let sweeper = PoolSweeper::start(Arc::clone(&pool));

    let sources = SourceSet::new([
        SourceSpec::new(
            SourceRole::NewInterface,
            "/data/new_interface.xlsx",
            "Interfaces",
            "Label",
        ),
        SourceSpec::new(
            SourceRole::OldInterface,
            "/data/old_interface.xlsx",
            "Interfaces",
            "Label",
        ),
        SourceSpec::new(
            SourceRole::NewDataflow,
            "/data/new_dataflow.xlsx",
            "Dataflow",
            "Signal",
        ),
        SourceSpec::new(
            SourceRole::OldDataflow,
            "/data/old_dataflow.xlsx",
            "Dataflow",
            "Signal",
        ),
    ])?;
    let coordinator = SearchCoordinator::new(Arc::clone(&pool), sources);

    // One coordinated search.
    let result = coordinator.search("Veh_Accel")?;
    println!("variable: {}", result.variable);
    for role in SourceRole::SEARCH_ORDER {
        println!("  {:>14}: {}", role.label(), result.found_in(role));
    }
    for warning in &result.validation_warnings {
        println!("  warning: {warning}");
    }
    println!("  hash: {}", result.consistency_hash);

    // A batch over every variable, bounded to two workers.
    let variables: Vec<String> = ["Eng_Speed", "Brk_Torque", "Veh_Accel"]
        .iter()
        .map(|v| v.to_string())
        .collect();
    let token = CancellationToken::new();
    let results = coordinator.batch_search(&variables, 2, &token);
    println!("batch: {} variables searched", results.len());

    // Pool and cache state after the dust settles.
    let stats = pool.stats();
    println!("pool: {}/{} handles open", stats.count, stats.max_size);
    let cache = pool.cache().stats();
    println!(
        "cache: {} hits, {} misses ({:.0}% hit rate)",
        cache.hit_count,
        cache.miss_count,
        cache.hit_rate() * 100.0
    );

    sweeper.stop();
    coordinator.reset();
    Ok(())
}
