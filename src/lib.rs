pub mod core;
pub mod backend;
pub mod cache;
pub mod pool;
pub mod batch;
pub mod coordinator;

pub use backend::memory::MemoryBackend;
pub use backend::{ConnectionProfile, Predicate, QueryBackend, QueryHandle};
pub use batch::{BatchQueryEngine, ExistenceReport};
pub use cache::{CacheStats, QueryCache};
pub use coordinator::{CoordinatedSearchResult, SearchCoordinator};
pub use self::core::config::{CoordinatorConfig, EngineConfig, PoolConfig, SourceSet, SourceSpec};
pub use self::core::error::{Error, Result};
pub use self::core::types::{CancellationToken, ResourceKey, Row, SourceRole};
pub use pool::{ConnectionRecovery, PoolStats, PoolSweeper, PooledResource, ResourcePool};

/*
┌─────────────────────────────────────────────────────────────────────────────┐
│                         VARSCAN STRUCT ARCHITECTURE                          │
└─────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────── COORDINATION LAYER ─────────────────────────────┐
│                                                                              │
│  ┌───────────────────────────────────────────────────────────────────────┐ │
│  │                        struct SearchCoordinator                        │ │
│  │  ┌─────────────────────────────────────────────────────────────────┐ │ │
│  │  │ pool: Arc<ResourcePool>          // Shared pooled handles       │ │ │
│  │  │ engine: BatchQueryEngine         // IN-list existence checks    │ │ │
│  │  │ sources: SourceSet               // The four roles, in order    │ │ │
│  │  │ inflight: Mutex<HashMap>         // Single-flight dedup         │ │ │
│  │  │ recent: Mutex<LruCache>          // Retained results            │ │ │
│  │  │ last_search: Mutex<Option>       // Recency window              │ │ │
│  │  └─────────────────────────────────────────────────────────────────┘ │ │
│  └───────────────────────────────────────────────────────────────────────┘ │
│                                                                              │
│  ┌──────────────────────────┐  ┌──────────────────────────────────────┐   │
│  │ struct CoordinatedSearch │  │ enum SourceRole                      │   │
│  │        Result            │  │ • NewInterface   • OldInterface      │   │
│  │ • per_source_found: Map  │  │ • NewDataflow    • OldDataflow       │   │
│  │ • rows: Map<Role, Rows>  │  └──────────────────────────────────────┘   │
│  │ • validation_warnings    │                                              │
│  │ • consistency_hash       │  batch_search: channel + scoped workers     │
│  └──────────────────────────┘  + CancellationToken                        │
└──────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── POOLING LAYER ────────────────────────────────┐
│                                                                              │
│  ┌────────────────────────┐  ┌───────────────────┐  ┌───────────────────┐ │
│  │ struct ResourcePool    │  │ struct Connection │  │ struct PoolSweeper│ │
│  │ • entries: RwLock<Map> │  │        Recovery   │  │ • shutdown: chan  │ │
│  │ • create_lock: Mutex   │  │ • profiles: Vec   │  │ • thread: Join    │ │
│  │ • recovery             │  │ • validate()      │  └───────────────────┘ │
│  │ • cache: Arc<Cache>    │  │ • recreate()      │                        │
│  └────────────────────────┘  └───────────────────┘  ┌───────────────────┐ │
│                                                      │ struct Pooled     │ │
│  LRU eviction at max_size, idle sweep on interval,  │        Resource   │ │
│  double-checked creation: one open per racing key   │ • handle, valid   │ │
│                                                      └───────────────────┘ │
└──────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────── QUERY/CACHE LAYER ──────────────────────────────┐
│                                                                              │
│  ┌────────────────────────┐  ┌────────────────────────────────────────┐   │
│  │ struct BatchQueryEngine│  │ struct QueryCache                      │   │
│  │ • chunked IN-lists     │  │ • buckets: RwLock<Map<Key, Bucket>>    │   │
│  │ • per-item fallback    │  │ • invalidate_if_stale(mod_time)        │   │
│  └────────────────────────┘  │ • hit/miss counters                    │   │
│                               └────────────────────────────────────────┘   │
│                                                                              │
│  ┌────────────────────────┐  ┌────────────────────────────────────────┐   │
│  │ trait QueryBackend     │  │ struct Predicate                       │   │
│  │ • open(path, profile)  │  │ • Equals / AnyOf over table.column     │   │
│  │ • source_mod_time()    │  │ • render() for SQL-ish backends        │   │
│  └────────────────────────┘  └────────────────────────────────────────┘   │
└──────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── RELATIONSHIPS ────────────────────────────────┐
│                                                                              │
│  SearchCoordinator ──borrows──> ResourcePool ──opens_via──> Recovery        │
│        │                             │                          │           │
│        │                             ├──clears──> QueryCache    │           │
│        │                             │                          │           │
│        │                             └──owned──> PooledResource │           │
│        │                                                        │           │
│        ├──batches_via──> BatchQueryEngine ──queries──> QueryHandle          │
│        │                                                                     │
│        └──warns_via──> validation::consistency_warnings                      │
│                                                                              │
│  PoolSweeper ──ticks──> ResourcePool::sweep_idle                            │
│  Recovery ──falls_back──> ConnectionProfile::default_chain                  │
│                                                                              │
└──────────────────────────────────────────────────────────────────────────────┘
*/
