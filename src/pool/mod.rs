pub mod recovery;
pub mod resource_pool;
pub mod sweeper;

pub use recovery::ConnectionRecovery;
pub use resource_pool::{PoolStats, PooledResource, ResourcePool};
pub use sweeper::PoolSweeper;
