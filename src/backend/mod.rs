pub mod memory;
pub mod predicate;

use std::path::Path;
use std::time::SystemTime;

use crate::core::error::Result;
use crate::core::types::Row;
pub use predicate::Predicate;

/// Backend driver configuration. The original sources are opened through a
/// provider that exists in more than one installed version; recovery walks a
/// short chain of these before giving up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionProfile {
    pub driver: String,
    pub version: String,
}

impl ConnectionProfile {
    pub fn new(driver: impl Into<String>, version: impl Into<String>) -> Self {
        ConnectionProfile {
            driver: driver.into(),
            version: version.into(),
        }
    }

    pub fn primary() -> Self {
        ConnectionProfile::new("ACE", "12.0")
    }

    pub fn alternate() -> Self {
        ConnectionProfile::new("ACE", "16.0")
    }

    /// Primary plus one alternate. Recovery makes exactly one attempt per
    /// profile in this chain.
    pub fn default_chain() -> Vec<ConnectionProfile> {
        vec![ConnectionProfile::primary(), ConnectionProfile::alternate()]
    }
}

impl std::fmt::Display for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.driver, self.version)
    }
}

/// An open connection/session to one source file.
///
/// Handles are owned by the pool and borrowed by callers; a borrower must
/// never close one.
pub trait QueryHandle: Send + Sync {
    /// Cheap local liveness check. Must not perform I/O.
    fn is_alive(&self) -> bool;

    /// Run one row-matching query against the source.
    fn query(&self, predicate: &Predicate) -> Result<Vec<Row>>;

    /// Release the underlying resource. Idempotent.
    fn close(&self) -> Result<()>;
}

impl std::fmt::Debug for dyn QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("is_alive", &self.is_alive())
            .finish()
    }
}

/// The opaque query capability the core consumes from its environment.
///
/// Opening is expensive (seconds, tens of megabytes); everything above this
/// trait exists to avoid calling `open` more often than necessary.
pub trait QueryBackend: Send + Sync + 'static {
    fn open(&self, path: &Path, profile: &ConnectionProfile) -> Result<Box<dyn QueryHandle>>;

    /// On-disk modification time of a source. Also serves as the
    /// existence/readability probe, so the core never touches the filesystem
    /// directly.
    fn source_mod_time(&self, path: &Path) -> Result<SystemTime>;
}
