use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{ConnectionProfile, QueryBackend, QueryHandle};
use crate::core::error::{Error, Result};
use crate::pool::resource_pool::PooledResource;

/// Validates pooled handles before use and recreates broken ones, falling
/// back across a short ordered chain of connection profiles.
pub struct ConnectionRecovery {
    backend: Arc<dyn QueryBackend>,
    profiles: Vec<ConnectionProfile>,
}

impl ConnectionRecovery {
    pub fn new(backend: Arc<dyn QueryBackend>, profiles: Vec<ConnectionProfile>) -> Self {
        let profiles = if profiles.is_empty() {
            ConnectionProfile::default_chain()
        } else {
            profiles
        };
        ConnectionRecovery { backend, profiles }
    }

    pub fn backend(&self) -> &Arc<dyn QueryBackend> {
        &self.backend
    }

    /// Cheap local check, no I/O. Used on the pool's hot path.
    pub fn validate(&self, resource: &PooledResource) -> bool {
        resource.is_valid()
    }

    /// Open a fresh handle for `path`.
    ///
    /// The source is first probed through the backend; a missing or
    /// unreadable file fails fast as `ResourceUnavailable`. Open failures
    /// caused by a driver mismatch fall back to the next profile in the
    /// chain, exactly one attempt per profile; any other failure is final.
    pub fn recreate(&self, path: &Path) -> Result<Box<dyn QueryHandle>> {
        self.backend
            .source_mod_time(path)
            .map_err(|e| Error::resource_unavailable(path, e.to_string()))?;

        let mut attempts: Vec<String> = Vec::new();
        for (index, profile) in self.profiles.iter().enumerate() {
            match self.backend.open(path, profile) {
                Ok(handle) => {
                    if index > 0 {
                        debug!(
                            path = %path.display(),
                            profile = %profile,
                            "connection opened via fallback profile"
                        );
                    }
                    return Ok(handle);
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        profile = %profile,
                        error = %err,
                        "connection attempt failed"
                    );
                    attempts.push(format!("{profile}: {err}"));
                    if err.is_resource_unavailable() {
                        return Err(err);
                    }
                    if !err.is_driver_mismatch() {
                        return Err(Error::connection_broken(path, attempts.join("; ")));
                    }
                    // Driver mismatch: try the next profile, if any.
                }
            }
        }
        Err(Error::connection_broken(path, attempts.join("; ")))
    }
}
