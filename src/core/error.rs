use std::path::Path;

use thiserror::Error;

/// Error taxonomy for pooling, recovery, and coordinated search.
///
/// Every variant is `Clone` so a single in-flight result can be handed to all
/// waiters of a single-flight search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Empty variable name, empty source list. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Source file missing or unreadable. Surfaced to the caller, who may
    /// retry later; the pool never retries it.
    #[error("resource unavailable: {path}: {reason}")]
    ResourceUnavailable { path: String, reason: String },

    /// Backend handle could not be (re)created after the bounded profile
    /// fallback chain was exhausted.
    #[error("connection broken: {path}: {reason}")]
    ConnectionBroken { path: String, reason: String },

    /// The backend rejected a connection profile. Recovery treats this as
    /// the one cause worth retrying with an alternate profile.
    #[error("driver mismatch: {0}")]
    DriverMismatch(String),

    /// A backend query failed on an otherwise healthy handle.
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl Error {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument(reason.into())
    }

    pub fn resource_unavailable(path: &Path, reason: impl Into<String>) -> Self {
        Error::ResourceUnavailable {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn connection_broken(path: &Path, reason: impl Into<String>) -> Self {
        Error::ConnectionBroken {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// True when recovery may retry with an alternate connection profile.
    pub fn is_driver_mismatch(&self) -> bool {
        matches!(self, Error::DriverMismatch(_))
    }

    pub fn is_resource_unavailable(&self) -> bool {
        matches!(self, Error::ResourceUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classification_helpers() {
        let mismatch = Error::DriverMismatch("ACE 12.0 not registered".into());
        assert!(mismatch.is_driver_mismatch());
        assert!(!mismatch.is_resource_unavailable());

        let missing = Error::resource_unavailable(&PathBuf::from("/tmp/x.xlsx"), "not found");
        assert!(missing.is_resource_unavailable());
        assert!(!missing.is_driver_mismatch());
    }

    #[test]
    fn display_includes_path() {
        let err = Error::connection_broken(&PathBuf::from("/data/new_interface.xlsx"), "open failed");
        let msg = err.to_string();
        assert!(msg.contains("/data/new_interface.xlsx"));
        assert!(msg.contains("open failed"));
    }
}
