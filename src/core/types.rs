use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Normalized, case-insensitive absolute path. The sole pool and cache key.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Normalize a path into a key: absolute form, lowercased.
    ///
    /// Does not require the file to exist; existence is the backend's concern.
    pub fn normalize(path: &Path) -> Self {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        ResourceKey(absolute.to_string_lossy().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four correlated sources a coordinated search spans: two document
/// kinds (interface sheets and dataflow maps), each in a new and old version.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRole {
    NewInterface,
    OldInterface,
    NewDataflow,
    OldDataflow,
}

impl SourceRole {
    /// Fixed acquisition/query order. Matters only for lock ordering when
    /// coordinators share pooled resources, not for result semantics.
    pub const SEARCH_ORDER: [SourceRole; 4] = [
        SourceRole::NewInterface,
        SourceRole::OldInterface,
        SourceRole::NewDataflow,
        SourceRole::OldDataflow,
    ];

    pub fn is_interface(self) -> bool {
        matches!(self, SourceRole::NewInterface | SourceRole::OldInterface)
    }

    pub fn is_dataflow(self) -> bool {
        !self.is_interface()
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceRole::NewInterface => "new interface",
            SourceRole::OldInterface => "old interface",
            SourceRole::NewDataflow => "new dataflow",
            SourceRole::OldDataflow => "old dataflow",
        }
    }
}

/// One matched row from a source, column name to cell value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub fields: HashMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// Cooperative cancellation signal for batch operations.
///
/// Cancellation stops dispatch of further work; operations already in flight
/// run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn resource_key_is_case_insensitive() {
        let a = ResourceKey::normalize(&PathBuf::from("/Data/New_Interface.XLSX"));
        let b = ResourceKey::normalize(&PathBuf::from("/data/new_interface.xlsx"));
        assert_eq!(a, b);
    }

    #[test]
    fn resource_key_absolutizes_relative_paths() {
        let relative = ResourceKey::normalize(&PathBuf::from("sheet.xlsx"));
        assert!(relative.as_str().ends_with("sheet.xlsx"));
        assert_ne!(relative.as_str(), "sheet.xlsx");
    }

    #[test]
    fn search_order_covers_all_roles() {
        assert_eq!(SourceRole::SEARCH_ORDER.len(), 4);
        assert!(SourceRole::SEARCH_ORDER[0].is_interface());
        assert!(SourceRole::SEARCH_ORDER[3].is_dataflow());
    }

    #[test]
    fn cancellation_token_propagates_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
