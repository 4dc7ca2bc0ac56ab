//! Shared schema-metadata cache
//!
//! Multiple concurrent transfer runs may share one cache to avoid repeated
//! catalog introspection of the same table. The cache is passed to the
//! controller explicitly; there is no process-wide static. Keys are
//! caller-supplied model keys (typically the resolved table identity), and
//! entries live until invalidated.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use rowferry_rdbc::types::TableMetadata;

/// Cache of resolved table definitions, keyed by model key
#[derive(Clone, Default)]
pub struct SchemaCache {
    entries: Arc<Mutex<HashMap<String, Arc<TableMetadata>>>>,
}

impl SchemaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached table definition
    pub fn get(&self, key: &str) -> Option<Arc<TableMetadata>> {
        self.entries.lock().get(key).cloned()
    }

    /// Store a table definition under a key, replacing any previous entry
    pub fn insert(&self, key: impl Into<String>, table: TableMetadata) -> Arc<TableMetadata> {
        let entry = Arc::new(table);
        self.entries.lock().insert(key.into(), Arc::clone(&entry));
        entry
    }

    /// Drop the entry under a key, if present
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
