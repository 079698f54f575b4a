//! In-memory store.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use revar_core::Value;

use crate::PersistentStore;
use crate::errors::Result;

/// Process-local [`PersistentStore`]. Never fails.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(name).cloned())
    }

    fn set(&self, name: &str, value: &Value) -> Result<()> {
        let _ = self.entries.write().insert(name.to_owned(), value.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        Ok(self.entries.write().remove(name).is_some())
    }

    fn names(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
