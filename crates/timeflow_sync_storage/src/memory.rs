//! In-memory key-value store for testing.

use crate::backend::{validate_key, KeyValueStore};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory key-value store.
///
/// Suitable for unit tests, integration tests and engines that do not need
/// to survive a restart.
///
/// # Example
///
/// ```rust
/// use timeflow_sync_storage::{InMemoryStore, KeyValueStore};
///
/// let store = InMemoryStore::new();
/// store.put("settings", r#"{"enabled":true}"#).unwrap();
/// store.remove("settings").unwrap();
/// assert!(store.get("settings").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing records.
    ///
    /// Useful for testing recovery from corrupt or legacy data.
    #[must_use]
    pub fn with_records<I, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.records.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.records.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn memory_put_get_remove() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());

        store.put("a", "1").unwrap();
        store.put("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);

        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
        store.remove("a").unwrap();
    }

    #[test]
    fn memory_with_records() {
        let store = InMemoryStore::with_records([("k", "v")]);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn memory_rejects_bad_keys() {
        let store = InMemoryStore::new();
        assert!(matches!(store.put("a/b", "x"), Err(StorageError::InvalidKey(_))));
    }
}
