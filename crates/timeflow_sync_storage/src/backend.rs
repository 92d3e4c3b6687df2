//! Key-value store trait definition.

use crate::error::{StorageError, StorageResult};

/// A durable store of string records addressed by key.
///
/// # Invariants
///
/// - `get` returns exactly the value of the last successful `put` for that key
/// - a `put` either fully replaces the previous value or leaves it untouched
/// - keys consist of ASCII letters, digits, `.`, `-` and `_`
/// - stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if nothing was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn put(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes the value stored under `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Checks that a key is usable by every store.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty keys, keys starting with a
/// dot, or keys containing characters outside `[A-Za-z0-9._-]`.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(validate_key("timeflow.settings.online-sync").is_ok());
        assert!(validate_key("timeflow_sync.state").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("a/b").is_err());
    }
}
