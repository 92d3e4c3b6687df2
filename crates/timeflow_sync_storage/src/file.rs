//! File-based key-value store for persistent records.

use crate::backend::{validate_key, KeyValueStore};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A directory-backed key-value store.
///
/// Each key is stored in `<dir>/<key>.json`. Values survive process restarts.
///
/// # Durability
///
/// `put` writes the value to a temporary sibling file, syncs it and renames it
/// over the record, so a crash leaves either the old or the new value.
///
/// # Thread Safety
///
/// Writers are serialized by an internal lock; readers never observe a
/// partially written record.
///
/// # Example
///
/// ```no_run
/// use timeflow_sync_storage::{FileStore, KeyValueStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new(".timeflow-sync")).unwrap();
/// store.put("timeflow.sync.state", "{}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file holding `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid.
    pub fn record_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.record_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StorageError::Corrupted(key.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.record_path(key)?;
        let tmp_path = self.dir.join(format!("{key}.json.tmp"));

        let _guard = self.write_lock.lock();
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.record_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("timeflow.sync.state", r#"{"version":2}"#).unwrap();
        assert_eq!(
            store.get("timeflow.sync.state").unwrap().as_deref(),
            Some(r#"{"version":2}"#)
        );
        assert!(dir.path().join("timeflow.sync.state.json").exists());
        assert!(!dir.path().join("timeflow.sync.state.json.tmp").exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put("settings", "persistent").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("settings").unwrap().as_deref(), Some("persistent"));
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("k", "v").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
        store.remove("k").unwrap();
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("path");

        let store = FileStore::open(&nested).unwrap();
        store.put("k", "v").unwrap();
        assert!(nested.join("k.json").exists());
        assert_eq!(store.dir(), nested);
    }

    #[test]
    fn file_non_utf8_is_corrupted() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.json"), [0xff, 0xfe]).unwrap();
        assert!(matches!(store.get("bad"), Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn file_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.put("../outside", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
