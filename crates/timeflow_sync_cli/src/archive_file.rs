//! A dataset kept in a single JSON file.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use timeflow_sync_engine::{ArchiveHost, SyncError, SyncResult};
use timeflow_sync_protocol::{Archive, ImportSummary};
use tokio::io::AsyncWriteExt;

/// Size and modification time of the dataset file, `None` if it is missing.
pub type FileSignature = Option<(u64, SystemTime)>;

/// Exposes a JSON file as the host dataset.
///
/// Export reads the file (a missing file is an empty dataset). Import writes
/// a temporary sibling and renames it over the file, so readers see either
/// the old or the new dataset.
#[derive(Debug)]
pub struct FileArchiveHost {
    path: PathBuf,
    demo: bool,
    synced: Mutex<FileSignature>,
}

impl FileArchiveHost {
    /// Creates a host for the dataset at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let synced = Mutex::new(signature(&path));
        Self {
            path,
            demo: false,
            synced,
        }
    }

    /// Marks the dataset as demo data.
    pub fn with_demo_mode(mut self, demo: bool) -> Self {
        self.demo = demo;
        self
    }

    /// Returns the dataset path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file changed since the engine last read or wrote it.
    ///
    /// The change is consumed: a second call returns false until the file
    /// changes again.
    pub fn take_local_change(&self) -> bool {
        let current = signature(&self.path);
        let mut synced = self.synced.lock();
        if *synced == current {
            return false;
        }
        *synced = current;
        true
    }

    fn mark_synced(&self) {
        *self.synced.lock() = signature(&self.path);
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "archive.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn host_error(&self, action: &str, e: impl std::fmt::Display) -> SyncError {
        SyncError::host(format!("{action} {}: {e}", self.path.display()))
    }
}

#[async_trait]
impl ArchiveHost for FileArchiveHost {
    async fn export_archive(&self) -> SyncResult<Archive> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Archive::new(json!({"data": {}})));
            }
            Err(e) => return Err(self.host_error("reading", e)),
        };

        let archive = Archive::from_slice(&bytes).map_err(|e| self.host_error("parsing", e))?;
        self.mark_synced();
        Ok(archive)
    }

    async fn import_archive(&self, archive: &Archive) -> SyncResult<ImportSummary> {
        let bytes =
            serde_json::to_vec_pretty(archive.as_value()).map_err(|e| SyncError::Codec(e.to_string()))?;
        let tmp_path = self.tmp_path();

        let write = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp_path, &self.path).await
        };
        write.await.map_err(|e| self.host_error("writing", e))?;

        self.mark_synced();
        tracing::info!(path = %self.path.display(), bytes = bytes.len(), "dataset replaced");
        Ok(ImportSummary::replacing_with(archive))
    }

    async fn is_demo_mode(&self) -> bool {
        self.demo
    }
}

fn signature(path: &Path) -> FileSignature {
    let metadata = std::fs::metadata(path).ok()?;
    Some((metadata.len(), metadata.modified().ok()?))
}
