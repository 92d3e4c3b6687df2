//! The host application's dataset, as seen by the sync engine.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use timeflow_sync_protocol::{Archive, ImportSummary};

/// Export/import routines of the host application.
///
/// Both operations are treated as atomic: the engine never inspects the
/// archive beyond hashing it and checking whether it holds reseed data.
#[async_trait]
pub trait ArchiveHost: Send + Sync {
    /// Serializes the full local dataset.
    async fn export_archive(&self) -> SyncResult<Archive>;

    /// Replaces the local dataset with `archive`.
    async fn import_archive(&self, archive: &Archive) -> SyncResult<ImportSummary>;

    /// Returns true if the host runs on demo data that must never be synced.
    async fn is_demo_mode(&self) -> bool {
        false
    }
}

/// An in-memory dataset for testing.
#[derive(Debug)]
pub struct MemoryArchiveHost {
    archive: RwLock<Archive>,
    imports: RwLock<Vec<Archive>>,
    exports: RwLock<u64>,
    demo: AtomicBool,
    fail_export: RwLock<Option<String>>,
}

impl MemoryArchiveHost {
    /// Creates a host holding `archive`.
    pub fn new(archive: Archive) -> Self {
        Self {
            archive: RwLock::new(archive),
            imports: RwLock::new(Vec::new()),
            exports: RwLock::new(0),
            demo: AtomicBool::new(false),
            fail_export: RwLock::new(None),
        }
    }

    /// Returns the current dataset.
    pub fn archive(&self) -> Archive {
        self.archive.read().clone()
    }

    /// Replaces the dataset, as a local edit would.
    pub fn set_archive(&self, archive: Archive) {
        *self.archive.write() = archive;
    }

    /// Gets all imported archives, oldest first.
    pub fn imports(&self) -> Vec<Archive> {
        self.imports.read().clone()
    }

    /// Number of exports performed.
    pub fn export_count(&self) -> u64 {
        *self.exports.read()
    }

    /// Switches demo mode.
    pub fn set_demo_mode(&self, demo: bool) {
        self.demo.store(demo, Ordering::SeqCst);
    }

    /// Makes subsequent exports fail with `message`, or succeed again with `None`.
    pub fn set_export_failure(&self, message: Option<String>) {
        *self.fail_export.write() = message;
    }
}

impl Default for MemoryArchiveHost {
    fn default() -> Self {
        Self::new(Archive::new(serde_json::json!({})))
    }
}

#[async_trait]
impl ArchiveHost for MemoryArchiveHost {
    async fn export_archive(&self) -> SyncResult<Archive> {
        let failure = self.fail_export.read().clone();
        if let Some(message) = failure {
            return Err(SyncError::host(message));
        }
        *self.exports.write() += 1;
        Ok(self.archive())
    }

    async fn import_archive(&self, archive: &Archive) -> SyncResult<ImportSummary> {
        self.imports.write().push(archive.clone());
        *self.archive.write() = archive.clone();
        Ok(ImportSummary::replacing_with(archive))
    }

    async fn is_demo_mode(&self) -> bool {
        self.demo.load(Ordering::SeqCst)
    }
}
