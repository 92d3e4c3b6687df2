//! Per-user revision history.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use timeflow_sync_protocol::Archive;

/// One stored revision of a user's dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRevision {
    /// Monotonic revision number, starting at 1.
    pub revision: u64,
    /// Content hash of the payload.
    pub payload_sha256: String,
    /// The payload, or `None` once it has been pruned.
    pub archive: Option<Archive>,
    /// Device that pushed the payload.
    pub device_id: String,
    /// When the payload was received.
    pub received_at: DateTime<Utc>,
}

impl StoredRevision {
    /// Returns true if the payload is no longer available.
    pub fn is_pruned(&self) -> bool {
        self.archive.is_none()
    }
}

#[derive(Debug, Default)]
struct UserHistory {
    /// Revisions in ascending order.
    revisions: Vec<StoredRevision>,
    /// Last acknowledged revision per device.
    acks: HashMap<String, u64>,
}

impl UserHistory {
    fn latest(&self) -> Option<&StoredRevision> {
        self.revisions.last()
    }

    fn prune_beyond(&mut self, retained: usize) -> usize {
        let keep_from = self.revisions.len().saturating_sub(retained);
        let mut pruned = 0;
        for revision in &mut self.revisions[..keep_from] {
            if revision.archive.take().is_some() {
                pruned += 1;
            }
        }
        pruned
    }
}

/// In-memory store of every user's revisions.
///
/// Appends are serialized under a write lock so the hash check and the
/// revision bump are atomic.
#[derive(Debug)]
pub struct RevisionStore {
    users: RwLock<HashMap<String, UserHistory>>,
    retained_archives: usize,
}

impl RevisionStore {
    /// Creates an empty store keeping the archives of the last `retained_archives` revisions.
    pub fn new(retained_archives: usize) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            retained_archives: retained_archives.max(1),
        }
    }

    /// Returns the latest revision for a user.
    pub fn latest(&self, user_id: &str) -> Option<StoredRevision> {
        self.users
            .read()
            .get(user_id)
            .and_then(UserHistory::latest)
            .cloned()
    }

    /// Returns a specific revision for a user.
    pub fn get(&self, user_id: &str, revision: u64) -> Option<StoredRevision> {
        self.users
            .read()
            .get(user_id)?
            .revisions
            .iter()
            .find(|stored| stored.revision == revision)
            .cloned()
    }

    /// Stores a payload unless it matches the latest revision.
    ///
    /// Returns the revision now holding the payload and whether the call was
    /// a no-op.
    pub fn append(
        &self,
        user_id: &str,
        device_id: &str,
        archive: Archive,
        payload_sha256: String,
    ) -> (StoredRevision, bool) {
        let mut users = self.users.write();
        let history = users.entry(user_id.to_string()).or_default();

        if let Some(latest) = history.latest() {
            if latest.payload_sha256 == payload_sha256 {
                return (latest.clone(), true);
            }
        }

        let stored = StoredRevision {
            revision: history.latest().map_or(1, |latest| latest.revision + 1),
            payload_sha256,
            archive: Some(archive),
            device_id: device_id.to_string(),
            received_at: Utc::now(),
        };
        history.revisions.push(stored.clone());

        let pruned = history.prune_beyond(self.retained_archives);
        if pruned > 0 {
            tracing::debug!(user_id, pruned, "pruned old archives");
        }

        (stored, false)
    }

    /// Records that a device imported a revision.
    pub fn record_ack(&self, user_id: &str, device_id: &str, revision: u64) {
        let mut users = self.users.write();
        let history = users.entry(user_id.to_string()).or_default();
        history.acks.insert(device_id.to_string(), revision);
    }

    /// Returns the last revision a device acknowledged.
    pub fn acked_revision(&self, user_id: &str, device_id: &str) -> Option<u64> {
        self.users.read().get(user_id)?.acks.get(device_id).copied()
    }

    /// Drops every stored archive of a user, keeping only hashes.
    ///
    /// Returns the number of archives dropped.
    pub fn prune_all(&self, user_id: &str) -> usize {
        self.users
            .write()
            .get_mut(user_id)
            .map_or(0, |history| history.prune_beyond(0))
    }

    /// Returns the number of revisions stored for a user.
    pub fn revision_count(&self, user_id: &str) -> usize {
        self.users
            .read()
            .get(user_id)
            .map_or(0, |history| history.revisions.len())
    }

    /// Returns the number of revisions of a user that still hold an archive.
    pub fn archive_count(&self, user_id: &str) -> usize {
        self.users.read().get(user_id).map_or(0, |history| {
            history.revisions.iter().filter(|stored| !stored.is_pruned()).count()
        })
    }
}

impl Default for RevisionStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RETAINED_ARCHIVES)
    }
}
