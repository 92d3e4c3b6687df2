//! Request and response bodies for the sync endpoints.
//!
//! The server may add fields (such as `ok: true`); unknown fields are ignored.

use crate::archive::Archive;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/sync/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    /// Account the dataset belongs to.
    pub user_id: String,
    /// Stable identifier of the calling device.
    pub device_id: String,
    /// Last server revision the client holds.
    pub client_revision: u64,
    /// Content hash of the client's last known payload.
    pub client_hash: Option<String>,
}

impl StatusRequest {
    /// Creates a new status request.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        client_revision: u64,
        client_hash: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            client_revision,
            client_hash,
        }
    }
}

/// Response of `POST /api/sync/status`.
///
/// The server alone decides whether the client should pull or push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Latest revision on the server, if it reported one.
    #[serde(default)]
    pub server_revision: Option<u64>,
    /// Content hash of the latest server payload.
    #[serde(default)]
    pub server_hash: Option<String>,
    /// Whether the server wants the client's data.
    #[serde(default)]
    pub should_push: bool,
    /// Whether the client should download the server's data.
    #[serde(default)]
    pub should_pull: bool,
    /// Why the server decided this way.
    #[serde(default)]
    pub reason: String,
}

/// Body of `POST /api/sync/pull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Account the dataset belongs to.
    pub user_id: String,
    /// Stable identifier of the calling device.
    pub device_id: String,
    /// Last server revision the client holds.
    pub client_revision: u64,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>, client_revision: u64) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            client_revision,
        }
    }
}

/// Response of `POST /api/sync/pull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Whether the server holds something the client does not.
    #[serde(default)]
    pub has_update: bool,
    /// Revision of the returned (or latest) payload.
    #[serde(default)]
    pub revision: Option<u64>,
    /// Content hash of the returned (or latest) payload.
    #[serde(default)]
    pub payload_sha256: Option<String>,
    /// When the server received the payload.
    #[serde(default)]
    pub received_at: Option<String>,
    /// The payload itself; present only when `has_update` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<Archive>,
    /// Why the server answered this way.
    #[serde(default)]
    pub reason: String,
}

impl PullResponse {
    /// Creates a response carrying an archive.
    pub fn update(revision: u64, payload_sha256: impl Into<String>, archive: Archive) -> Self {
        Self {
            has_update: true,
            revision: Some(revision),
            payload_sha256: Some(payload_sha256.into()),
            received_at: None,
            archive: Some(archive),
            reason: crate::reason::SERVER_NEWER.into(),
        }
    }

    /// Creates a response without an archive.
    pub fn no_update(
        revision: Option<u64>,
        payload_sha256: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            has_update: false,
            revision,
            payload_sha256,
            received_at: None,
            archive: None,
            reason: reason.into(),
        }
    }
}

/// Body of `POST /api/sync/push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Account the dataset belongs to.
    pub user_id: String,
    /// Stable identifier of the calling device.
    pub device_id: String,
    /// Server revision the client based its data on.
    pub known_server_revision: u64,
    /// Full local dataset.
    pub archive: Archive,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        known_server_revision: u64,
        archive: Archive,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            known_server_revision,
            archive,
        }
    }
}

/// Response of `POST /api/sync/push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Explicit refusal when `Some(false)`; older servers omit the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    /// True when the payload matched the latest revision and nothing was stored.
    #[serde(default)]
    pub no_op: bool,
    /// Revision now holding the payload.
    pub revision: u64,
    /// Content hash of the stored payload.
    pub payload_sha256: String,
    /// When the server received the payload.
    #[serde(default)]
    pub received_at: Option<String>,
    /// Why the server answered this way.
    #[serde(default)]
    pub reason: String,
}

/// Body of `POST /api/sync/ack`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
    /// Account the dataset belongs to.
    pub user_id: String,
    /// Stable identifier of the calling device.
    pub device_id: String,
    /// Revision that was imported.
    pub revision: u64,
    /// Content hash of the imported payload.
    pub payload_sha256: String,
}

/// Response of `POST /api/sync/ack`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    /// Whether the acknowledgement was recorded.
    #[serde(default)]
    pub accepted: bool,
    /// Acknowledged revision.
    #[serde(default)]
    pub revision: u64,
    /// Acknowledged hash.
    #[serde(default)]
    pub payload_sha256: String,
    /// Latest revision on the server.
    #[serde(default)]
    pub server_revision: u64,
    /// Content hash of the latest server payload.
    #[serde(default)]
    pub server_hash: Option<String>,
    /// Whether the acknowledged revision is the latest one.
    #[serde(default)]
    pub is_latest: bool,
    /// Why the server answered this way.
    #[serde(default)]
    pub reason: String,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always false.
    #[serde(default)]
    pub ok: bool,
    /// Human-readable error.
    pub error: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}
