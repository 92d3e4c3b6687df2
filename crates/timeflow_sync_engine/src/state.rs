//! Durable sync state, scoped per account and device.

use crate::error::SyncResult;
use crate::settings::SyncSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use timeflow_sync_storage::KeyValueStore;
use tracing::{debug, warn};

/// Storage key of the state envelope.
pub const STATE_KEY: &str = "timeflow.sync.state";

/// Current envelope version.
pub const STATE_ENVELOPE_VERSION: u64 = 2;

const NO_USER: &str = "__no_user__";
const NO_DEVICE: &str = "__no_device__";

/// An imported revision the server has not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAck {
    /// Revision that was imported.
    pub revision: u64,
    /// Payload hash of that revision.
    pub payload_sha256: String,
    /// When the import happened.
    pub created_at: DateTime<Utc>,
    /// Failed flush attempts so far.
    pub retries: u32,
    /// Message of the last failed flush.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingAck {
    /// Creates a fresh pending acknowledgement.
    pub fn new(revision: u64, payload_sha256: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            revision,
            payload_sha256: payload_sha256.into(),
            created_at,
            retries: 0,
            last_error: None,
        }
    }

    fn from_json_value(value: &Value) -> Option<Self> {
        let revision = value.get("revision").and_then(Value::as_f64)?;
        let payload_sha256 = non_empty_str(value, "payloadSha256")?;
        let created_at = timestamp_field(value, "createdAt")?;
        Some(Self {
            revision: revision.max(0.0) as u64,
            payload_sha256: payload_sha256.to_string(),
            created_at,
            retries: value
                .get("retries")
                .and_then(Value::as_u64)
                .map(|n| n.min(u64::from(u32::MAX)) as u32)
                .unwrap_or(0),
            last_error: non_empty_str(value, "lastError").map(str::to_string),
        })
    }
}

/// What this client knows about the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Last known server revision.
    pub server_revision: u64,
    /// Payload hash of that revision.
    pub server_hash: Option<String>,
    /// Time of the last successful exchange.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Imported revision awaiting acknowledgement.
    pub pending_ack: Option<PendingAck>,
    /// Set when the server lost its snapshot and this client had nothing to reseed it with.
    pub needs_reseed: bool,
}

impl SyncState {
    /// Builds state from an untrusted JSON record; malformed fields fall back to defaults.
    pub fn from_json_value(value: &Value) -> Self {
        Self {
            server_revision: value
                .get("serverRevision")
                .and_then(Value::as_f64)
                .filter(|n| n.is_finite())
                .map(|n| n.max(0.0) as u64)
                .unwrap_or(0),
            server_hash: non_empty_str(value, "serverHash").map(str::to_string),
            last_sync_at: timestamp_field(value, "lastSyncAt"),
            pending_ack: value.get("pendingAck").and_then(PendingAck::from_json_value),
            needs_reseed: value.get("needsReseed").and_then(Value::as_bool).unwrap_or(false),
        }
    }

    /// Records a revision/hash pair reported by the server.
    pub fn record_server(&mut self, revision: u64, hash: Option<String>) {
        self.server_revision = revision;
        self.server_hash = hash;
    }

    /// Records a completed exchange at `now`.
    pub fn mark_synced(&mut self, now: DateTime<Utc>) {
        self.last_sync_at = Some(now);
    }
}

/// Scope key for an account/device pair.
pub fn scope_key(settings: &SyncSettings) -> String {
    let user = settings.user_id.trim();
    let device = settings.device_id.trim();
    format!(
        "{}::{}",
        if user.is_empty() { NO_USER } else { user },
        if device.is_empty() { NO_DEVICE } else { device }
    )
}

/// Durable store of [`SyncState`].
///
/// All scopes live in one versioned record:
///
/// ```json
/// {"version": 2, "scopes": {"<userId>::<deviceId>": { ... }}}
/// ```
///
/// A record without the envelope is read as a single legacy state and
/// migrated into the current scope.
#[derive(Clone)]
pub struct SyncStateStore {
    store: Arc<dyn KeyValueStore>,
}

impl SyncStateStore {
    /// Creates a state store on top of a key-value store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the state for the scope of `settings`.
    ///
    /// Never fails; missing or corrupt data yields defaults, which are
    /// written back.
    pub fn load(&self, settings: &SyncSettings) -> SyncState {
        let key = scope_key(settings);
        let record = self.read_record();

        let (state, heal) = match record.as_ref() {
            Some(value) => match envelope_scopes(value) {
                Some(scopes) => match scopes.get(&key).filter(|v| v.is_object()) {
                    Some(scoped) => (SyncState::from_json_value(scoped), false),
                    None => (SyncState::default(), true),
                },
                None => {
                    debug!(scope = %key, "migrating legacy sync state");
                    (SyncState::from_json_value(value), true)
                }
            },
            None => (SyncState::default(), true),
        };

        if heal {
            if let Err(e) = self.save(settings, &state) {
                warn!(error = %e, "failed to persist sync state defaults");
            }
        }

        state
    }

    /// Persists `state` into the scope of `settings`, keeping other scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn save(&self, settings: &SyncSettings, state: &SyncState) -> SyncResult<()> {
        let mut scopes = self
            .read_record()
            .as_ref()
            .and_then(envelope_scopes)
            .map(|scopes| {
                scopes
                    .iter()
                    .filter(|(_, v)| v.is_object())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Map<String, Value>>()
            })
            .unwrap_or_default();

        scopes.insert(scope_key(settings), serde_json::to_value(state)?);

        let envelope = serde_json::json!({
            "version": STATE_ENVELOPE_VERSION,
            "scopes": scopes,
        });
        self.store.put(STATE_KEY, &serde_json::to_string(&envelope)?)?;
        Ok(())
    }

    fn read_record(&self) -> Option<Value> {
        let raw = match self.store.get(STATE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read sync state");
                return None;
            }
        };
        serde_json::from_str::<Value>(&raw)
            .ok()
            .filter(Value::is_object)
    }
}

impl std::fmt::Debug for SyncStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStateStore").finish_non_exhaustive()
    }
}

fn envelope_scopes(value: &Value) -> Option<&Map<String, Value>> {
    if value.get("version").and_then(Value::as_u64) != Some(STATE_ENVELOPE_VERSION) {
        return None;
    }
    value.get("scopes").and_then(Value::as_object)
}

fn non_empty_str<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn timestamp_field(value: &Value, name: &str) -> Option<DateTime<Utc>> {
    non_empty_str(value, name)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}
