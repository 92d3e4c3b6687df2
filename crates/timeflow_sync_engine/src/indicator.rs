//! Human-facing sync status and its broadcaster.
//!
//! [`compute_snapshot`] is a pure projection of settings, state and the most
//! recent run. [`IndicatorHub`] caches the last snapshot and fans it out to
//! subscribers.

use crate::result::{RunResult, SyncAction};
use crate::settings::SyncSettings;
use crate::state::{PendingAck, SyncState};
use chrono::{DateTime, Local, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use timeflow_sync_protocol::reason;

/// Coarse status shown by an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorStatus {
    /// Sync is switched off.
    Disabled,
    /// Server URL or user id missing.
    Unconfigured,
    /// Ready, no run in flight.
    Idle,
    /// A run is in flight.
    Syncing,
    /// The last run succeeded.
    Success,
    /// An acknowledgement is outstanding.
    Warning,
    /// The last run failed, or the server needs a reseed.
    Error,
}

impl IndicatorStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorStatus::Disabled => "disabled",
            IndicatorStatus::Unconfigured => "unconfigured",
            IndicatorStatus::Idle => "idle",
            IndicatorStatus::Syncing => "syncing",
            IndicatorStatus::Success => "success",
            IndicatorStatus::Warning => "warning",
            IndicatorStatus::Error => "error",
        }
    }
}

/// A derived, broadcast-only view of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    /// Coarse status.
    pub status: IndicatorStatus,
    /// Short label.
    pub label: String,
    /// One-line detail.
    pub detail: String,
    /// Last known server revision.
    pub server_revision: u64,
    /// Last known server hash.
    pub server_hash: Option<String>,
    /// Time of the last successful exchange.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Action of the run this snapshot reflects.
    pub last_action: Option<SyncAction>,
    /// Reason of the run this snapshot reflects.
    pub last_reason: Option<String>,
    /// Error shown to the user.
    pub error: Option<String>,
    /// Outstanding acknowledgement.
    pub pending_ack: Option<PendingAck>,
    /// Whether the server needs a reseed.
    pub needs_reseed: bool,
}

impl IndicatorSnapshot {
    fn new(status: IndicatorStatus, label: &str, detail: impl Into<String>, state: &SyncState) -> Self {
        Self {
            status,
            label: label.to_string(),
            detail: detail.into(),
            server_revision: state.server_revision,
            server_hash: state.server_hash.clone(),
            last_sync_at: state.last_sync_at,
            last_action: None,
            last_reason: None,
            error: None,
            pending_ack: state.pending_ack.clone(),
            needs_reseed: state.needs_reseed,
        }
    }

    fn with_run(mut self, result: &RunResult) -> Self {
        self.last_action = Some(result.action);
        self.last_reason = Some(result.reason.clone());
        self
    }
}

/// Projects settings, state and the latest run into a snapshot.
///
/// `last` is the run that just finished, if the snapshot is published at the
/// end of a run; refreshes after settings or state reads pass `None`, which
/// lets a previous success or error decay to idle.
pub fn compute_snapshot(
    settings: &SyncSettings,
    state: &SyncState,
    last: Option<&RunResult>,
    syncing: bool,
) -> IndicatorSnapshot {
    use IndicatorStatus::*;

    if !settings.enabled {
        return IndicatorSnapshot::new(Disabled, "Sync Off", "Online sync disabled", state);
    }

    if !settings.is_configured() {
        return IndicatorSnapshot::new(
            Unconfigured,
            "Sync Setup",
            "Configure server URL and user ID",
            state,
        );
    }

    if syncing {
        let target = if settings.server_url.is_empty() {
            "server"
        } else {
            settings.server_url.as_str()
        };
        return IndicatorSnapshot::new(Syncing, "Syncing...", format!("Contacting {target}..."), state);
    }

    match last {
        Some(result) if result.skipped && result.reason == reason::DEMO_MODE => {
            IndicatorSnapshot::new(
                Disabled,
                "Sync Off (Demo)",
                "Online sync is disabled while Demo Mode is active",
                state,
            )
            .with_run(result)
        }
        Some(result) if result.skipped => from_state(state),
        Some(result) if !result.ok => {
            let label = if result.needs_reseed || state.needs_reseed {
                "Reseed Required"
            } else {
                "Sync Error"
            };
            let message = result.error.clone().unwrap_or_else(|| result.reason.clone());
            let mut snapshot = IndicatorSnapshot::new(Error, label, message.clone(), state).with_run(result);
            snapshot.error = Some(message);
            snapshot
        }
        Some(result) if result.ack_pending == Some(true) || state.pending_ack.is_some() => {
            let detail = match result.ack_reason.as_deref() {
                Some(ack_reason) if ack_reason != reason::ACK_DEFERRED => {
                    format!("Waiting for ACK retry ({ack_reason})")
                }
                _ => pending_ack_detail(state),
            };
            IndicatorSnapshot::new(Warning, "ACK Pending", detail, state).with_run(result)
        }
        Some(result) => {
            let label = match result.action {
                SyncAction::None => "Sync OK",
                SyncAction::Noop => "Sync No-op",
                SyncAction::Push => "Sync Pushed",
                SyncAction::Pull => "Sync Pulled",
            };
            IndicatorSnapshot::new(Success, label, last_sync_detail(state), state).with_run(result)
        }
        None => from_state(state),
    }
}

fn from_state(state: &SyncState) -> IndicatorSnapshot {
    if state.needs_reseed {
        let mut snapshot = IndicatorSnapshot::new(
            IndicatorStatus::Error,
            "Reseed Required",
            "Server payload was cleaned up and local reseed data is unavailable",
            state,
        );
        snapshot.last_reason = Some(reason::SERVER_SNAPSHOT_PRUNED.to_string());
        snapshot.error = Some(reason::SERVER_SNAPSHOT_PRUNED.to_string());
        return snapshot;
    }

    if state.pending_ack.is_some() {
        let mut snapshot = IndicatorSnapshot::new(
            IndicatorStatus::Warning,
            "ACK Pending",
            pending_ack_detail(state),
            state,
        );
        snapshot.last_reason = Some("pending_ack".to_string());
        return snapshot;
    }

    IndicatorSnapshot::new(IndicatorStatus::Idle, "Sync Ready", last_sync_detail(state), state)
}

fn short_hash(hash: Option<&str>) -> String {
    match hash {
        Some(hash) => format!("{}...", hash.get(..8).unwrap_or(hash)),
        None => "n/a".to_string(),
    }
}

fn last_sync_detail(state: &SyncState) -> String {
    match state.last_sync_at {
        Some(at) => format!(
            "Last sync {} • r{} • {}",
            at.with_timezone(&Local).format("%H:%M:%S"),
            state.server_revision,
            short_hash(state.server_hash.as_deref())
        ),
        None => "No sync yet".to_string(),
    }
}

fn pending_ack_detail(state: &SyncState) -> String {
    match &state.pending_ack {
        Some(pending) if pending.retries > 0 => format!(
            "Downloaded r{}, waiting for ACK • retries {}",
            pending.revision, pending.retries
        ),
        Some(pending) => format!("Downloaded r{}, waiting for ACK", pending.revision),
        None => "ACK pending".to_string(),
    }
}

type Listener = Arc<dyn Fn(&IndicatorSnapshot) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
    last: RwLock<Option<IndicatorSnapshot>>,
}

impl HubInner {
    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Observer registry for [`IndicatorSnapshot`]s.
///
/// Publishing with no subscribers only updates the cache.
#[derive(Clone, Default)]
pub struct IndicatorHub {
    inner: Arc<HubInner>,
}

impl IndicatorHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches `snapshot` and hands it to every subscriber.
    pub fn publish(&self, snapshot: IndicatorSnapshot) {
        *self.inner.last.write() = Some(snapshot.clone());

        // Listeners run outside the lock so they may subscribe or unsubscribe.
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    /// Returns the last published snapshot.
    pub fn latest(&self) -> Option<IndicatorSnapshot> {
        self.inner.last.read().clone()
    }

    /// Registers `listener` and immediately replays the cached snapshot to it.
    ///
    /// The listener stays registered until the returned subscription is
    /// dropped or [`IndicatorSubscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, listener: F) -> IndicatorSubscription
    where
        F: Fn(&IndicatorSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.inner.listeners.lock().push((id, listener.clone()));

        if let Some(snapshot) = self.latest() {
            listener(&snapshot);
        }

        IndicatorSubscription {
            hub: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl std::fmt::Debug for IndicatorHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorHub")
            .field("listeners", &self.listener_count())
            .field("last", &self.latest().map(|s| s.status))
            .finish()
    }
}

/// Handle that unsubscribes its listener when dropped.
#[must_use = "dropping the subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct IndicatorSubscription {
    hub: Weak<HubInner>,
    id: u64,
}

impl IndicatorSubscription {
    /// Unsubscribes explicitly.
    pub fn unsubscribe(self) {}
}

impl Drop for IndicatorSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}
