//! The sync orchestrator.
//!
//! [`SyncEngine::run_once`] evaluates the protocol from scratch on every
//! call: skip checks, pending acknowledgement, `status`, then either `pull`
//! or `push`. At most one run is in flight per engine.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{self, EngineEvent};
use crate::host::ArchiveHost;
use crate::indicator::{compute_snapshot, IndicatorHub, IndicatorSnapshot, IndicatorSubscription};
use crate::result::{RunOptions, RunResult, SyncAction};
use crate::settings::{SettingsPatch, SettingsStore, SyncSettings};
use crate::state::{PendingAck, SyncState, SyncStateStore};
use crate::sync_log::RunLog;
use crate::transport::{Endpoint, SyncTransport};
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use timeflow_sync_protocol::{
    reason, AckRequest, AckResponse, Archive, PullRequest, PushRequest, StatusRequest,
};
use timeflow_sync_storage::KeyValueStore;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Clears the in-flight flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The local dataset exported at the start of a round.
struct LocalExport {
    archive: Option<Archive>,
    hash: Option<String>,
    error: Option<SyncError>,
}

impl LocalExport {
    fn take_archive(&mut self) -> SyncResult<Archive> {
        match self.archive.take() {
            Some(archive) => Ok(archive),
            None => Err(self
                .error
                .take()
                .unwrap_or_else(|| SyncError::host("local export unavailable"))),
        }
    }
}

/// Result of flushing a pending acknowledgement.
#[derive(Debug, Default)]
struct AckOutcome {
    attempted: bool,
    accepted: bool,
    pending_remains: bool,
    reason: String,
    error: Option<String>,
    is_latest: Option<bool>,
}

/// The sync engine keeps the host's dataset consistent with a sync server.
///
/// One engine is constructed per process and shared (`Arc`) with the
/// scheduler and any UI observers.
pub struct SyncEngine<T: SyncTransport, H: ArchiveHost> {
    config: EngineConfig,
    settings: SettingsStore,
    state: SyncStateStore,
    transport: T,
    host: H,
    hub: IndicatorHub,
    events: broadcast::Sender<EngineEvent>,
    in_flight: AtomicBool,
    startup_attempted: AtomicBool,
}

impl<T: SyncTransport, H: ArchiveHost> SyncEngine<T, H> {
    /// Creates an engine persisting settings and state in `store`.
    pub fn new(config: EngineConfig, store: Arc<dyn KeyValueStore>, transport: T, host: H) -> Self {
        Self {
            config,
            settings: SettingsStore::new(store.clone()),
            state: SyncStateStore::new(store),
            transport,
            host,
            hub: IndicatorHub::new(),
            events: events::channel(),
            in_flight: AtomicBool::new(false),
            startup_attempted: AtomicBool::new(false),
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the archive host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Loads the current settings, generating a device id on first use.
    pub fn settings(&self) -> SyncSettings {
        self.settings.load()
    }

    /// Loads the sync state of the current account and device.
    pub fn sync_state(&self) -> SyncState {
        self.state.load(&self.settings.load())
    }

    /// Merges `patch` into the settings.
    ///
    /// Broadcasts [`EngineEvent::SettingsChanged`] and publishes a refreshed
    /// indicator snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be persisted.
    pub fn save_settings(&self, patch: SettingsPatch) -> SyncResult<SyncSettings> {
        let saved = self.settings.save(patch)?;
        debug!(enabled = saved.enabled, interval = saved.auto_sync_interval_minutes, "sync settings saved");
        let _ = self.events.send(EngineEvent::SettingsChanged);
        self.refresh_indicator();
        Ok(saved)
    }

    /// Reports a local data mutation; the scheduler debounces these.
    pub fn notify_local_change(&self, reason: impl Into<String>) {
        let _ = self.events.send(EngineEvent::LocalDataChanged {
            reason: reason.into(),
        });
    }

    /// Reports that the application window gained focus.
    pub fn notify_focus(&self) {
        let _ = self.events.send(EngineEvent::Focus);
    }

    /// Subscribes to engine events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Returns true while a run is in flight.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Recomputes the indicator from stored settings and state and publishes it.
    pub fn refresh_indicator(&self) -> IndicatorSnapshot {
        let settings = self.settings.load();
        let state = self.state.load(&settings);
        let snapshot = compute_snapshot(&settings, &state, None, self.is_syncing());
        self.hub.publish(snapshot.clone());
        snapshot
    }

    /// Returns the cached indicator snapshot, computing it on first use.
    pub fn indicator(&self) -> IndicatorSnapshot {
        match self.hub.latest() {
            Some(snapshot) => snapshot,
            None => self.refresh_indicator(),
        }
    }

    /// Subscribes to indicator snapshots; the current one is replayed immediately.
    pub fn subscribe_indicator<F>(&self, listener: F) -> IndicatorSubscription
    where
        F: Fn(&IndicatorSnapshot) + Send + Sync + 'static,
    {
        if self.hub.latest().is_none() {
            self.refresh_indicator();
        }
        self.hub.subscribe(listener)
    }

    /// Marks the startup run as attempted; returns true the first time only.
    pub(crate) fn claim_startup(&self) -> bool {
        !self.startup_attempted.swap(true, Ordering::AcqRel)
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// Runs one sync round.
    ///
    /// Never fails: errors are folded into a result with reason
    /// `sync_failed`. Every result except `already_running` is published to
    /// the indicator before returning.
    pub async fn run_once(&self, options: RunOptions) -> RunResult {
        let Some(_in_flight) = self.try_begin() else {
            debug!(source = %options.source, "sync already running");
            return RunResult::skipped(reason::ALREADY_RUNNING, None);
        };

        let settings = self.settings.load();
        let mut log = RunLog::new();
        log.info(
            "Sync started",
            Some(json!({
                "source": options.source.as_str(),
                "ignoreStartupToggle": options.ignore_startup_toggle,
            })),
        );

        let result = self.run_checked(&settings, options, &mut log).await;

        info!(
            source = %options.source,
            ok = result.ok,
            skipped = result.skipped,
            action = %result.action,
            reason = %result.reason,
            revision = ?result.server_revision,
            "sync run finished"
        );

        let current = self.settings.load();
        let state = self.state.load(&current);
        self.hub
            .publish(compute_snapshot(&current, &state, Some(&result), false));

        if settings.enable_logging {
            if let Some(path) = &self.config.sync_log_path {
                if let Err(e) = log.flush(path) {
                    warn!(error = %e, path = %path.display(), "failed to write sync log");
                }
            }
        }

        result
    }

    async fn run_checked(
        &self,
        settings: &SyncSettings,
        options: RunOptions,
        log: &mut RunLog,
    ) -> RunResult {
        if !settings.enabled {
            log.info("Sync skipped: disabled", None);
            return RunResult::skipped(reason::DISABLED, None);
        }

        if !options.ignore_startup_toggle && !settings.auto_sync_on_startup {
            log.info("Sync skipped: startup sync disabled", None);
            return RunResult::skipped(reason::STARTUP_DISABLED, None);
        }

        if !settings.is_configured() {
            log.warn(
                "Sync skipped: missing config",
                Some(json!({
                    "hasServerUrl": !settings.server_url.is_empty(),
                    "hasUserId": !settings.user_id.is_empty(),
                })),
            );
            return RunResult::skipped(reason::MISSING_CONFIG, None);
        }

        let state = self.state.load(settings);

        if self.host.is_demo_mode().await {
            log.info("Sync skipped: demo mode", None);
            return RunResult::skipped(reason::DEMO_MODE, Some(state.server_revision));
        }

        self.hub
            .publish(compute_snapshot(settings, &state, None, true));
        log.info(
            "Connecting to server",
            Some(json!({"serverUrl": settings.server_url, "deviceId": settings.device_id})),
        );

        match self.sync_round(settings, log).await {
            Ok(result) => {
                log.info(
                    "Sync finished",
                    Some(json!({"action": result.action.as_str(), "reason": result.reason})),
                );
                result
            }
            Err(e) => {
                let state = self.state.load(settings);
                warn!(error = %e, kind = e.kind(), "sync run failed");
                log.error(
                    "Sync failed",
                    Some(json!({
                        "error": e.to_string(),
                        "kind": e.kind(),
                        "httpStatus": e.http_status(),
                        "needsReseed": state.needs_reseed,
                    })),
                );
                RunResult {
                    server_revision: Some(state.server_revision),
                    needs_reseed: state.needs_reseed,
                    ..RunResult::failed(e.to_string())
                }
            }
        }
    }

    async fn sync_round(&self, settings: &SyncSettings, log: &mut RunLog) -> SyncResult<RunResult> {
        let endpoint = Endpoint::from_settings(settings);
        let mut state = self.state.load(settings);

        let ack = self.flush_pending_ack(settings, &mut state, log).await;
        if ack.attempted {
            log.info(
                "Pending ACK result",
                Some(json!({
                    "accepted": ack.accepted,
                    "pendingRemains": ack.pending_remains,
                    "reason": ack.reason,
                })),
            );
        }

        let mut local = self.export_local().await;
        log.info(
            "Local dataset exported",
            Some(json!({
                "exportOk": local.archive.is_some(),
                "hash": local.hash.as_deref().map(|h| &h[..h.len().min(12)]),
                "exportError": local.error.as_ref().map(ToString::to_string),
            })),
        );

        let client_hash = local.hash.clone().or_else(|| state.server_hash.clone());
        let status = self
            .transport
            .status(
                &endpoint,
                &StatusRequest::new(
                    &settings.user_id,
                    &settings.device_id,
                    state.server_revision,
                    client_hash,
                ),
            )
            .await?;
        log.info(
            "Server status response",
            Some(json!({
                "reason": status.reason,
                "shouldPull": status.should_pull,
                "shouldPush": status.should_push,
                "serverRevision": status.server_revision,
            })),
        );

        let known_revision = status.server_revision.unwrap_or(state.server_revision);

        if status.reason == reason::SERVER_SNAPSHOT_PRUNED {
            log.warn("Server snapshot pruned, reseeding", None);
            return self
                .reseed(settings, &endpoint, &mut state, &mut local, known_revision)
                .await;
        }

        if status.should_pull {
            let pull = self
                .transport
                .pull(
                    &endpoint,
                    &PullRequest::new(&settings.user_id, &settings.device_id, state.server_revision),
                )
                .await?;
            log.info(
                "Pull response",
                Some(json!({"reason": pull.reason, "hasUpdate": pull.has_update, "revision": pull.revision})),
            );

            if pull.reason == reason::SERVER_SNAPSHOT_PRUNED {
                log.warn("Pull reported pruned snapshot, reseeding", None);
                return self
                    .reseed(settings, &endpoint, &mut state, &mut local, known_revision)
                    .await;
            }

            if pull.has_update {
                let (Some(archive), Some(revision), Some(hash)) = (
                    pull.archive,
                    pull.revision,
                    pull.payload_sha256.filter(|h| !h.is_empty()),
                ) else {
                    return Err(SyncError::Protocol("pull response incomplete".into()));
                };

                log.info("Importing pulled archive", Some(json!({"revision": revision})));
                let summary = self.host.import_archive(&archive).await?;

                let now = Utc::now();
                state.record_server(revision, Some(hash.clone()));
                state.mark_synced(now);
                state.needs_reseed = false;
                state.pending_ack = Some(PendingAck::new(revision, hash, now));
                self.state.save(settings, &state)?;

                let ack = self.flush_pending_ack(settings, &mut state, log).await;

                let mut result = RunResult::completed(SyncAction::Pull, "", Some(revision));
                result.import_summary = Some(summary);
                result.ack_is_latest = ack.is_latest;
                if ack.accepted {
                    result.reason = reason::PULL_APPLIED_ACK_ACCEPTED.into();
                    result.ack_accepted = Some(true);
                    result.ack_pending = Some(false);
                    result.ack_reason = Some(ack.reason);
                } else {
                    let pending = ack.pending_remains || state.pending_ack.is_some();
                    result.reason = if pending {
                        reason::PULL_APPLIED_ACK_PENDING
                    } else {
                        reason::PULL_APPLIED_ACK_NOT_ACCEPTED
                    }
                    .into();
                    result.ack_accepted = Some(false);
                    result.ack_pending = Some(pending);
                    result.ack_reason = Some(ack.error.unwrap_or(ack.reason));
                }
                return Ok(result);
            }

            // Missing fields keep what we already know.
            let revision = pull.revision.unwrap_or(known_revision);
            let hash = pull
                .payload_sha256
                .or(status.server_hash)
                .or_else(|| state.server_hash.clone());
            state.record_server(revision, hash);
            state.mark_synced(Utc::now());
            self.state.save(settings, &state)?;
            return Ok(RunResult::completed(SyncAction::None, pull.reason, Some(revision)));
        }

        // The server's shouldPush is advisory; it deduplicates by hash.
        let archive = local.take_archive()?;
        log.info(
            "Pushing to server",
            Some(json!({"knownServerRevision": known_revision})),
        );
        let push = self
            .transport
            .push(
                &endpoint,
                &PushRequest::new(
                    &settings.user_id,
                    &settings.device_id,
                    known_revision,
                    archive,
                ),
            )
            .await?;

        if push.accepted == Some(false) {
            return Err(SyncError::Rejected(format!("push rejected: {}", push.reason)));
        }
        log.info(
            "Push accepted",
            Some(json!({"revision": push.revision, "noOp": push.no_op})),
        );

        state.record_server(push.revision, Some(push.payload_sha256));
        state.needs_reseed = false;
        state.mark_synced(Utc::now());
        self.state.save(settings, &state)?;

        let action = if push.no_op { SyncAction::Noop } else { SyncAction::Push };
        Ok(RunResult::completed(action, push.reason, Some(push.revision)))
    }

    async fn reseed(
        &self,
        settings: &SyncSettings,
        endpoint: &Endpoint,
        state: &mut SyncState,
        local: &mut LocalExport,
        server_revision: u64,
    ) -> SyncResult<RunResult> {
        let reseedable = local
            .archive
            .as_ref()
            .is_some_and(Archive::has_reseed_data);

        if !reseedable {
            state.needs_reseed = true;
            self.state.save(settings, state)?;
            let error = local.error.as_ref().map(ToString::to_string).unwrap_or_else(|| {
                "Server snapshot payload was pruned and no local data is available for reseed"
                    .to_string()
            });
            warn!(%error, "server snapshot pruned and nothing to reseed");
            return Ok(RunResult {
                ok: false,
                server_revision: Some(server_revision),
                error: Some(error),
                needs_reseed: true,
                ..RunResult::completed(SyncAction::None, reason::SERVER_SNAPSHOT_PRUNED, None)
            });
        }

        let archive = local.take_archive()?;
        let push = self
            .transport
            .push(
                endpoint,
                &PushRequest::new(&settings.user_id, &settings.device_id, server_revision, archive),
            )
            .await?;

        if push.accepted == Some(false) {
            return Err(SyncError::Rejected(
                "reseed push rejected after server_snapshot_pruned".into(),
            ));
        }

        state.record_server(push.revision, Some(push.payload_sha256));
        state.needs_reseed = false;
        state.mark_synced(Utc::now());
        self.state.save(settings, state)?;

        let action = if push.no_op { SyncAction::Noop } else { SyncAction::Push };
        Ok(RunResult::completed(
            action,
            reason::SERVER_SNAPSHOT_PRUNED_RESEEDED,
            Some(push.revision),
        ))
    }

    async fn export_local(&self) -> LocalExport {
        let exported = match self.host.export_archive().await {
            Ok(archive) => archive.payload_sha256().map(|hash| (archive, hash)).map_err(SyncError::from),
            Err(e) => Err(e),
        };

        match exported {
            Ok((archive, hash)) => LocalExport {
                archive: Some(archive),
                hash: Some(hash),
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "local export failed");
                LocalExport {
                    archive: None,
                    hash: None,
                    error: Some(e),
                }
            }
        }
    }

    /// Acknowledges `state.pending_ack`, if any, and persists the outcome.
    ///
    /// Never fails; a failed flush keeps the acknowledgement pending.
    async fn flush_pending_ack(
        &self,
        settings: &SyncSettings,
        state: &mut SyncState,
        log: &mut RunLog,
    ) -> AckOutcome {
        let Some(mut pending) = state.pending_ack.clone() else {
            return AckOutcome {
                reason: reason::NO_PENDING_ACK.into(),
                ..AckOutcome::default()
            };
        };

        let request = AckRequest {
            user_id: settings.user_id.clone(),
            device_id: settings.device_id.clone(),
            revision: pending.revision,
            payload_sha256: pending.payload_sha256.clone(),
        };

        let response = self.ack_with_retries(settings, &request).await.and_then(|response| {
            let settled = response.accepted
                || response.reason == reason::UNKNOWN_REVISION
                || response.reason == reason::HASH_MISMATCH_FOR_REVISION;
            if settled {
                Ok(response)
            } else {
                Err(SyncError::Rejected(format!("ack rejected: {}", response.reason)))
            }
        });

        let outcome = match response {
            Ok(response) => {
                log.info(
                    "ACK response",
                    Some(json!({
                        "accepted": response.accepted,
                        "reason": response.reason,
                        "isLatest": response.is_latest,
                        "serverRevision": response.server_revision,
                    })),
                );
                state.pending_ack = None;
                AckOutcome {
                    attempted: true,
                    accepted: response.accepted,
                    pending_remains: false,
                    reason: response.reason,
                    error: None,
                    is_latest: Some(response.is_latest),
                }
            }
            Err(e) => {
                pending.retries = pending.retries.saturating_add(1);
                pending.last_error = Some(e.to_string());
                log.warn(
                    "ACK deferred",
                    Some(json!({"retries": pending.retries, "error": e.to_string()})),
                );
                state.pending_ack = Some(pending);
                AckOutcome {
                    attempted: true,
                    accepted: false,
                    pending_remains: true,
                    reason: reason::ACK_DEFERRED.into(),
                    error: Some(e.to_string()),
                    is_latest: None,
                }
            }
        };

        if let Err(e) = self.state.save(settings, state) {
            warn!(error = %e, "failed to persist acknowledgement state");
        }
        outcome
    }

    async fn ack_with_retries(
        &self,
        settings: &SyncSettings,
        request: &AckRequest,
    ) -> SyncResult<AckResponse> {
        let endpoint = Endpoint::from_settings(settings)
            .with_timeout(EngineConfig::ack_timeout(settings.request_timeout()));
        let retry = &self.config.ack_retry;
        let max_attempts = retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.transport.ack(&endpoint, request).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    warn!(attempt, max_attempts, error = %e, "ACK transient failure, retrying");
                    tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: SyncTransport, H: ArchiveHost> std::fmt::Debug for SyncEngine<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("syncing", &self.is_syncing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::host::MemoryArchiveHost;
    use crate::indicator::IndicatorStatus;
    use crate::transport::{MockTransport, TransportCall};
    use serde_json::json;
    use std::time::Duration;
    use timeflow_sync_protocol::{PullResponse, PushResponse, StatusResponse};
    use timeflow_sync_storage::InMemoryStore;

    type TestEngine = SyncEngine<MockTransport, MemoryArchiveHost>;

    fn dataset() -> Archive {
        Archive::new(json!({"version": "1", "data": {"sessions": [{"id": 1}], "projects": []}}))
    }

    fn engine() -> TestEngine {
        SyncEngine::new(
            EngineConfig::new().with_ack_retry(RetryConfig::new(3)),
            Arc::new(InMemoryStore::new()),
            MockTransport::new(),
            MemoryArchiveHost::new(dataset()),
        )
    }

    fn configured() -> TestEngine {
        let engine = engine();
        engine
            .save_settings(SettingsPatch {
                enabled: Some(true),
                server_url: Some("https://s".into()),
                user_id: Some("u1".into()),
                ..Default::default()
            })
            .unwrap();
        engine
    }

    fn status(revision: u64, should_pull: bool, reason: &str) -> StatusResponse {
        StatusResponse {
            server_revision: Some(revision),
            server_hash: Some(format!("h{revision}")),
            should_push: !should_pull,
            should_pull,
            reason: reason.into(),
        }
    }

    fn push(revision: u64, hash: &str, no_op: bool) -> PushResponse {
        PushResponse {
            accepted: Some(true),
            no_op,
            revision,
            payload_sha256: hash.into(),
            received_at: None,
            reason: if no_op { reason::SAME_HASH } else { reason::ACCEPTED }.into(),
        }
    }

    fn ack(accepted: bool, revision: u64, reason: &str) -> AckResponse {
        AckResponse {
            accepted,
            revision,
            payload_sha256: format!("h{revision}"),
            server_revision: revision,
            server_hash: Some(format!("h{revision}")),
            is_latest: true,
            reason: reason.into(),
        }
    }

    fn seed_state(engine: &TestEngine, revision: u64, hash: &str) {
        let settings = engine.settings();
        let mut state = SyncState::default();
        state.record_server(revision, Some(hash.into()));
        engine.state.save(&settings, &state).unwrap();
    }

    #[tokio::test]
    async fn disabled_short_circuits_without_io() {
        let engine = engine();
        let result = engine.run_once(RunOptions::manual()).await;

        assert!(result.ok);
        assert!(result.skipped);
        assert_eq!(result.reason, reason::DISABLED);
        assert_eq!(engine.transport().call_count(), 0);
        assert_eq!(engine.indicator().status, IndicatorStatus::Disabled);
    }

    #[tokio::test]
    async fn missing_config_skips() {
        let engine = engine();
        engine
            .save_settings(SettingsPatch {
                enabled: Some(true),
                server_url: Some("https://s".into()),
                ..Default::default()
            })
            .unwrap();

        let result = engine.run_once(RunOptions::manual()).await;
        assert_eq!(result.reason, reason::MISSING_CONFIG);
        assert_eq!(engine.transport().call_count(), 0);
        assert_eq!(engine.indicator().status, IndicatorStatus::Unconfigured);
    }

    #[tokio::test]
    async fn startup_toggle_gates_only_startup_runs() {
        let engine = configured();
        engine
            .save_settings(SettingsPatch {
                auto_sync_on_startup: Some(false),
                ..Default::default()
            })
            .unwrap();
        engine.transport().set_status_response(status(0, false, reason::SERVER_EMPTY));
        engine.transport().set_push_response(push(1, "h1", false));

        let startup = engine.run_once(RunOptions::startup()).await;
        assert!(startup.skipped);
        assert_eq!(startup.reason, reason::STARTUP_DISABLED);
        assert_eq!(engine.transport().call_count(), 0);

        let manual = engine.run_once(RunOptions::manual()).await;
        assert!(!manual.skipped);
        assert_eq!(manual.action, SyncAction::Push);
    }

    #[tokio::test]
    async fn demo_mode_skips() {
        let engine = configured();
        engine.host().set_demo_mode(true);

        let result = engine.run_once(RunOptions::manual()).await;
        assert_eq!(result.reason, reason::DEMO_MODE);
        assert_eq!(engine.transport().call_count(), 0);

        let snapshot = engine.indicator();
        assert_eq!(snapshot.status, IndicatorStatus::Disabled);
        assert_eq!(snapshot.label, "Sync Off (Demo)");
    }

    #[tokio::test]
    async fn push_records_new_revision() {
        let engine = configured();
        engine.transport().set_status_response(status(0, false, reason::SERVER_EMPTY));
        engine.transport().set_push_response(push(1, "h1", false));

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(result.ok);
        assert_eq!(result.action, SyncAction::Push);
        assert_eq!(result.server_revision, Some(1));

        let state = engine.sync_state();
        assert_eq!(state.server_revision, 1);
        assert_eq!(state.server_hash.as_deref(), Some("h1"));
        assert!(state.last_sync_at.is_some());
        assert_eq!(engine.transport().call_names(), vec!["status", "push"]);

        let snapshot = engine.indicator();
        assert_eq!(snapshot.status, IndicatorStatus::Success);
        assert_eq!(snapshot.label, "Sync Pushed");
    }

    #[tokio::test]
    async fn status_carries_local_hash_and_revision() {
        let engine = configured();
        seed_state(&engine, 4, "h4");
        engine.transport().set_status_response(status(4, false, reason::SAME_HASH));
        engine.transport().set_push_response(push(4, "h4", true));

        engine.run_once(RunOptions::manual()).await;

        let calls = engine.transport().calls();
        let TransportCall::Status(request) = &calls[0] else {
            panic!("expected status call first");
        };
        assert_eq!(request.client_revision, 4);
        assert_eq!(
            request.client_hash.as_deref(),
            Some(dataset().payload_sha256().unwrap().as_str())
        );
        assert_eq!(request.user_id, "u1");
        assert_eq!(request.device_id, engine.settings().device_id);
    }

    #[tokio::test]
    async fn push_dedup_is_noop() {
        let engine = configured();
        seed_state(&engine, 3, "h3");
        engine.transport().set_status_response(status(3, false, reason::SAME_HASH));
        engine.transport().set_push_response(push(3, "h3", true));

        let result = engine.run_once(RunOptions::manual()).await;
        assert_eq!(result.action, SyncAction::Noop);

        let state = engine.sync_state();
        assert_eq!(state.server_revision, 3);
        assert_eq!(state.server_hash.as_deref(), Some("h3"));
        assert_eq!(engine.indicator().label, "Sync No-op");
    }

    #[tokio::test]
    async fn pull_imports_and_acknowledges() {
        let engine = configured();
        seed_state(&engine, 1, "h1");
        let remote = Archive::new(json!({"data": {"projects": [{"id": 9}]}}));
        engine.transport().set_status_response(status(7, true, reason::SERVER_NEWER));
        engine
            .transport()
            .set_pull_response(PullResponse::update(7, "h7", remote.clone()));
        engine.transport().set_ack_response(ack(true, 7, reason::ACK_RECORDED));

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(result.ok);
        assert_eq!(result.action, SyncAction::Pull);
        assert_eq!(result.reason, reason::PULL_APPLIED_ACK_ACCEPTED);
        assert_eq!(result.ack_accepted, Some(true));
        assert_eq!(result.import_summary.unwrap().projects_created, 1);

        assert_eq!(engine.host().imports(), vec![remote]);
        let state = engine.sync_state();
        assert_eq!(state.server_revision, 7);
        assert_eq!(state.server_hash.as_deref(), Some("h7"));
        assert!(state.pending_ack.is_none());
        assert_eq!(engine.transport().call_names(), vec!["status", "pull", "ack"]);
        assert_eq!(engine.indicator().label, "Sync Pulled");
    }

    #[tokio::test]
    async fn pull_without_update_records_revision() {
        let engine = configured();
        engine.transport().set_status_response(status(5, true, reason::SERVER_NEWER));
        engine.transport().set_pull_response(PullResponse::no_update(
            Some(5),
            Some("h5".into()),
            reason::CLIENT_UP_TO_DATE,
        ));

        let result = engine.run_once(RunOptions::manual()).await;
        assert_eq!(result.action, SyncAction::None);
        assert_eq!(result.reason, reason::CLIENT_UP_TO_DATE);
        assert_eq!(engine.sync_state().server_revision, 5);
        assert!(engine.host().imports().is_empty());
    }

    #[tokio::test]
    async fn sparse_pull_reply_keeps_known_revision() {
        let engine = configured();
        seed_state(&engine, 5, "h5");
        engine.transport().set_status_response(
            serde_json::from_value(json!({"shouldPull": true, "reason": "server_newer"})).unwrap(),
        );
        engine.transport().set_pull_response(PullResponse::no_update(
            None,
            None,
            reason::CLIENT_UP_TO_DATE,
        ));

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(result.ok);
        assert_eq!(result.action, SyncAction::None);
        assert_eq!(result.server_revision, Some(5));

        let state = engine.sync_state();
        assert_eq!(state.server_revision, 5);
        assert_eq!(state.server_hash.as_deref(), Some("h5"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ack_stays_pending_and_is_flushed_next_run() {
        let engine = configured();
        engine.transport().set_status_response(status(2, true, reason::SERVER_NEWER));
        engine
            .transport()
            .set_pull_response(PullResponse::update(2, "h2", dataset()));
        for _ in 0..3 {
            engine.transport().queue_ack(Err(SyncError::Timeout));
        }

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(result.ok);
        assert_eq!(result.reason, reason::PULL_APPLIED_ACK_PENDING);
        assert_eq!(result.ack_pending, Some(true));
        assert_eq!(result.ack_reason.as_deref(), Some("request timeout"));
        assert_eq!(
            engine.transport().call_names(),
            vec!["status", "pull", "ack", "ack", "ack"]
        );

        let pending = engine.sync_state().pending_ack.unwrap();
        assert_eq!(pending.revision, 2);
        assert_eq!(pending.retries, 1);
        assert_eq!(pending.last_error.as_deref(), Some("request timeout"));
        assert_eq!(engine.indicator().status, IndicatorStatus::Warning);

        // Next run flushes the acknowledgement before anything else.
        engine.transport().clear_calls();
        engine.transport().set_ack_response(ack(true, 2, reason::ACK_RECORDED));
        engine.transport().set_status_response(status(2, false, reason::SAME_HASH));
        engine.transport().set_push_response(push(2, "h2", true));

        let next = engine.run_once(RunOptions::manual()).await;
        assert_eq!(next.action, SyncAction::Noop);
        assert_eq!(engine.transport().call_names(), vec!["ack", "status", "push"]);
        assert!(engine.sync_state().pending_ack.is_none());
    }

    #[tokio::test]
    async fn non_retryable_ack_error_is_not_retried() {
        let engine = configured();
        engine.transport().set_status_response(status(2, true, reason::SERVER_NEWER));
        engine
            .transport()
            .set_pull_response(PullResponse::update(2, "h2", dataset()));
        engine
            .transport()
            .queue_ack(Err(SyncError::http(401, Some("invalid token".into()))));

        let result = engine.run_once(RunOptions::manual()).await;
        assert_eq!(result.reason, reason::PULL_APPLIED_ACK_PENDING);
        assert_eq!(engine.transport().call_names(), vec!["status", "pull", "ack"]);
    }

    #[tokio::test]
    async fn unknown_revision_ack_clears_pending() {
        let engine = configured();
        engine.transport().set_status_response(status(2, true, reason::SERVER_NEWER));
        engine
            .transport()
            .set_pull_response(PullResponse::update(2, "h2", dataset()));
        engine
            .transport()
            .set_ack_response(ack(false, 2, reason::UNKNOWN_REVISION));

        let result = engine.run_once(RunOptions::manual()).await;
        assert_eq!(result.reason, reason::PULL_APPLIED_ACK_NOT_ACCEPTED);
        assert_eq!(result.ack_pending, Some(false));
        assert!(engine.sync_state().pending_ack.is_none());
    }

    #[tokio::test]
    async fn incomplete_pull_fails() {
        let engine = configured();
        engine.transport().set_status_response(status(2, true, reason::SERVER_NEWER));
        let mut pull = PullResponse::update(2, "h2", dataset());
        pull.archive = None;
        engine.transport().set_pull_response(pull);

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(!result.ok);
        assert_eq!(result.reason, reason::SYNC_FAILED);
        assert_eq!(result.error.as_deref(), Some("pull response incomplete"));
        assert!(engine.host().imports().is_empty());
    }

    #[tokio::test]
    async fn transport_error_is_folded_into_result() {
        let engine = configured();
        engine
            .transport()
            .queue_status(Err(SyncError::http(500, None)));

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(!result.ok);
        assert!(!result.skipped);
        assert_eq!(result.action, SyncAction::None);
        assert_eq!(result.reason, reason::SYNC_FAILED);
        assert_eq!(result.error.as_deref(), Some("HTTP 500"));
        assert!(!engine.is_syncing());

        let snapshot = engine.indicator();
        assert_eq!(snapshot.status, IndicatorStatus::Error);
        assert_eq!(snapshot.label, "Sync Error");
    }

    #[tokio::test]
    async fn rejected_push_fails() {
        let engine = configured();
        engine.transport().set_status_response(status(1, false, reason::CLIENT_CHANGED));
        let mut rejected = push(1, "h1", false);
        rejected.accepted = Some(false);
        rejected.reason = "stale".into();
        engine.transport().set_push_response(rejected);

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("push rejected: stale"));
    }

    #[tokio::test]
    async fn export_failure_fails_push_path_only() {
        let engine = configured();
        engine.host().set_export_failure(Some("database locked".into()));
        engine.transport().set_status_response(status(0, false, reason::SERVER_EMPTY));

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("host error: database locked"));
        assert_eq!(engine.transport().call_names(), vec!["status"]);
    }

    #[tokio::test]
    async fn pruned_snapshot_is_reseeded() {
        let engine = configured();
        engine
            .transport()
            .set_status_response(status(4, false, reason::SERVER_SNAPSHOT_PRUNED));
        engine.transport().set_push_response(push(5, "h5", false));

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(result.ok);
        assert_eq!(result.action, SyncAction::Push);
        assert_eq!(result.reason, reason::SERVER_SNAPSHOT_PRUNED_RESEEDED);

        let state = engine.sync_state();
        assert_eq!(state.server_revision, 5);
        assert!(!state.needs_reseed);
    }

    #[tokio::test]
    async fn pruned_snapshot_without_data_needs_reseed() {
        let engine = configured();
        engine.host().set_archive(Archive::new(json!({"data": {"sessions": []}})));
        engine
            .transport()
            .set_status_response(status(4, false, reason::SERVER_SNAPSHOT_PRUNED));

        let result = engine.run_once(RunOptions::manual()).await;
        assert!(!result.ok);
        assert!(result.needs_reseed);
        assert_eq!(result.reason, reason::SERVER_SNAPSHOT_PRUNED);
        assert!(engine.sync_state().needs_reseed);
        assert_eq!(engine.transport().call_names(), vec!["status"]);
        assert_eq!(engine.indicator().label, "Reseed Required");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_runs_are_single_flight() {
        let engine = configured();
        engine.transport().set_latency(Duration::from_millis(500));
        engine.transport().set_status_response(status(0, false, reason::SERVER_EMPTY));
        engine.transport().set_push_response(push(1, "h1", false));

        let (first, second) = tokio::join!(
            engine.run_once(RunOptions::manual()),
            engine.run_once(RunOptions::manual())
        );

        assert_eq!(first.action, SyncAction::Push);
        assert!(second.skipped);
        assert_eq!(second.reason, reason::ALREADY_RUNNING);
        assert_eq!(engine.transport().call_names(), vec!["status", "push"]);
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn save_settings_broadcasts_change() {
        let engine = engine();
        let mut events = engine.subscribe_events();

        engine
            .save_settings(SettingsPatch {
                enabled: Some(true),
                ..Default::default()
            })
            .unwrap();
        engine.notify_local_change("session_saved");
        engine.notify_focus();

        assert_eq!(events.recv().await.unwrap(), EngineEvent::SettingsChanged);
        assert_eq!(
            events.recv().await.unwrap(),
            EngineEvent::LocalDataChanged {
                reason: "session_saved".into()
            }
        );
        assert_eq!(events.recv().await.unwrap(), EngineEvent::Focus);
        assert_eq!(engine.indicator().status, IndicatorStatus::Unconfigured);
    }

    #[tokio::test]
    async fn sync_log_written_when_enabled() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("sync.log");
        let engine = SyncEngine::new(
            EngineConfig::new().with_sync_log(&log_path),
            Arc::new(InMemoryStore::new()),
            MockTransport::new(),
            MemoryArchiveHost::new(dataset()),
        );

        engine.run_once(RunOptions::manual()).await;
        assert!(!log_path.exists());

        engine
            .save_settings(SettingsPatch {
                enable_logging: Some(true),
                ..Default::default()
            })
            .unwrap();
        engine.run_once(RunOptions::manual()).await;

        let log = crate::sync_log::tail(&log_path, None).unwrap();
        assert!(log.contains("[INFO] Sync started"));
        assert!(log.contains("Sync skipped: disabled"));
    }
}
