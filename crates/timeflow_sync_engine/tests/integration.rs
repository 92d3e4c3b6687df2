//! End-to-end runs of the engine against the reference server.
//!
//! Requests travel through the real HTTP transport (JSON encoding, status
//! mapping, bearer header) over an in-process loopback.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use timeflow_sync_engine::{
    EngineConfig, HttpTransport, IndicatorStatus, LoopbackClient, LoopbackServer,
    MemoryArchiveHost, RunOptions, SettingsPatch, SyncAction, SyncEngine, SyncState,
    SyncStateStore,
};
use timeflow_sync_protocol::{reason, Archive, PushRequest};
use timeflow_sync_server::{ServerConfig, SyncServer};
use timeflow_sync_storage::{InMemoryStore, KeyValueStore};

/// Routes loopback requests into a shared server and counts them.
struct InProcess {
    server: Arc<SyncServer>,
    requests: Arc<AtomicUsize>,
}

#[async_trait]
impl LoopbackServer for InProcess {
    async fn handle_post(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> (u16, Vec<u8>) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.server.handle_http(path, bearer, body)
    }
}

type Engine = SyncEngine<HttpTransport<LoopbackClient<InProcess>>, MemoryArchiveHost>;

struct Device {
    engine: Engine,
    store: Arc<dyn KeyValueStore>,
    requests: Arc<AtomicUsize>,
}

impl Device {
    fn new(server: &Arc<SyncServer>, device_id: &str, dataset: Archive) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let requests = Arc::new(AtomicUsize::new(0));
        let client = LoopbackClient::new(InProcess {
            server: Arc::clone(server),
            requests: Arc::clone(&requests),
        });
        let engine = SyncEngine::new(
            EngineConfig::new(),
            Arc::clone(&store),
            HttpTransport::new(client),
            MemoryArchiveHost::new(dataset),
        );
        engine
            .save_settings(SettingsPatch {
                enabled: Some(true),
                server_url: Some("https://s".into()),
                user_id: Some("u1".into()),
                device_id: Some(device_id.into()),
                ..Default::default()
            })
            .unwrap();

        Self {
            engine,
            store,
            requests,
        }
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn seed_state(&self, revision: u64, hash: Option<String>) {
        let settings = self.engine.settings();
        let mut state = SyncState::default();
        state.record_server(revision, hash);
        SyncStateStore::new(Arc::clone(&self.store))
            .save(&settings, &state)
            .unwrap();
    }
}

fn dataset(label: &str) -> Archive {
    Archive::new(json!({
        "version": "1",
        "data": {
            "projects": [{"name": label}],
            "sessions": [{"project": label, "seconds": 60}],
        }
    }))
}

fn server() -> Arc<SyncServer> {
    Arc::new(SyncServer::new(ServerConfig::default()))
}

/// Stores `count` distinct revisions pushed by another device.
fn seed_server(server: &SyncServer, count: u64) -> Vec<Archive> {
    (1..=count)
        .map(|n| {
            let archive = dataset(&format!("remote-{n}"));
            server
                .handle_push(None, PushRequest::new("u1", "remote", n - 1, archive.clone()))
                .unwrap();
            archive
        })
        .collect()
}

#[tokio::test]
async fn first_run_pushes_then_converges_to_noop() {
    let server = server();
    let device = Device::new(&server, "d1", dataset("local"));

    let first = device.engine.run_once(RunOptions::manual()).await;
    assert!(first.ok, "{first:?}");
    assert_eq!(first.action, SyncAction::Push);
    assert_eq!(first.server_revision, Some(1));

    let hash = device.engine.sync_state().server_hash.clone();
    assert!(hash.is_some());

    for _ in 0..3 {
        let again = device.engine.run_once(RunOptions::manual()).await;
        assert!(again.ok);
        assert!(matches!(again.action, SyncAction::Noop | SyncAction::None));
        assert_eq!(again.server_revision, Some(1));
        assert_eq!(device.engine.sync_state().server_revision, 1);
        assert_eq!(device.engine.sync_state().server_hash, hash);
    }

    assert_eq!(server.store().revision_count("u1"), 1);
}

#[tokio::test]
async fn pull_applies_revision_seven_once() {
    let server = server();
    let remote = seed_server(&server, 7);
    let device = Device::new(&server, "d1", dataset("stale"));

    let result = device.engine.run_once(RunOptions::manual()).await;
    assert!(result.ok, "{result:?}");
    assert_eq!(result.action, SyncAction::Pull);
    assert_eq!(result.reason, reason::PULL_APPLIED_ACK_ACCEPTED);
    assert_eq!(result.ack_accepted, Some(true));
    assert_eq!(result.ack_is_latest, Some(true));
    assert_eq!(result.import_summary.as_ref().unwrap().projects_created, 1);

    let state = device.engine.sync_state();
    assert_eq!(state.server_revision, 7);
    assert!(state.pending_ack.is_none());
    assert!(state.last_sync_at.is_some());

    assert_eq!(device.engine.host().imports(), vec![remote[6].clone()]);
    let device_id = device.engine.settings().device_id;
    assert_eq!(server.store().acked_revision("u1", &device_id), Some(7));

    // The imported dataset now matches the server.
    let again = device.engine.run_once(RunOptions::manual()).await;
    assert!(again.ok);
    assert_eq!(again.action, SyncAction::Noop);
    assert_eq!(device.engine.host().imports().len(), 1);
    assert_eq!(server.store().revision_count("u1"), 7);
}

#[tokio::test]
async fn unchanged_dataset_push_is_deduplicated() {
    let server = server();
    let device = Device::new(&server, "d1", dataset("local"));
    device.engine.run_once(RunOptions::manual()).await;
    let before = device.engine.sync_state();

    let result = device.engine.run_once(RunOptions::manual()).await;
    assert_eq!(result.action, SyncAction::Noop);
    assert_eq!(result.reason, reason::SAME_HASH);
    assert_eq!(device.engine.sync_state().server_hash, before.server_hash);
}

#[tokio::test]
async fn local_edit_becomes_next_revision() {
    let server = server();
    let device = Device::new(&server, "d1", dataset("v1"));
    device.engine.run_once(RunOptions::manual()).await;

    device.engine.host().set_archive(dataset("v2"));
    let result = device.engine.run_once(RunOptions::manual()).await;

    assert_eq!(result.action, SyncAction::Push);
    assert_eq!(result.reason, reason::ACCEPTED);
    assert_eq!(result.server_revision, Some(2));
    assert_eq!(server.store().revision_count("u1"), 2);
}

#[tokio::test]
async fn two_devices_converge() {
    let server = server();
    let laptop = Device::new(&server, "laptop", dataset("laptop"));
    let desktop = Device::new(&server, "desktop", dataset("desktop"));

    let pushed = laptop.engine.run_once(RunOptions::manual()).await;
    assert_eq!(pushed.action, SyncAction::Push);

    let pulled = desktop.engine.run_once(RunOptions::manual()).await;
    assert_eq!(pulled.action, SyncAction::Pull);
    assert_eq!(desktop.engine.host().archive(), dataset("laptop"));

    desktop.engine.host().set_archive(dataset("edited on desktop"));
    let pushed = desktop.engine.run_once(RunOptions::manual()).await;
    assert_eq!(pushed.action, SyncAction::Push);
    assert_eq!(pushed.server_revision, Some(2));

    let pulled = laptop.engine.run_once(RunOptions::manual()).await;
    assert_eq!(pulled.action, SyncAction::Pull);
    assert_eq!(pulled.server_revision, Some(2));
    assert_eq!(laptop.engine.host().archive(), dataset("edited on desktop"));
}

#[tokio::test]
async fn disabled_makes_no_requests() {
    let server = server();
    let device = Device::new(&server, "d1", dataset("local"));
    device
        .engine
        .save_settings(SettingsPatch {
            enabled: Some(false),
            ..Default::default()
        })
        .unwrap();

    let result = device.engine.run_once(RunOptions::manual()).await;
    assert!(result.skipped);
    assert_eq!(result.reason, reason::DISABLED);
    assert_eq!(device.requests(), 0);
    assert_eq!(server.store().revision_count("u1"), 0);
}

#[tokio::test]
async fn startup_pull_scenario() {
    let server = server();
    let remote = seed_server(&server, 2);
    let first_hash = remote[0].payload_sha256().unwrap();
    let device = Device::new(&server, "d1", remote[0].clone());
    device.seed_state(1, Some(first_hash));

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    let _subscription = device
        .engine
        .subscribe_indicator(move |snapshot| sink.lock().push(snapshot.status));

    let result = device.engine.run_once(RunOptions::startup()).await;

    assert!(result.ok, "{result:?}");
    assert_eq!(result.action, SyncAction::Pull);
    assert_eq!(device.engine.sync_state().server_revision, 2);
    assert_eq!(
        *statuses.lock(),
        vec![
            IndicatorStatus::Idle,
            IndicatorStatus::Syncing,
            IndicatorStatus::Success
        ]
    );
}

#[tokio::test]
async fn bearer_token_is_checked() {
    let server = Arc::new(SyncServer::new(
        ServerConfig::default().with_auth(b"server-secret".to_vec()),
    ));
    let token = server.signer().unwrap().token_for("u1").unwrap();
    let device = Device::new(&server, "d1", dataset("local"));

    let denied = device.engine.run_once(RunOptions::manual()).await;
    assert!(!denied.ok);
    assert_eq!(denied.reason, reason::SYNC_FAILED);
    assert_eq!(
        denied.error.as_deref(),
        Some("unauthorized: missing bearer token")
    );
    assert_eq!(device.engine.indicator().status, IndicatorStatus::Error);

    device
        .engine
        .save_settings(SettingsPatch {
            api_token: Some(format!("Bearer {token}")),
            ..Default::default()
        })
        .unwrap();

    let allowed = device.engine.run_once(RunOptions::manual()).await;
    assert!(allowed.ok, "{allowed:?}");
    assert_eq!(allowed.action, SyncAction::Push);
}

#[tokio::test]
async fn pruned_snapshot_is_reseeded() {
    let server = server();
    seed_server(&server, 1);
    server.store().prune_all("u1");
    let device = Device::new(&server, "d1", dataset("local"));

    let result = device.engine.run_once(RunOptions::manual()).await;
    assert!(result.ok, "{result:?}");
    assert_eq!(result.reason, reason::SERVER_SNAPSHOT_PRUNED_RESEEDED);
    assert_eq!(result.action, SyncAction::Push);
    assert_eq!(result.server_revision, Some(2));
    assert!(!device.engine.sync_state().needs_reseed);
}

#[tokio::test]
async fn pruned_snapshot_without_local_data_needs_reseed() {
    let server = server();
    seed_server(&server, 1);
    server.store().prune_all("u1");
    let device = Device::new(&server, "d1", Archive::new(json!({"data": {}})));

    let result = device.engine.run_once(RunOptions::manual()).await;
    assert!(!result.ok);
    assert!(result.needs_reseed);
    assert_eq!(result.reason, reason::SERVER_SNAPSHOT_PRUNED);
    assert!(device.engine.sync_state().needs_reseed);
    assert_eq!(device.engine.indicator().label, "Reseed Required");
}

#[tokio::test]
async fn oversized_archive_is_reported() {
    let server = Arc::new(SyncServer::new(
        ServerConfig::default().with_max_archive_bytes(200),
    ));
    let rows: Vec<_> = (0..50).map(|n| json!({"id": n})).collect();
    let device = Device::new(&server, "d1", Archive::new(json!({"data": {"sessions": rows}})));

    let result = device.engine.run_once(RunOptions::manual()).await;
    assert!(!result.ok);
    assert!(result.error.unwrap().starts_with("payload too large"));
    assert_eq!(server.store().revision_count("u1"), 0);
}
