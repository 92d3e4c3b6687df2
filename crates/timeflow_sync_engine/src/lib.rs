//! # TimeFlow Sync Engine
//!
//! Local-first online sync for the TimeFlow dashboard.
//!
//! This crate provides:
//! - Durable, self-healing settings and sync state
//! - The sync orchestrator ([`SyncEngine::run_once`])
//! - Automatic triggers ([`SyncScheduler`]): startup, interval, poll, local change
//! - A status indicator broadcaster ([`IndicatorHub`])
//! - HTTP transport abstraction with a `reqwest` client
//! - Per-run sync log with size-based rotation
//!
//! ## Architecture
//!
//! Every run is evaluated fresh against the server:
//! 1. Acknowledge any previously imported revision
//! 2. Ask the server for `status`
//! 3. Pull and import if the server is ahead, otherwise push the full archive
//!
//! The server deduplicates pushes by content hash, so repeated runs with no
//! changes converge to `noop` or `none`.
//!
//! ## Key Invariants
//!
//! - At most one run is in flight per engine
//! - Runs never return an error; failures become `sync_failed` results
//! - The indicator is a projection, never a source of truth
//! - The device id is generated once and survives toggling sync

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod events;
mod host;
mod http;
mod indicator;
mod result;
mod scheduler;
mod settings;
mod state;
pub mod sync_log;
mod transport;

pub use config::{
    EngineConfig, RetryConfig, DEFAULT_LOCAL_CHANGE_DEBOUNCE, DEFAULT_POLL_INTERVAL,
    MAX_ACK_TIMEOUT, MIN_ACK_TIMEOUT,
};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use events::{EngineEvent, EVENT_CHANNEL_CAPACITY};
pub use host::{ArchiveHost, MemoryArchiveHost};
pub use http::{decode_reply, HttpClient, HttpReply, HttpTransport, LoopbackClient, LoopbackServer, ReqwestClient};
pub use indicator::{
    compute_snapshot, IndicatorHub, IndicatorSnapshot, IndicatorStatus, IndicatorSubscription,
};
pub use result::{RunOptions, RunResult, SyncAction, TriggerSource};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use settings::{
    normalize_api_token, normalize_server_url, SettingsPatch, SettingsStore, SyncSettings,
    DEFAULT_INTERVAL_MINUTES, DEFAULT_REQUEST_TIMEOUT_MS, MAX_INTERVAL_MINUTES,
    MAX_REQUEST_TIMEOUT_MS, MIN_INTERVAL_MINUTES, MIN_REQUEST_TIMEOUT_MS, SETTINGS_KEY,
};
pub use state::{scope_key, PendingAck, SyncState, SyncStateStore, STATE_KEY};
pub use transport::{Endpoint, MockTransport, SyncTransport, TransportCall};
