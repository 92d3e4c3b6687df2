//! Reason strings carried in the `reason` field of responses and run results.
//!
//! The server chooses the reason for status, pull, push and ack responses;
//! the client forwards it into its run result. Client-side reasons describe
//! why a run was skipped or how it ended.

/// Server: the latest payload for this user was pruned and must be reseeded.
pub const SERVER_SNAPSHOT_PRUNED: &str = "server_snapshot_pruned";
/// Server: no revision stored yet.
pub const SERVER_EMPTY: &str = "server_empty";
/// Server: client hash equals the latest server hash.
pub const SAME_HASH: &str = "same_hash";
/// Server: server holds a newer revision than the client.
pub const SERVER_NEWER: &str = "server_newer";
/// Server: client content differs from the latest revision.
pub const CLIENT_CHANGED: &str = "client_changed";
/// Server: client already holds the latest revision.
pub const CLIENT_UP_TO_DATE: &str = "client_up_to_date";
/// Server: push stored as a new revision.
pub const ACCEPTED: &str = "accepted";
/// Server: ack recorded.
pub const ACK_RECORDED: &str = "ack_recorded";
/// Server: ack names a revision the server does not know.
pub const UNKNOWN_REVISION: &str = "unknown_revision";
/// Server: ack hash does not match the stored revision.
pub const HASH_MISMATCH_FOR_REVISION: &str = "hash_mismatch_for_revision";

/// Client: another run is in flight.
pub const ALREADY_RUNNING: &str = "already_running";
/// Client: sync is switched off.
pub const DISABLED: &str = "disabled";
/// Client: startup trigger while startup sync is switched off.
pub const STARTUP_DISABLED: &str = "startup_disabled";
/// Client: server URL or user id missing.
pub const MISSING_CONFIG: &str = "missing_config";
/// Client: host application runs in demo mode.
pub const DEMO_MODE: &str = "demo_mode";
/// Client: run failed with an error.
pub const SYNC_FAILED: &str = "sync_failed";
/// Client: local data pushed after the server pruned its snapshot.
pub const SERVER_SNAPSHOT_PRUNED_RESEEDED: &str = "server_snapshot_pruned_reseeded";
/// Client: pulled archive imported and acknowledged.
pub const PULL_APPLIED_ACK_ACCEPTED: &str = "pull_applied_ack_accepted";
/// Client: pulled archive imported, ack still pending.
pub const PULL_APPLIED_ACK_PENDING: &str = "pull_applied_ack_pending";
/// Client: pulled archive imported, ack refused for good.
pub const PULL_APPLIED_ACK_NOT_ACCEPTED: &str = "pull_applied_ack_not_accepted";
/// Client: no acknowledgement outstanding.
pub const NO_PENDING_ACK: &str = "no_pending_ack";
/// Client: acknowledgement postponed to a later run.
pub const ACK_DEFERRED: &str = "ack_deferred";
