//! Outcome of a single sync run and the options that start one.

use serde::{Deserialize, Serialize};
use std::fmt;
use timeflow_sync_protocol::{reason, ImportSummary};

/// What a run did to the local or remote dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// Nothing was transferred.
    None,
    /// The local archive became a new server revision.
    Push,
    /// A server revision was imported locally.
    Pull,
    /// A push was deduplicated by the server.
    Noop,
}

impl SyncAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::None => "none",
            SyncAction::Push => "push",
            SyncAction::Pull => "pull",
            SyncAction::Noop => "noop",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Explicit user or CLI request.
    Manual,
    /// First run after the scheduler starts.
    Startup,
    /// User-configured periodic timer.
    Interval,
    /// Short fixed poll.
    Poll,
    /// Debounced local data change.
    LocalChange,
}

impl TriggerSource {
    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Startup => "startup",
            TriggerSource::Interval => "interval",
            TriggerSource::Poll => "poll",
            TriggerSource::LocalChange => "local_change",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for [`crate::SyncEngine::run_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Bypass the `autoSyncOnStartup` toggle.
    ///
    /// Every trigger except the startup one sets this.
    pub ignore_startup_toggle: bool,
    /// What started the run.
    pub source: TriggerSource,
}

impl RunOptions {
    /// Options for a manual run.
    pub fn manual() -> Self {
        Self::triggered(TriggerSource::Manual)
    }

    /// Options for the startup run, which honors `autoSyncOnStartup`.
    pub fn startup() -> Self {
        Self {
            ignore_startup_toggle: false,
            source: TriggerSource::Startup,
        }
    }

    /// Options for a routine trigger that bypasses the startup toggle.
    pub fn triggered(source: TriggerSource) -> Self {
        Self {
            ignore_startup_toggle: true,
            source,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::manual()
    }
}

/// Result of one [`crate::SyncEngine::run_once`] invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// False if the run failed.
    pub ok: bool,
    /// True if the run stopped before contacting the server.
    pub skipped: bool,
    /// What the run did.
    pub action: SyncAction,
    /// Machine-readable explanation, see [`timeflow_sync_protocol::reason`].
    pub reason: String,
    /// Server revision known after the run.
    pub server_revision: Option<u64>,
    /// Import report of a pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_summary: Option<ImportSummary>,
    /// Error message of a failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the server accepted the acknowledgement of a pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_accepted: Option<bool>,
    /// Whether an acknowledgement is still outstanding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_pending: Option<bool>,
    /// Reason or error of the acknowledgement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_reason: Option<String>,
    /// Whether the acknowledged revision is the server's latest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_is_latest: Option<bool>,
    /// True if the server needs a reseed this client could not provide.
    #[serde(default)]
    pub needs_reseed: bool,
}

impl RunResult {
    /// A run that stopped before the network.
    pub fn skipped(reason: impl Into<String>, server_revision: Option<u64>) -> Self {
        Self {
            ok: true,
            skipped: true,
            ..Self::completed(SyncAction::None, reason, server_revision)
        }
    }

    /// A run that completed.
    pub fn completed(
        action: SyncAction,
        reason: impl Into<String>,
        server_revision: Option<u64>,
    ) -> Self {
        Self {
            ok: true,
            skipped: false,
            action,
            reason: reason.into(),
            server_revision,
            import_summary: None,
            error: None,
            ack_accepted: None,
            ack_pending: None,
            ack_reason: None,
            ack_is_latest: None,
            needs_reseed: false,
        }
    }

    /// A run that failed with `error`.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Self::completed(SyncAction::None, reason::SYNC_FAILED, None)
        }
    }

    /// True if the run was skipped because sync is switched off or unconfigured.
    pub fn is_configuration_skip(&self) -> bool {
        self.skipped
            && matches!(
                self.reason.as_str(),
                reason::DISABLED | reason::MISSING_CONFIG | reason::STARTUP_DISABLED
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn skipped_result_shape() {
        let result = RunResult::skipped(reason::DISABLED, None);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["ok"], json!(true));
        assert_eq!(value["skipped"], json!(true));
        assert_eq!(value["action"], json!("none"));
        assert_eq!(value["reason"], json!("disabled"));
        assert!(value.get("error").is_none());
        assert!(result.is_configuration_skip());
    }

    #[test]
    fn failed_result_shape() {
        let result = RunResult::failed("request timeout");
        assert!(!result.ok);
        assert!(!result.skipped);
        assert_eq!(result.action, SyncAction::None);
        assert_eq!(result.reason, "sync_failed");
        assert_eq!(result.error.as_deref(), Some("request timeout"));
    }

    #[test]
    fn run_options() {
        assert!(!RunOptions::startup().ignore_startup_toggle);
        assert!(RunOptions::manual().ignore_startup_toggle);
        assert_eq!(RunOptions::triggered(TriggerSource::Poll).source.as_str(), "poll");
        assert_eq!(SyncAction::Noop.to_string(), "noop");
    }
}
