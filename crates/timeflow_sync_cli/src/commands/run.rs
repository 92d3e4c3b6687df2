//! Run command implementation.

use super::open_engine;
use crate::error::{CliError, CliResult};
use std::path::Path;
use timeflow_sync_engine::{RunOptions, RunResult};

/// Runs one sync round and prints its result.
///
/// A failed run is printed like any other and then reported as an error so
/// the process exits non-zero.
pub async fn run(
    data_dir: &Path,
    archive: &Path,
    startup: bool,
    demo: bool,
    format: &str,
) -> CliResult<()> {
    let engine = open_engine(data_dir, archive, demo)?;
    let options = if startup {
        RunOptions::startup()
    } else {
        RunOptions::manual()
    };

    let result = engine.run_once(options).await;
    println!("{}", render(&result, format)?);

    if result.ok {
        Ok(())
    } else {
        Err(CliError::RunFailed(
            result.error.unwrap_or_else(|| result.reason.clone()),
        ))
    }
}

/// Formats a run result.
pub fn render(result: &RunResult, format: &str) -> CliResult<String> {
    if format == "json" {
        return Ok(serde_json::to_string_pretty(result)?);
    }

    let outcome = match (result.ok, result.skipped) {
        (true, true) => "skipped",
        (true, false) => "ok",
        (false, _) => "failed",
    };

    let mut lines = vec![
        format!("Result:    {outcome}"),
        format!("Action:    {}", result.action),
        format!("Reason:    {}", result.reason),
    ];
    if let Some(revision) = result.server_revision {
        lines.push(format!("Revision:  {revision}"));
    }
    if let Some(summary) = &result.import_summary {
        lines.push(format!(
            "Imported:  {} projects, {} apps, {} sessions, {} daily files",
            summary.projects_created,
            summary.apps_created,
            summary.sessions_imported,
            summary.daily_files_imported
        ));
    }
    if let Some(pending) = result.ack_pending {
        let ack_reason = result.ack_reason.as_deref().unwrap_or("-");
        lines.push(format!("ACK:       pending={pending} ({ack_reason})"));
    }
    if result.needs_reseed {
        lines.push("Reseed:    required".to_string());
    }
    if let Some(error) = &result.error {
        lines.push(format!("Error:     {error}"));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use timeflow_sync_engine::SyncAction;
    use timeflow_sync_protocol::{reason, ImportSummary};

    #[test]
    fn render_pull() {
        let mut result = RunResult::completed(SyncAction::Pull, reason::PULL_APPLIED_ACK_PENDING, Some(7));
        result.import_summary = Some(ImportSummary {
            projects_created: 2,
            sessions_imported: 10,
            ..Default::default()
        });
        result.ack_pending = Some(true);
        result.ack_reason = Some("request timeout".into());

        let text = render(&result, "text").unwrap();
        assert!(text.contains("Result:    ok"));
        assert!(text.contains("Action:    pull"));
        assert!(text.contains("Revision:  7"));
        assert!(text.contains("2 projects, 0 apps, 10 sessions"));
        assert!(text.contains("pending=true (request timeout)"));
    }

    #[test]
    fn render_failure_json() {
        let result = RunResult::failed("HTTP 502");
        let json = render(&result, "json").unwrap();
        assert!(json.contains("\"reason\": \"sync_failed\""));
        assert!(json.contains("\"error\": \"HTTP 502\""));
    }

    #[tokio::test]
    async fn unconfigured_run_is_skipped() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("archive.json");

        // Sync is off by default; the run succeeds as a skip without network.
        run(dir.path(), &archive, false, false, "text").await.unwrap();
        assert!(!archive.exists());
    }
}
