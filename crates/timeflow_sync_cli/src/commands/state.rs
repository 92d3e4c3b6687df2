//! State command implementation.

use super::open_store;
use crate::error::CliResult;
use std::path::Path;
use timeflow_sync_engine::{scope_key, SettingsStore, SyncState, SyncStateStore};

/// Runs the state command.
pub fn run(data_dir: &Path, format: &str) -> CliResult<()> {
    let store = open_store(data_dir)?;
    let settings = SettingsStore::new(store.clone()).load();
    let state = SyncStateStore::new(store).load(&settings);

    println!("{}", render(&scope_key(&settings), &state, format)?);
    Ok(())
}

/// Formats the state of one account scope.
pub fn render(scope: &str, state: &SyncState, format: &str) -> CliResult<String> {
    if format == "json" {
        return Ok(serde_json::to_string_pretty(state)?);
    }

    let mut lines = vec![
        "=== Sync State ===".to_string(),
        format!("Scope:            {scope}"),
        format!("Server revision:  {}", state.server_revision),
        format!(
            "Server hash:      {}",
            state.server_hash.as_deref().unwrap_or("(none)")
        ),
        format!(
            "Last sync:        {}",
            state
                .last_sync_at
                .map_or_else(|| "never".to_string(), |at| at.to_rfc3339())
        ),
        format!("Needs reseed:     {}", state.needs_reseed),
    ];

    match &state.pending_ack {
        Some(ack) => {
            lines.push(format!(
                "Pending ACK:      r{} ({} retries)",
                ack.revision, ack.retries
            ));
            if let Some(error) = &ack.last_error {
                lines.push(format!("  Last error:     {error}"));
            }
        }
        None => lines.push("Pending ACK:      none".to_string()),
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use timeflow_sync_engine::PendingAck;

    #[test]
    fn render_fresh_state() {
        let text = render("u1::d1", &SyncState::default(), "text").unwrap();
        assert!(text.contains("Scope:            u1::d1"));
        assert!(text.contains("Server revision:  0"));
        assert!(text.contains("Last sync:        never"));
        assert!(text.contains("Pending ACK:      none"));
    }

    #[test]
    fn render_pending_ack() {
        let mut ack = PendingAck::new(4, "h4", Utc::now());
        ack.retries = 2;
        ack.last_error = Some("request timeout".into());
        let state = SyncState {
            server_revision: 4,
            pending_ack: Some(ack),
            ..Default::default()
        };

        let text = render("u1::d1", &state, "text").unwrap();
        assert!(text.contains("Pending ACK:      r4 (2 retries)"));
        assert!(text.contains("Last error:     request timeout"));

        let json = render("u1::d1", &state, "json").unwrap();
        assert!(json.contains("\"serverRevision\": 4"));
    }
}
