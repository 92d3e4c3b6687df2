//! Settings commands.

use super::open_store;
use crate::error::{CliError, CliResult};
use clap::Args;
use std::path::Path;
use timeflow_sync_engine::{SettingsPatch, SettingsStore, SyncSettings};

/// Arguments of `settings set`; every flag is optional.
#[derive(Debug, Default, Args)]
pub struct SetArgs {
    /// Master switch
    #[arg(long)]
    pub enabled: Option<bool>,

    /// Sync once when the application starts
    #[arg(long)]
    pub startup: Option<bool>,

    /// Minutes between automatic syncs (1-1440)
    #[arg(long)]
    pub interval: Option<i64>,

    /// Base URL of the sync server
    #[arg(long)]
    pub server_url: Option<String>,

    /// Account identifier
    #[arg(long)]
    pub user_id: Option<String>,

    /// Bearer token; an empty value clears it
    #[arg(long)]
    pub api_token: Option<String>,

    /// Override the generated device identifier
    #[arg(long)]
    pub device_id: Option<String>,

    /// Request timeout in milliseconds (3000-60000)
    #[arg(long)]
    pub timeout_ms: Option<i64>,

    /// Append each run to the sync log
    #[arg(long)]
    pub logging: Option<bool>,
}

impl From<SetArgs> for SettingsPatch {
    fn from(args: SetArgs) -> Self {
        SettingsPatch {
            enabled: args.enabled,
            auto_sync_on_startup: args.startup,
            auto_sync_interval_minutes: args.interval,
            server_url: args.server_url,
            user_id: args.user_id,
            api_token: args.api_token,
            device_id: args.device_id,
            request_timeout_ms: args.timeout_ms,
            enable_logging: args.logging,
        }
    }
}

/// Runs `settings show`.
pub fn show(data_dir: &Path, format: &str) -> CliResult<()> {
    let settings = SettingsStore::new(open_store(data_dir)?).load();
    println!("{}", render(&settings, format)?);
    Ok(())
}

/// Runs `settings set`.
pub fn set(data_dir: &Path, args: SetArgs) -> CliResult<()> {
    let patch = SettingsPatch::from(args);
    if patch.is_empty() {
        return Err(CliError::InvalidArgument(
            "nothing to change; pass at least one setting".into(),
        ));
    }

    let saved = SettingsStore::new(open_store(data_dir)?).save(patch)?;
    println!("{}", render(&saved, "text")?);
    Ok(())
}

/// Formats settings for display. The API token is never printed.
pub fn render(settings: &SyncSettings, format: &str) -> CliResult<String> {
    let mut masked = settings.clone();
    if !masked.api_token.is_empty() {
        masked.api_token = "********".into();
    }

    if format == "json" {
        return Ok(serde_json::to_string_pretty(&masked)?);
    }

    let server_url = if masked.server_url.is_empty() {
        "(not set)"
    } else {
        masked.server_url.as_str()
    };
    let user_id = if masked.user_id.is_empty() {
        "(not set)"
    } else {
        masked.user_id.as_str()
    };
    let token = if masked.api_token.is_empty() { "(not set)" } else { "set" };

    Ok([
        "=== Sync Settings ===".to_string(),
        format!("Enabled:           {}", masked.enabled),
        format!("Sync on startup:   {}", masked.auto_sync_on_startup),
        format!("Interval:          {} min", masked.auto_sync_interval_minutes),
        format!("Server URL:        {server_url}"),
        format!("User ID:           {user_id}"),
        format!("API token:         {token}"),
        format!("Device ID:         {}", masked.device_id),
        format!("Request timeout:   {} ms", masked.request_timeout_ms),
        format!("Sync log:          {}", masked.enable_logging),
    ]
    .join("\n"))
}
