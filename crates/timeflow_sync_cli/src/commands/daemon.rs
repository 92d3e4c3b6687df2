//! Daemon command implementation.

use super::open_engine;
use crate::error::CliResult;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use timeflow_sync_engine::{IndicatorSnapshot, SyncScheduler};

/// How often the dataset file is checked for local edits.
const WATCH_PERIOD: Duration = Duration::from_secs(5);

/// Runs the scheduler until Ctrl-C.
///
/// Edits to the dataset file are reported to the engine as local changes;
/// the engine's own imports are not.
pub async fn run(data_dir: &Path, archive: &Path, demo: bool) -> CliResult<()> {
    let engine = Arc::new(open_engine(data_dir, archive, demo)?);

    let last_line = Mutex::new(String::new());
    let _subscription = engine.subscribe_indicator(move |snapshot| {
        let line = format_snapshot(snapshot);
        let mut last = last_line.lock();
        if *last != line {
            println!("{line}");
            *last = line;
        }
    });

    let scheduler = SyncScheduler::start(Arc::clone(&engine));
    tracing::info!(archive = %engine.host().path().display(), "sync daemon started");

    let mut watch = tokio::time::interval(WATCH_PERIOD);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
            _ = watch.tick() => {
                if engine.host().take_local_change() {
                    engine.notify_local_change("archive_file_changed");
                }
            }
        }
    }

    tracing::info!("shutting down sync daemon");
    scheduler.shutdown().await;
    Ok(())
}

fn format_snapshot(snapshot: &IndicatorSnapshot) -> String {
    format!(
        "[{}] {} - {}",
        snapshot.status.as_str(),
        snapshot.label,
        snapshot.detail
    )
}
