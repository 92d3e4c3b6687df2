//! Log command implementation.

use super::sync_log_path;
use crate::error::CliResult;
use std::path::Path;
use timeflow_sync_engine::sync_log;

/// Prints the sync log, or its last `lines` lines.
pub fn run(data_dir: &Path, lines: Option<usize>) -> CliResult<()> {
    let path = sync_log_path(data_dir);
    let content = sync_log::tail(&path, lines)?;

    if content.is_empty() {
        eprintln!("No sync log at {}", path.display());
        eprintln!("Enable it with: timeflow-sync settings set --logging true");
    } else {
        println!("{content}");
    }
    Ok(())
}
