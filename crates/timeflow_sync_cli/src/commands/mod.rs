//! CLI command implementations.

pub mod daemon;
pub mod log;
pub mod run;
pub mod settings;
pub mod state;

use crate::archive_file::FileArchiveHost;
use crate::error::CliResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use timeflow_sync_engine::{EngineConfig, HttpTransport, ReqwestClient, SyncEngine};
use timeflow_sync_storage::{FileStore, KeyValueStore};

/// The engine as wired by the CLI.
pub type CliEngine = SyncEngine<HttpTransport<ReqwestClient>, FileArchiveHost>;

/// Opens the durable record store inside the data directory.
pub fn open_store(data_dir: &Path) -> CliResult<Arc<dyn KeyValueStore>> {
    Ok(Arc::new(FileStore::open(data_dir)?))
}

/// Path of the sync log inside the data directory.
pub fn sync_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sync.log")
}

/// Builds an engine over the data directory and a dataset file.
pub fn open_engine(data_dir: &Path, archive: &Path, demo: bool) -> CliResult<CliEngine> {
    let store = open_store(data_dir)?;
    let config = EngineConfig::new().with_sync_log(sync_log_path(data_dir));
    let host = FileArchiveHost::new(archive).with_demo_mode(demo);

    Ok(SyncEngine::new(
        config,
        store,
        HttpTransport::new(ReqwestClient::new()),
        host,
    ))
}
