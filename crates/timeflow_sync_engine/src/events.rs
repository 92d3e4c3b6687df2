//! In-process notifications owned by the engine.

use tokio::sync::broadcast;

/// Capacity of the engine's event channel.
///
/// Slow receivers that fall further behind see `Lagged` and skip ahead.
/// The scheduler treats a lag as a settings change plus a local change.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events broadcast by [`crate::SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Settings were saved.
    SettingsChanged,
    /// The host mutated local data.
    LocalDataChanged {
        /// Free-form description of the mutation.
        reason: String,
    },
    /// The application window gained focus.
    Focus,
}

impl EngineEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::SettingsChanged => "settings_changed",
            EngineEvent::LocalDataChanged { .. } => "local_data_changed",
            EngineEvent::Focus => "focus",
        }
    }
}

pub(crate) fn channel() -> broadcast::Sender<EngineEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}
