//! Automatic sync triggers.
//!
//! The scheduler owns four timers that all funnel into
//! [`SyncEngine::run_once`]:
//!
//! - **startup**: once per engine, honoring `autoSyncOnStartup`
//! - **interval**: the user-configured period, re-armed after each run completes
//! - **poll**: a short fixed period catching changes from other devices
//! - **local change**: debounced after [`EngineEvent::LocalDataChanged`]
//!
//! Focus and settings-changed events tear down and re-arm the interval and
//! poll timers from current settings. Timers use `tokio::time`, so tests can
//! drive the scheduler with a paused clock.

use crate::engine::SyncEngine;
use crate::events::EngineEvent;
use crate::host::ArchiveHost;
use crate::result::{RunOptions, TriggerSource};
use crate::transport::SyncTransport;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Messages to control the sync scheduler.
#[derive(Debug)]
enum SchedulerMessage {
    /// Stop all timers.
    Shutdown,
}

/// Handle to a running scheduler.
///
/// Dropping the handle disposes the scheduler as well.
#[derive(Debug)]
pub struct SchedulerHandle {
    sender: mpsc::UnboundedSender<SchedulerMessage>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Clears all timers without waiting.
    ///
    /// A run already in flight is not aborted; it completes and updates the
    /// shared state as usual.
    pub fn dispose(self) {
        let _ = self.sender.send(SchedulerMessage::Shutdown);
    }

    /// Clears all timers and waits for the scheduler loop to exit.
    pub async fn shutdown(self) {
        let _ = self.sender.send(SchedulerMessage::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync scheduler task failed");
        }
    }

    /// Returns true while the scheduler loop is alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Starts automatic sync for an engine.
pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawns the scheduler loop on the current tokio runtime.
    pub fn start<T, H>(engine: Arc<SyncEngine<T, H>>) -> SchedulerHandle
    where
        T: SyncTransport + 'static,
        H: ArchiveHost + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let events = engine.subscribe_events();
        let task = tokio::spawn(SchedulerLoop::new(engine, events, receiver).run());
        SchedulerHandle { sender, task }
    }
}

struct SchedulerLoop<T: SyncTransport, H: ArchiveHost> {
    engine: Arc<SyncEngine<T, H>>,
    events: broadcast::Receiver<EngineEvent>,
    control: mpsc::UnboundedReceiver<SchedulerMessage>,
    done_tx: mpsc::UnboundedSender<TriggerSource>,
    done_rx: mpsc::UnboundedReceiver<TriggerSource>,
    interval_at: Option<Instant>,
    poll_at: Option<Instant>,
    debounce_at: Option<Instant>,
    busy: bool,
}

impl<T, H> SchedulerLoop<T, H>
where
    T: SyncTransport + 'static,
    H: ArchiveHost + 'static,
{
    fn new(
        engine: Arc<SyncEngine<T, H>>,
        events: broadcast::Receiver<EngineEvent>,
        control: mpsc::UnboundedReceiver<SchedulerMessage>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            events,
            control,
            done_tx,
            done_rx,
            interval_at: None,
            poll_at: None,
            debounce_at: None,
            busy: false,
        }
    }

    async fn run(mut self) {
        self.rearm();
        if self.engine.claim_startup() {
            self.spawn_run(TriggerSource::Startup);
        }

        loop {
            tokio::select! {
                message = self.control.recv() => match message {
                    Some(SchedulerMessage::Shutdown) | None => break,
                },
                event = self.events.recv() => match event {
                    Ok(event) => {
                        debug!(event = event.name(), "engine event");
                        match event {
                            EngineEvent::SettingsChanged | EngineEvent::Focus => self.rearm(),
                            EngineEvent::LocalDataChanged { reason } => {
                                debug!(%reason, "local data changed");
                                self.arm_debounce();
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Dropped events may include local changes.
                        warn!(skipped, "scheduler lagged behind engine events");
                        self.rearm();
                        self.arm_debounce();
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(source) = self.done_rx.recv() => self.on_run_finished(source),
                _ = wait_until(self.interval_at) => {
                    self.interval_at = None;
                    if self.is_busy() {
                        debug!("interval tick while syncing");
                        self.arm_interval();
                    } else {
                        self.spawn_run(TriggerSource::Interval);
                    }
                }
                _ = wait_until(self.poll_at) => {
                    self.poll_at = None;
                    if self.is_busy() {
                        debug!("poll tick while syncing");
                        self.arm_poll();
                    } else {
                        self.spawn_run(TriggerSource::Poll);
                    }
                }
                _ = wait_until(self.debounce_at) => {
                    if self.is_busy() {
                        self.arm_debounce();
                    } else {
                        self.debounce_at = None;
                        self.spawn_run(TriggerSource::LocalChange);
                    }
                }
            }
        }

        debug!("sync scheduler stopped");
    }

    fn is_busy(&self) -> bool {
        self.busy || self.engine.is_syncing()
    }

    fn rearm(&mut self) {
        self.arm_interval();
        self.arm_poll();
    }

    fn arm_interval(&mut self) {
        let settings = self.engine.settings();
        self.interval_at = settings
            .enabled
            .then(|| Instant::now() + settings.interval());
    }

    fn arm_debounce(&mut self) {
        self.debounce_at = Some(Instant::now() + self.engine.config().local_change_debounce);
    }

    fn arm_poll(&mut self) {
        let enabled = self.engine.settings().enabled;
        self.poll_at = enabled.then(|| Instant::now() + self.engine.config().poll_interval);
    }

    fn on_run_finished(&mut self, source: TriggerSource) {
        self.busy = false;
        match source {
            TriggerSource::Interval => self.arm_interval(),
            TriggerSource::Poll => self.arm_poll(),
            _ => {}
        }
    }

    fn spawn_run(&mut self, source: TriggerSource) {
        self.busy = true;
        info!(%source, "starting scheduled sync");

        let engine = self.engine.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let options = match source {
                TriggerSource::Startup => RunOptions::startup(),
                other => RunOptions::triggered(other),
            };
            let result = engine.run_once(options).await;
            debug!(%source, ok = result.ok, reason = %result.reason, "scheduled sync done");
            // The loop may be gone after dispose; the run still counts.
            let _ = done.send(source);
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
