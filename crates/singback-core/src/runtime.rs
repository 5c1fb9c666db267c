//! Runtime thread for singback.
//!
//! The runtime thread owns the coordinator and the current trial's
//! [`PlaybackSession`]. It:
//! - Receives commands over a channel
//! - Sleeps until the next timer deadline
//! - Fires due timers and publishes what happened

use crate::coordinator::{PlayOutcome, PlaybackRecordCoordinator};
use crate::environment::{Capabilities, ClientEnvironment};
use crate::error::{Error, Result};
use crate::recording::WindowId;
use crate::session::PlaybackSession;
use crate::stimulus::PlaybackRequest;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest wait between checks of the shutdown flag.
const IDLE_WAIT_MS: u64 = 50;

/// Commands accepted by the runtime thread.
#[derive(Debug, Clone)]
pub enum Command {
    /// Start a new trial with a fresh attempt counter.
    BeginTrial,
    Play(PlaybackRequest),
    /// Stop the running recording.
    StopRecording,
    ReportCapabilities(Capabilities),
    ReportUserInfo(ClientEnvironment),
    Shutdown,
}

/// Things the runtime thread reports back.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    Played(PlayOutcome),
    WindowClosed(WindowId),
    Error(String),
}

/// Handle to a running runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: Sender<Command>,
    event_rx: Receiver<RuntimeEvent>,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Send a command to the runtime thread.
    pub fn send(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).map_err(|_| Error::Shutdown)
    }

    pub fn begin_trial(&self) -> Result<()> {
        self.send(Command::BeginTrial)
    }

    pub fn play(&self, request: PlaybackRequest) -> Result<()> {
        self.send(Command::Play(request))
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.send(Command::StopRecording)
    }

    /// Events published by the runtime thread.
    pub fn events(&self) -> &Receiver<RuntimeEvent> {
        &self.event_rx
    }

    /// Signal the runtime to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.send(Command::Shutdown);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// The singback runtime.
pub struct Runtime {
    handle: RuntimeHandle,
    /// Join handle for the runtime thread.
    thread_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Move `coordinator` onto a new runtime thread.
    pub fn start(coordinator: PlaybackRecordCoordinator) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = RuntimeHandle {
            command_tx,
            event_rx,
            shutdown: shutdown.clone(),
        };

        let thread_handle = thread::Builder::new()
            .name("singback-runtime".to_string())
            .spawn(move || {
                let mut rt = RuntimeThread {
                    coordinator,
                    session: PlaybackSession::new(),
                    command_rx,
                    event_tx,
                };
                rt.run(shutdown);
            })?;

        log::info!("runtime started");
        Ok(Self {
            handle,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get a handle to interact with the runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Shut down the runtime gracefully.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RuntimeThread {
    coordinator: PlaybackRecordCoordinator,
    session: PlaybackSession,
    command_rx: Receiver<Command>,
    event_tx: Sender<RuntimeEvent>,
}

impl RuntimeThread {
    fn run(&mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            match self.command_rx.recv_timeout(self.wait_time()) {
                Ok(Command::Shutdown) => break,
                Ok(command) => self.handle_command(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.coordinator.poll();
            self.publish_closed();
        }

        // Hand over whatever is still being recorded.
        while self.coordinator.has_live_window() {
            if self.coordinator.stop_recording().is_none() {
                break;
            }
        }
        self.publish_closed();
        log::info!("runtime stopped");
    }

    fn wait_time(&self) -> Duration {
        let wait = match self.coordinator.next_deadline() {
            Some(due) => due.saturating_sub(self.coordinator.now_ms()),
            None => IDLE_WAIT_MS,
        };
        Duration::from_millis(wait.min(IDLE_WAIT_MS))
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::BeginTrial => {
                log::debug!(
                    "trial finished after {} attempts ({:.2}s of stimulus)",
                    self.session.attempts(),
                    self.session.expected_duration()
                );
                self.session = PlaybackSession::new();
            }
            Command::Play(request) => match self.coordinator.play(&mut self.session, &request) {
                Ok(outcome) => self.publish(RuntimeEvent::Played(outcome)),
                Err(e) => {
                    log::warn!("play failed: {}", e);
                    self.publish(RuntimeEvent::Error(e.to_string()));
                }
            },
            Command::StopRecording => {
                if self.coordinator.stop_recording().is_none() {
                    log::debug!("stop requested with no recording window");
                }
            }
            Command::ReportCapabilities(capabilities) => {
                self.coordinator.report_capabilities(&capabilities);
            }
            Command::ReportUserInfo(environment) => {
                if let Err(e) = self.coordinator.report_user_info(&environment) {
                    self.publish(RuntimeEvent::Error(e.to_string()));
                }
            }
            Command::Shutdown => {}
        }
    }

    fn publish_closed(&mut self) {
        for window in self.coordinator.take_closed() {
            self.publish(RuntimeEvent::WindowClosed(window));
        }
    }

    fn publish(&self, event: RuntimeEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }
}
