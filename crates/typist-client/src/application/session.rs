//! Session controller: device selection, connect, reconnect, and intents.
//!
//! # Actor model (for beginners)
//!
//! The controller is one tokio task that owns every piece of mutable link
//! state: the transport adapter, the notification router, the backspace
//! tracker, the backoff policy, and both timers.  Nothing else touches them,
//! so no locks are needed.  The task waits on several inputs at once with
//! `tokio::select!` and handles exactly one at a time:
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//! SessionHandle ─▶│ commands                                 │
//! adapter ───────▶│ link events (notifications, drops)       │──▶ SessionEvent
//! writer tasks ──▶│ write outcomes                           │
//! reconnect_at ──▶│ reconnect deadline                       │
//! settle_at ─────▶│ settle deadline                          │
//!                 └──────────────────────────────────────────┘
//! ```
//!
//! Each deadline is an `Option<Instant>`, so there is never more than one
//! reconnect timer or settle timer.
//!
//! # States
//!
//! ```text
//!               connect / resume              open ok
//! Disconnected ─────────────────▶ Connecting ─────────▶ Connected
//!      ▲                            │ open failed           │ unexpected drop
//!      │ disconnect                 ▼                       ▼
//!      └────────────────────────────────────────────── Reconnecting
//!                                                     (retry with backoff)
//! ```
//!
//! Open awaits run inside the actor, so commands that arrive while a connect
//! is in progress are handled once it finishes.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use typist_core::domain::backoff::{DEFAULT_CEILING, DEFAULT_FLOOR, DEFAULT_JITTER};
use typist_core::domain::typed_text::{char_units, text_payload};
use typist_core::{
    ConfigCommand, ConfigDocument, DeviceHandle, MacroDraft, NotificationRouter, ReconnectBackoff,
    RouteOutcome, TypedTextTracker,
};

use crate::application::error::{RemoteCommandError, SessionError};
use crate::application::store::StateStore;
use crate::application::transport::{
    BleBackend, DeviceFilter, LinkEvent, LinkSettings, TransportAdapter, TransportError,
};
use crate::application::writer::{ChunkedWriter, WriteError, WriterSettings};

/// Default wait before the forced parse of a stream that looked complete.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(150);

/// Field name used by front-ends with a single text input.
pub const DEFAULT_FIELD: &str = "main";

/// Runtime settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub filter: DeviceFilter,
    pub link: LinkSettings,
    pub writer: WriterSettings,
    pub reconnect_floor: Duration,
    pub reconnect_ceiling: Duration,
    pub reconnect_jitter: Duration,
    pub settle_delay: Duration,
    /// Append `\n` to typed text.
    pub send_with_enter: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            filter: DeviceFilter::default(),
            link: LinkSettings::default(),
            writer: WriterSettings::default(),
            reconnect_floor: DEFAULT_FLOOR,
            reconnect_ceiling: DEFAULT_CEILING,
            reconnect_jitter: DEFAULT_JITTER,
            settle_delay: DEFAULT_SETTLE_DELAY,
            send_with_enter: true,
        }
    }
}

/// Link state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Intents accepted by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Connect,
    Disconnect { forget: bool },
    Pause,
    Resume,
    SendText { field: String, text: String },
    ReplaceText { field: String, text: String },
    RunMacro(i64),
    ListConfig,
    SaveMacro(MacroDraft),
    DeleteMacro(i64),
    SetStartup(i64),
    SetStartupScript(String),
    /// Disconnect (keeping the device) and stop the actor.
    Shutdown,
}

/// What a finished write carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentPayload {
    Text { field: String, chars: usize },
    Macro(i64),
    Command(String),
}

/// Everything the controller reports to front-ends.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    ConfigLoaded(ConfigDocument),
    Sent(SentPayload),
    /// A user-visible error message.
    Notice(String),
}

/// Cheap, clonable handle for sending intents to the actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Sends a raw command.  Returns `false` if the actor has stopped.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn connect(&self) -> bool {
        self.send(SessionCommand::Connect)
    }

    pub fn disconnect(&self, forget: bool) -> bool {
        self.send(SessionCommand::Disconnect { forget })
    }

    pub fn pause(&self) -> bool {
        self.send(SessionCommand::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(SessionCommand::Resume)
    }

    pub fn send_text(&self, field: &str, text: &str) -> bool {
        self.send(SessionCommand::SendText {
            field: field.to_string(),
            text: text.to_string(),
        })
    }

    pub fn replace_text(&self, field: &str, text: &str) -> bool {
        self.send(SessionCommand::ReplaceText {
            field: field.to_string(),
            text: text.to_string(),
        })
    }

    pub fn run_macro(&self, id: i64) -> bool {
        self.send(SessionCommand::RunMacro(id))
    }

    pub fn list_config(&self) -> bool {
        self.send(SessionCommand::ListConfig)
    }

    pub fn save_macro(&self, draft: MacroDraft) -> bool {
        self.send(SessionCommand::SaveMacro(draft))
    }

    pub fn delete_macro(&self, id: i64) -> bool {
        self.send(SessionCommand::DeleteMacro(id))
    }

    pub fn set_startup(&self, id: i64) -> bool {
        self.send(SessionCommand::SetStartup(id))
    }

    pub fn set_startup_script(&self, script: &str) -> bool {
        self.send(SessionCommand::SetStartupScript(script.to_string()))
    }

    pub fn shutdown(&self) -> bool {
        self.send(SessionCommand::Shutdown)
    }
}

struct WriteOutcome {
    sent: SentPayload,
    result: Result<(), WriteError>,
}

/// The session actor.  Either [`SessionController::spawn`] it, or build it
/// with [`SessionController::new`] and drive [`SessionController::run`].
pub struct SessionController {
    config: SessionConfig,
    backend: Arc<dyn BleBackend>,
    store: Box<dyn StateStore>,
    adapter: TransportAdapter,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    writer: ChunkedWriter,
    outcome_tx: mpsc::UnboundedSender<WriteOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<WriteOutcome>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,

    router: NotificationRouter,
    typed: TypedTextTracker,
    backoff: ReconnectBackoff,
    rng: StdRng,

    state: SessionState,
    device: Option<DeviceHandle>,
    config_doc: Option<ConfigDocument>,
    reconnect_at: Option<Instant>,
    settle_at: Option<Instant>,
}

impl SessionController {
    /// Builds the controller and spawns its writer lane.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        backend: Arc<dyn BleBackend>,
        store: Box<dyn StateStore>,
        config: SessionConfig,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (adapter, link_events) = TransportAdapter::new(Arc::clone(&backend), config.link.clone());
        let writer = ChunkedWriter::spawn(adapter.sink(), config.writer);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let backoff = ReconnectBackoff::new(
            config.reconnect_floor,
            config.reconnect_ceiling,
            config.reconnect_jitter,
        );

        let controller = Self {
            config,
            backend,
            store,
            adapter,
            link_events,
            writer,
            outcome_tx,
            outcome_rx,
            commands,
            events,
            router: NotificationRouter::new(),
            typed: TypedTextTracker::new(),
            backoff,
            rng: StdRng::from_entropy(),
            state: SessionState::Disconnected,
            device: None,
            config_doc: None,
            reconnect_at: None,
            settle_at: None,
        };
        let handle = SessionHandle {
            commands: command_tx,
        };
        (controller, handle, event_rx)
    }

    /// Convenience: [`new`](Self::new) plus `tokio::spawn(run())`.
    pub fn spawn(
        backend: Arc<dyn BleBackend>,
        store: Box<dyn StateStore>,
        config: SessionConfig,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>, JoinHandle<()>) {
        let (controller, handle, events) = Self::new(backend, store, config);
        let task = tokio::spawn(controller.run());
        (handle, events, task)
    }

    /// Replaces the jitter source (tests use a seeded generator).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Runs until [`SessionCommand::Shutdown`] or until every handle is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => {
                        self.disconnect(false).await;
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = self.link_events.recv() => self.handle_link_event(event).await,
                Some(outcome) = self.outcome_rx.recv() => self.handle_write_outcome(outcome).await,
                () = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.attempt_reconnect().await;
                }
                () = wait_until(self.settle_at) => {
                    self.settle_at = None;
                    let outcome = self.router.settle();
                    self.handle_route_outcome(outcome);
                }
            }
        }
        debug!("session controller stopped");
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect => self.connect().await,
            SessionCommand::Disconnect { forget } => self.disconnect(forget).await,
            SessionCommand::Pause => self.disconnect(false).await,
            SessionCommand::Resume => self.resume().await,
            SessionCommand::SendText { field, text } => {
                if !self.require_connected() {
                    return;
                }
                let payload = self.typed.send(&field, &text, self.config.send_with_enter);
                let chars = char_units(&text);
                self.enqueue(payload, SentPayload::Text { field, chars });
            }
            SessionCommand::ReplaceText { field, text } => {
                if !self.require_connected() {
                    return;
                }
                let payload = self.typed.replace(&field, &text, self.config.send_with_enter);
                let chars = char_units(&text);
                self.enqueue(payload, SentPayload::Text { field, chars });
            }
            SessionCommand::RunMacro(id) => self.run_macro(id),
            SessionCommand::ListConfig => self.send_command(ConfigCommand::List),
            SessionCommand::SaveMacro(draft) => self.send_command(ConfigCommand::Put(draft)),
            SessionCommand::DeleteMacro(id) => self.send_command(ConfigCommand::Delete(id)),
            SessionCommand::SetStartup(id) => self.send_command(ConfigCommand::SetStartup(id)),
            SessionCommand::SetStartupScript(script) => {
                self.send_command(ConfigCommand::SetStartupScript(script))
            }
            // Handled by the run loop.
            SessionCommand::Shutdown => {}
        }
    }

    /// Chooser → persist → open.
    async fn connect(&mut self) {
        match self.state {
            SessionState::Connecting => {
                debug!("connect ignored: already connecting");
                return;
            }
            SessionState::Connected => {
                debug!("connect ignored: already connected");
                return;
            }
            SessionState::Disconnected | SessionState::Reconnecting => {}
        }

        // A user-initiated connect supersedes any pending retry.
        self.reconnect_at = None;
        self.set_state(SessionState::Connecting);

        let device = match self.backend.request_device(&self.config.filter).await {
            Ok(device) => device,
            Err(e) => {
                self.surface(e.into());
                self.set_state(SessionState::Disconnected);
                return;
            }
        };

        if let Err(e) = self.store.save_device_id(&device.id) {
            warn!(error = %e, "could not persist device id");
        }
        self.remember(device.clone());

        match self.adapter.open(&device).await {
            Ok(_) => self.on_link_open(&device),
            Err(e) => {
                self.surface(e.into());
                self.set_state(SessionState::Disconnected);
            }
        }
    }

    async fn disconnect(&mut self, forget: bool) {
        self.reconnect_at = None;
        self.settle_at = None;
        self.router.reset_stream();
        self.adapter.close().await;

        if forget {
            if let Some(device) = self.device.take() {
                info!(%device, "forgetting device");
            }
            if let Err(e) = self.store.clear_device_id() {
                warn!(error = %e, "could not clear persisted device id");
            }
            self.typed.clear();
            self.config_doc = None;
            self.disconnect_authorised().await;
        }

        self.set_state(SessionState::Disconnected);
    }

    /// Best-effort disconnect of every authorised device matching the name
    /// pattern.
    async fn disconnect_authorised(&self) {
        let devices = match self.backend.known_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                debug!(error = %e, "could not list authorised devices");
                return;
            }
        };
        for device in devices
            .iter()
            .filter(|d| d.name_matches(&self.config.filter.name_pattern))
        {
            if let Ok(true) = self.backend.is_connected(device).await {
                if let Err(e) = self.backend.disconnect(device).await {
                    debug!(%device, error = %e, "best-effort disconnect failed");
                }
            }
        }
    }

    /// Re-attach without prompting.
    async fn resume(&mut self) {
        if matches!(
            self.state,
            SessionState::Connected | SessionState::Connecting
        ) {
            debug!(state = ?self.state, "resume ignored");
            return;
        }

        let device = match self.device.clone() {
            Some(device) => Some(device),
            None => self.find_known_device(true).await,
        };
        let Some(device) = device else {
            debug!("resume: no known device");
            return;
        };
        self.remember(device.clone());

        self.set_state(SessionState::Connecting);
        match self.adapter.open(&device).await {
            Ok(_) => self.on_link_open(&device),
            Err(e) => {
                debug!(%device, error = %e, "resume failed; scheduling reconnect");
                self.set_state(SessionState::Reconnecting);
                self.schedule_reconnect(self.backoff.initial_delay());
            }
        }
    }

    /// Looks up the persisted device among the authorised ones, optionally
    /// falling back to the first one matching the name pattern.
    async fn find_known_device(&self, match_by_name: bool) -> Option<DeviceHandle> {
        let devices = match self.backend.known_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                debug!(error = %e, "could not list authorised devices");
                return None;
            }
        };

        let persisted = match self.store.load_device_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "could not read persisted device id");
                None
            }
        };
        if let Some(id) = persisted {
            if let Some(device) = devices.iter().find(|d| d.id == id) {
                return Some(device.clone());
            }
        }

        if match_by_name {
            return devices
                .into_iter()
                .find(|d| d.name_matches(&self.config.filter.name_pattern));
        }
        None
    }

    fn run_macro(&mut self, id: i64) {
        let script = self
            .config_doc
            .as_ref()
            .and_then(|doc| doc.macro_by_id(id))
            .map(|m| m.script.clone());
        match script {
            Some(script) => self.enqueue(text_payload(&script, false), SentPayload::Macro(id)),
            None => self.surface(SessionError::UnknownMacro(id)),
        }
    }

    fn send_command(&mut self, command: ConfigCommand) {
        if !self.require_connected() {
            return;
        }
        let body = command.body();
        self.router.note_command(body.clone());
        self.enqueue(command.encode().into_bytes(), SentPayload::Command(body));
    }

    fn require_connected(&mut self) -> bool {
        if self.state == SessionState::Connected {
            return true;
        }
        self.surface(SessionError::NotConnected);
        false
    }

    /// Queues a payload on the writer lane and reports the outcome back to
    /// the actor when it finishes.
    fn enqueue(&mut self, payload: Vec<u8>, sent: SentPayload) {
        if self.state != SessionState::Connected {
            self.surface(SessionError::NotConnected);
            return;
        }
        let pending = self.writer.write(payload);
        let outcomes = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = pending.await;
            let _ = outcomes.send(WriteOutcome { sent, result });
        });
    }

    async fn handle_write_outcome(&mut self, outcome: WriteOutcome) {
        let error = match outcome.result {
            Ok(()) => {
                self.emit(SessionEvent::Sent(outcome.sent));
                return;
            }
            Err(error) => error,
        };

        let link_lost = match &error {
            WriteError::Chunk {
                source: TransportError::NotConnected,
                ..
            } => true,
            WriteError::Chunk {
                source: TransportError::Backend(_),
                ..
            } => !self.link_alive().await,
            _ => false,
        };
        self.surface(error.into());
        if link_lost {
            self.on_unexpected_drop().await;
        }
    }

    /// Asks the BLE stack whether the current device is still connected.
    async fn link_alive(&self) -> bool {
        let Some(device) = &self.device else {
            return false;
        };
        match self.backend.is_connected(device).await {
            Ok(connected) => connected,
            Err(e) => {
                debug!(%device, error = %e, "could not query link state");
                false
            }
        }
    }

    // ── Link events ───────────────────────────────────────────────────────────

    async fn handle_link_event(&mut self, event: LinkEvent) {
        if event.generation() != self.adapter.generation() {
            debug!(
                event_generation = event.generation(),
                current = self.adapter.generation(),
                "stale link event ignored"
            );
            return;
        }

        match event {
            LinkEvent::Notification { payload, .. } => {
                let outcome = self.router.route(&payload);
                self.handle_route_outcome(outcome);
            }
            LinkEvent::Disconnected { .. } => self.on_unexpected_drop().await,
        }
    }

    fn handle_route_outcome(&mut self, outcome: RouteOutcome) {
        match outcome {
            RouteOutcome::Pending => {}
            RouteOutcome::ConfigReady(doc) => {
                self.settle_at = None;
                info!(macros = doc.macros.len(), "configuration loaded");
                self.config_doc = Some(doc.clone());
                self.emit(SessionEvent::ConfigLoaded(doc));
            }
            RouteOutcome::ArmSettleTimer => {
                self.settle_at = Some(Instant::now() + self.config.settle_delay);
            }
            RouteOutcome::DecodeFailed(e) => {
                self.settle_at = None;
                self.surface(e.into());
            }
            RouteOutcome::CommandOk => {
                debug!(command = ?self.router.last_command(), "command acknowledged; refreshing");
                self.send_command(ConfigCommand::List);
            }
            RouteOutcome::CommandFailed { message, command } => {
                self.surface(RemoteCommandError { message, command }.into());
            }
            RouteOutcome::Unhandled(text) => debug!(%text, "device text"),
        }
    }

    async fn on_unexpected_drop(&mut self) {
        if self.state != SessionState::Connected {
            return;
        }
        warn!("link lost; reconnecting");
        self.adapter.invalidate().await;
        self.router.reset_stream();
        self.settle_at = None;
        self.set_state(SessionState::Reconnecting);
        self.schedule_reconnect(self.backoff.initial_delay());
    }

    // ── Reconnect ─────────────────────────────────────────────────────────────

    fn schedule_reconnect(&mut self, delay: Duration) {
        if self.reconnect_at.is_some() {
            debug!("reconnect already scheduled");
            return;
        }
        debug!(?delay, "reconnect scheduled");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    async fn attempt_reconnect(&mut self) {
        let device = match self.device.clone() {
            Some(device) => Some(device),
            None => self.find_known_device(false).await,
        };
        let Some(device) = device else {
            info!("no remembered device; giving up reconnect");
            self.set_state(SessionState::Disconnected);
            return;
        };

        match self.adapter.open(&device).await {
            Ok(_) => self.on_link_open(&device),
            Err(e) => {
                let delay = self.backoff.escalate(&mut self.rng);
                if matches!(e, TransportError::ProtocolMismatch(_)) {
                    warn!(%device, error = %e, ?delay, "reconnect failed");
                } else {
                    debug!(%device, error = %e, ?delay, "reconnect failed");
                }
                self.schedule_reconnect(delay);
            }
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn on_link_open(&mut self, device: &DeviceHandle) {
        info!(%device, "connected");
        self.backoff.reset();
        self.reconnect_at = None;
        self.settle_at = None;
        self.router.reset_stream();
        self.set_state(SessionState::Connected);
        self.send_command(ConfigCommand::List);
    }

    fn remember(&mut self, device: DeviceHandle) {
        if self.device.as_ref() != Some(&device) {
            self.typed.clear();
        }
        self.device = Some(device);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "session state");
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    /// Reports a user-facing error and persists it.  Cancellations are only
    /// logged.
    fn surface(&mut self, error: SessionError) {
        if error.is_cancellation() {
            info!("device selection cancelled");
            return;
        }
        warn!(error = %error, "session error");
        let message = error.to_string();
        if let Err(e) = self.store.save_last_error(&message) {
            warn!(error = %e, "could not persist last error");
        }
        self.emit(SessionEvent::Notice(message));
    }

    fn emit(&self, event: SessionEvent) {
        // A front-end that stopped listening is not an error for the link.
        let _ = self.events.send(event);
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::store::{MemoryStateStore, MockStateStore};
    use crate::infrastructure::ble::mock::MockBleBackend;

    async fn next_state(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionState {
        loop {
            match events.recv().await {
                Some(SessionEvent::StateChanged(state)) => return state,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_controller_can_run_on_a_worker_thread() {
        fn assert_send<T: Send>(_: &T) {}

        let (controller, _handle, _events) = SessionController::new(
            Arc::new(MockBleBackend::with_typist()),
            Box::new(MemoryStateStore::new()),
            SessionConfig::default(),
        );
        let run = controller.run();

        assert_send(&run);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_chooser_is_not_persisted() {
        // Arrange: chooser finds nothing, store must not be written
        let mock = Arc::new(MockBleBackend::new());
        let mut store = MockStateStore::new();
        store.expect_save_last_error().times(0);
        store.expect_save_device_id().times(0);
        store.expect_clear_device_id().returning(|| Ok(()));
        let (handle, mut events, task) =
            SessionController::spawn(mock, Box::new(store), SessionConfig::default());

        // Act
        handle.connect();

        // Assert
        assert_eq!(next_state(&mut events).await, SessionState::Connecting);
        assert_eq!(next_state(&mut events).await, SessionState::Disconnected);
        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_is_a_notice() {
        let mock = Arc::new(MockBleBackend::with_typist());
        let (handle, mut events, _task) = SessionController::spawn(
            mock.clone(),
            Box::new(MemoryStateStore::new()),
            SessionConfig::default(),
        );

        handle.send_text(DEFAULT_FIELD, "hi");

        match events.recv().await {
            Some(SessionEvent::Notice(message)) => assert!(message.contains("not connected")),
            other => panic!("expected notice, got {other:?}"),
        }
        assert!(mock.written().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_unknown_macro_is_a_notice() {
        // Arrange
        let mock = Arc::new(MockBleBackend::with_typist());
        let (handle, mut events, _task) = SessionController::spawn(
            mock.clone(),
            Box::new(MemoryStateStore::new()),
            SessionConfig::default(),
        );
        handle.connect();
        while next_state(&mut events).await != SessionState::Connected {}

        // Act
        handle.run_macro(42);

        // Assert
        loop {
            match events.recv().await {
                Some(SessionEvent::Notice(message)) => {
                    assert_eq!(message, "no macro with id 42");
                    break;
                }
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_without_known_device_stays_disconnected() {
        let mock = Arc::new(MockBleBackend::new());
        let (handle, mut events, task) = SessionController::spawn(
            mock.clone(),
            Box::new(MemoryStateStore::new()),
            SessionConfig::default(),
        );

        handle.resume();
        handle.shutdown();
        task.await.unwrap();

        assert_eq!(mock.connect_count(), 0);
        assert!(events.try_recv().is_err(), "no state change expected");
    }

    #[test]
    fn test_default_config_matches_link_constants() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.reconnect_floor, Duration::from_millis(800));
        assert_eq!(cfg.reconnect_ceiling, Duration::from_millis(12_800));
        assert_eq!(cfg.settle_delay, Duration::from_millis(150));
        assert_eq!(cfg.writer.chunk_size, 20);
        assert!(cfg.send_with_enter);
    }
}
