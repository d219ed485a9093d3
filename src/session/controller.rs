//! Core session state machine.
//!
//! Handles transitions between Uninitialized, Initializing, Ready,
//! Listening, Stopping, and Destroyed based on host lifecycle requests and
//! engine events.
//!
//! Initialization is expensive and involves IO, so it runs on a worker
//! task and reports back through the command channel tagged with a
//! generation; a background transition bumps the generation and any late
//! completion is discarded. Teardown is synchronous from the caller's
//! point of view: it finishes before the next queued command is looked at,
//! because the engine handle holds the microphone and a leaked handle
//! would block re-initialization.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::bridge::{ColorResolver, Rgb};
use crate::dispatch::{ColorCommand, Dispatcher, Trigger};
use crate::engine::{EngineEvents, EngineLoader, InitError, Recognizer};
use crate::events::{EngineEvent, Hypothesis, StatusEvent};
use crate::search::{SearchRegistry, UnknownSearchError};

/// Lifecycle states of the recognition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No engine handle exists.
    Uninitialized,
    /// Resource sync and engine construction are in flight.
    Initializing,
    /// Engine constructed, no search armed.
    Ready,
    /// A search is armed and audio is being collected.
    Listening,
    /// Engine teardown in progress.
    Stopping,
    /// Terminal. No further transitions.
    Destroyed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Initializing => "Initializing",
            SessionState::Ready => "Ready",
            SessionState::Listening => "Listening",
            SessionState::Stopping => "Stopping",
            SessionState::Destroyed => "Destroyed",
        };
        write!(f, "{}", name)
    }
}

/// Session facts owned by the controller. Passed to collaborators as
/// snapshot values, never shared as mutable state.
#[derive(Debug)]
struct Session {
    state: SessionState,
    active_search: Option<String>,
    vad_gating: bool,
    in_foreground: bool,
}

/// Point-in-time view of the session for status queries.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub active_search: Option<String>,
    pub vad_gating: bool,
    pub in_foreground: bool,
}

/// Why a search switch was refused.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error(transparent)]
    UnknownSearch(#[from] UnknownSearchError),

    #[error("session is not ready to switch searches")]
    NotReady,

    #[error("failed to arm search: {0}")]
    Arm(String),

    #[error("session is shut down")]
    SessionClosed,
}

/// Inputs to the controller. Host requests, engine events, and init
/// completions all arrive here, one at a time, in order.
enum SessionCommand {
    EnterForeground,
    EnterBackground,
    SetVadGating(bool),
    SwitchSearch {
        name: String,
        reply: oneshot::Sender<Result<(), SwitchError>>,
    },
    TriggerManual {
        color: Option<Rgb>,
    },
    Query {
        reply: oneshot::Sender<SessionStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    /// Worker-task completion of an `EnterForeground` initialization.
    InitComplete {
        generation: u64,
        outcome: Result<(Box<dyn Recognizer>, EngineEvents), InitError>,
    },
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::EnterForeground => "enter_foreground",
            SessionCommand::EnterBackground => "enter_background",
            SessionCommand::SetVadGating(_) => "set_vad_gating",
            SessionCommand::SwitchSearch { .. } => "switch_search",
            SessionCommand::TriggerManual { .. } => "trigger_manual",
            SessionCommand::Query { .. } => "query",
            SessionCommand::Shutdown { .. } => "shutdown",
            SessionCommand::InitComplete { .. } => "init_complete",
        }
    }
}

/// Cloneable handle the host drives the session through.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn enter_foreground(&self) {
        let _ = self.tx.send(SessionCommand::EnterForeground).await;
    }

    pub async fn enter_background(&self) {
        let _ = self.tx.send(SessionCommand::EnterBackground).await;
    }

    pub async fn set_vad_gating(&self, enabled: bool) {
        let _ = self.tx.send(SessionCommand::SetVadGating(enabled)).await;
    }

    pub async fn switch_search(&self, name: impl Into<String>) -> Result<(), SwitchError> {
        let (reply, rx) = oneshot::channel();
        let cmd = SessionCommand::SwitchSearch {
            name: name.into(),
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            return Err(SwitchError::SessionClosed);
        }
        rx.await.unwrap_or(Err(SwitchError::SessionClosed))
    }

    /// Non-voice trigger entering the dispatcher path directly.
    pub async fn trigger_manual(&self, color: Option<Rgb>) {
        let _ = self.tx.send(SessionCommand::TriggerManual { color }).await;
    }

    pub async fn status(&self) -> Option<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SessionCommand::Query { reply }).await.is_err() {
            return None;
        }
        rx.await.ok()
    }

    /// Tear the session down to `Destroyed` and wait for it to finish.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SessionCommand::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// Construction parameters for the controller.
pub struct SessionOptions {
    /// Directory the engine loader syncs acoustic resources into.
    pub resource_dir: PathBuf,
    /// Search armed after initialization and re-armed after every
    /// terminal utterance event.
    pub default_search: String,
    /// Whether voice-activity edges themselves trigger a randomize
    /// command.
    pub vad_gating: bool,
}

/// The state machine that manages the recognition session.
pub struct SessionController {
    session: Session,
    options: SessionOptions,
    registry: SearchRegistry,
    loader: Arc<dyn EngineLoader>,
    dispatcher: Dispatcher,
    resolver: Arc<dyn ColorResolver>,
    /// Channel for emitting status events.
    status_tx: broadcast::Sender<StatusEvent>,
    command_tx: mpsc::Sender<SessionCommand>,
    command_rx: mpsc::Receiver<SessionCommand>,
    engine: Option<Box<dyn Recognizer>>,
    engine_rx: Option<EngineEvents>,
    /// Bumped on every background/shutdown; init completions carrying an
    /// older generation are discarded.
    init_generation: u64,
}

impl SessionController {
    pub fn new(
        options: SessionOptions,
        registry: SearchRegistry,
        loader: Arc<dyn EngineLoader>,
        dispatcher: Dispatcher,
        resolver: Arc<dyn ColorResolver>,
        status_tx: broadcast::Sender<StatusEvent>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let handle = SessionHandle {
            tx: command_tx.clone(),
        };

        let controller = Self {
            session: Session {
                state: SessionState::Uninitialized,
                active_search: None,
                vad_gating: options.vad_gating,
                in_foreground: false,
            },
            options,
            registry,
            loader,
            dispatcher,
            resolver,
            status_tx,
            command_tx,
            command_rx,
            engine: None,
            engine_rx: None,
            init_generation: 0,
        };

        (controller, handle)
    }

    /// Run the controller until shutdown, processing commands and engine
    /// events one at a time in arrival order.
    pub async fn run(mut self) {
        info!(state = %self.session.state, "session controller started");

        loop {
            tokio::select! {
                maybe_cmd = self.command_rx.recv() => {
                    let Some(cmd) = maybe_cmd else { break };
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                maybe_event = recv_engine(&mut self.engine_rx) => {
                    match maybe_event {
                        Some(event) => self.handle_engine_event(event).await,
                        None => {
                            debug!("engine event stream closed");
                            self.engine_rx = None;
                        }
                    }
                }
            }
        }

        info!("session controller stopped");
    }

    /// Returns true when the session reached `Destroyed`.
    async fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        debug!(command = cmd.name(), state = %self.session.state, "handling command");

        match cmd {
            SessionCommand::EnterForeground => self.enter_foreground(),
            SessionCommand::EnterBackground => self.enter_background().await,
            SessionCommand::SetVadGating(enabled) => {
                info!(enabled, "voice-activity gating changed");
                self.session.vad_gating = enabled;
            }
            SessionCommand::SwitchSearch { name, reply } => {
                let result = self.switch_search(&name).await;
                let _ = reply.send(result);
            }
            SessionCommand::TriggerManual { color } => {
                let command = match color {
                    Some(c) => ColorCommand::solid(c, Trigger::Manual),
                    None => ColorCommand::randomize(Trigger::Manual),
                };
                self.dispatch(command);
            }
            SessionCommand::Query { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::InitComplete {
                generation,
                outcome,
            } => self.finish_init(generation, outcome).await,
            SessionCommand::Shutdown { reply } => {
                self.destroy().await;
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    fn enter_foreground(&mut self) {
        self.session.in_foreground = true;

        match self.session.state {
            SessionState::Uninitialized => {
                self.transition(SessionState::Initializing);

                self.init_generation += 1;
                let generation = self.init_generation;
                let loader = Arc::clone(&self.loader);
                let resource_dir = self.options.resource_dir.clone();
                let searches = self.registry.configs();
                let command_tx = self.command_tx.clone();

                tokio::spawn(async move {
                    let outcome = loader.load(&resource_dir, &searches).await;
                    let completion = SessionCommand::InitComplete {
                        generation,
                        outcome,
                    };
                    if command_tx.send(completion).await.is_err() {
                        debug!("controller gone before init completion");
                    }
                });
            }
            SessionState::Initializing | SessionState::Ready | SessionState::Listening => {
                debug!(state = %self.session.state, "enter_foreground is a no-op");
            }
            SessionState::Stopping | SessionState::Destroyed => {
                warn!(state = %self.session.state, "enter_foreground ignored");
            }
        }
    }

    async fn enter_background(&mut self) {
        self.session.in_foreground = false;
        // Any in-flight initialization is now stale.
        self.init_generation += 1;

        match self.session.state {
            SessionState::Initializing => {
                info!("initialization canceled by background transition");
                self.transition(SessionState::Uninitialized);
            }
            SessionState::Ready | SessionState::Listening => {
                self.teardown().await;
            }
            SessionState::Uninitialized => {
                debug!("enter_background from Uninitialized is a no-op");
            }
            SessionState::Stopping | SessionState::Destroyed => {}
        }
    }

    async fn finish_init(
        &mut self,
        generation: u64,
        outcome: Result<(Box<dyn Recognizer>, EngineEvents), InitError>,
    ) {
        if generation != self.init_generation || self.session.state != SessionState::Initializing {
            // Canceled while the worker was loading; release the handle it
            // produced without touching session state.
            if let Ok((recognizer, _events)) = outcome {
                warn!(generation, "discarding recognizer from canceled initialization");
                recognizer.shutdown().await;
            }
            return;
        }

        match outcome {
            Ok((recognizer, events)) => {
                self.engine = Some(recognizer);
                self.engine_rx = Some(events);
                self.transition(SessionState::Ready);

                let default = self.options.default_search.clone();
                if let Err(err) = self.arm(&default).await {
                    error!(search = %default, %err, "failed to arm default search");
                    self.emit(StatusEvent::EngineError {
                        message: err.to_string(),
                    });
                }
            }
            Err(err) => {
                error!(%err, "recognizer initialization failed");
                self.emit(StatusEvent::InitFailed {
                    message: err.to_string(),
                });
                self.transition(SessionState::Uninitialized);
            }
        }
    }

    async fn switch_search(&mut self, name: &str) -> Result<(), SwitchError> {
        match self.session.state {
            SessionState::Ready | SessionState::Listening => {}
            _ => return Err(SwitchError::NotReady),
        }

        // Validate before touching the engine so a bad name leaves the
        // current search running untouched.
        self.registry.get(name)?;

        if self.session.state == SessionState::Listening {
            if let Some(engine) = self.engine.as_mut() {
                engine.stop().await;
            }
        }

        self.arm(name).await
    }

    /// Arm a registered search and enter `Listening`.
    async fn arm(&mut self, name: &str) -> Result<(), SwitchError> {
        self.registry.get(name)?;
        let engine = self.engine.as_mut().ok_or(SwitchError::NotReady)?;
        engine
            .arm(name)
            .await
            .map_err(|e| SwitchError::Arm(e.to_string()))?;

        self.session.active_search = Some(name.to_string());
        if self.session.state != SessionState::Listening {
            self.transition(SessionState::Listening);
        }
        debug!(search = name, "search armed");
        Ok(())
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        if self.session.state != SessionState::Listening {
            // A fatal error forces teardown no matter what; everything
            // else outside Listening is a stale event.
            if let EngineEvent::Fatal(message) = event {
                self.engine_failed(message).await;
            } else {
                debug!(state = %self.session.state, "engine event outside Listening ignored");
            }
            return;
        }

        match event {
            EngineEvent::Partial(h) => {
                debug!(text = %h.text, score = h.score, "partial hypothesis");
            }
            EngineEvent::Final(h) => self.finish_utterance(h).await,
            EngineEvent::VoiceActivityBegin => {
                debug!("voice activity began");
                if self.session.vad_gating {
                    self.dispatch(ColorCommand::randomize(Trigger::VoiceActivity));
                }
            }
            EngineEvent::VoiceActivityEnd => {
                debug!("voice activity ended");
                if self.session.vad_gating {
                    self.dispatch(ColorCommand::randomize(Trigger::VoiceActivity));
                }
                if let Some(engine) = self.engine.as_mut() {
                    engine.stop().await;
                }
                self.rearm_default().await;
            }
            EngineEvent::Timeout => {
                debug!("utterance timed out");
                self.rearm_default().await;
            }
            EngineEvent::Fatal(message) => self.engine_failed(message).await,
        }
    }

    async fn finish_utterance(&mut self, hypothesis: Hypothesis) {
        let text = hypothesis.text.trim().to_string();
        if !text.is_empty() {
            info!(text = %text, score = hypothesis.score, "final hypothesis");

            // Utterances end with the color word; resolve the trailing
            // token. An unmatched utterance stays silent.
            let color = text
                .split_whitespace()
                .last()
                .and_then(|token| self.resolver.resolve(token));

            match color {
                Some(color) => self.dispatch(ColorCommand::solid(color, Trigger::Voice)),
                None => debug!(text = %text, "no resolvable color token"),
            }
        }

        // Keep collecting with the search that produced the utterance.
        let search = self
            .session
            .active_search
            .clone()
            .unwrap_or_else(|| self.options.default_search.clone());
        self.rearm(&search).await;
    }

    async fn rearm_default(&mut self) {
        let default = self.options.default_search.clone();
        self.rearm(&default).await;
    }

    /// Re-arm after a terminal utterance event so the session is always
    /// either Listening or explicitly torn down, never silently stalled.
    async fn rearm(&mut self, name: &str) {
        if let Err(err) = self.arm(name).await {
            error!(search = name, %err, "failed to re-arm search");
            self.emit(StatusEvent::EngineError {
                message: err.to_string(),
            });
        }
    }

    async fn engine_failed(&mut self, message: String) {
        error!(message = %message, "engine fatal error");
        self.emit(StatusEvent::EngineError { message });
        self.teardown().await;
    }

    /// Synchronous teardown: the engine handle is released before this
    /// returns, so the next command never observes a half-dead engine.
    async fn teardown(&mut self) {
        self.transition(SessionState::Stopping);
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
        self.engine_rx = None;
        self.session.active_search = None;
        self.transition(SessionState::Uninitialized);
    }

    async fn destroy(&mut self) {
        self.init_generation += 1;
        if let Some(engine) = self.engine.take() {
            self.transition(SessionState::Stopping);
            engine.shutdown().await;
        }
        self.engine_rx = None;
        self.session.active_search = None;
        self.transition(SessionState::Destroyed);
    }

    fn dispatch(&mut self, command: ColorCommand) {
        let handle = self.dispatcher.dispatch(command);
        self.emit(StatusEvent::CommandDispatched {
            batch_id: handle.id,
            targets: handle.targets,
        });
    }

    fn snapshot(&self) -> SessionStatus {
        SessionStatus {
            state: self.session.state,
            active_search: self.session.active_search.clone(),
            vad_gating: self.session.vad_gating,
            in_foreground: self.session.in_foreground,
        }
    }

    /// Perform a state transition.
    fn transition(&mut self, new_state: SessionState) {
        let old_state = self.session.state;
        if old_state == new_state {
            return;
        }
        if old_state == SessionState::Destroyed {
            warn!(to = %new_state, "transition out of Destroyed refused");
            return;
        }

        info!(from = %old_state, to = %new_state, "state transition");
        self.session.state = new_state;
        self.emit(StatusEvent::StateChanged {
            from: old_state.to_string(),
            to: new_state.to_string(),
        });
    }

    fn emit(&self, event: StatusEvent) {
        debug!(?event, "emitting status event");
        let _ = self.status_tx.send(event);
    }
}

async fn recv_engine(rx: &mut Option<EngineEvents>) -> Option<EngineEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
