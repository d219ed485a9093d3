//! Event types flowing between the recognizer, the session controller,
//! and the host.
//!
//! The engine's callback-listener surface is re-architected here as plain
//! event values delivered through a single serialized channel, so the
//! controller sees one event at a time in arrival order.

use serde::{Deserialize, Serialize};

/// A recognition hypothesis produced by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Recognized text, possibly empty.
    pub text: String,
    /// Engine confidence score for the hypothesis.
    pub score: f32,
    /// Whether this is the final hypothesis for the utterance.
    pub is_final: bool,
}

impl Hypothesis {
    pub fn final_text(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
            is_final: true,
        }
    }
}

/// Events emitted by the recognition engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Quick mid-utterance update about the current hypothesis.
    Partial(Hypothesis),
    /// Final hypothesis after the engine stopped collecting the utterance.
    Final(Hypothesis),
    /// The engine detected the start of speech.
    VoiceActivityBegin,
    /// The engine detected the end of speech.
    VoiceActivityEnd,
    /// No utterance was produced within the engine's window.
    Timeout,
    /// Unrecoverable engine failure; the session must tear down.
    Fatal(String),
}

/// Status events broadcast by the session controller.
///
/// Pushed to subscribed IPC clients; the host renders notifications, the
/// core only makes the values available.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// The session moved between lifecycle states.
    StateChanged { from: String, to: String },

    /// Recognizer initialization failed; the session stayed down.
    InitFailed { message: String },

    /// The engine failed mid-session and was torn down.
    EngineError { message: String },

    /// A color command was handed to the dispatcher.
    CommandDispatched { batch_id: u64, targets: usize },
}

impl std::fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusEvent::StateChanged { from, to } => {
                write!(f, "STATE_CHANGED ({} -> {})", from, to)
            }
            StatusEvent::InitFailed { message } => write!(f, "INIT_FAILED ({})", message),
            StatusEvent::EngineError { message } => write!(f, "ENGINE_ERROR ({})", message),
            StatusEvent::CommandDispatched { batch_id, targets } => {
                write!(f, "COMMAND_DISPATCHED (batch {} -> {} lights)", batch_id, targets)
            }
        }
    }
}
