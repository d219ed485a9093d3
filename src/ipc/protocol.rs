//! IPC message protocol definitions.
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian
//! length. The host drives the session lifecycle through these requests;
//! the core never renders anything itself.

use serde::{Deserialize, Serialize};

use crate::events::StatusEvent;
use crate::session::SessionState;

/// Session lifecycle state as seen over IPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Listening,
    Stopping,
    Destroyed,
}

impl From<SessionState> for LifecycleState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Uninitialized => LifecycleState::Uninitialized,
            SessionState::Initializing => LifecycleState::Initializing,
            SessionState::Ready => LifecycleState::Ready,
            SessionState::Listening => LifecycleState::Listening,
            SessionState::Stopping => LifecycleState::Stopping,
            SessionState::Destroyed => LifecycleState::Destroyed,
        }
    }
}

/// Requests from the host to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity.
    Ping,

    /// Request current session status.
    GetStatus,

    /// The host became visible; bring the session up.
    EnterForeground,

    /// The host went invisible; tear the session down.
    EnterBackground,

    /// Enable or disable voice-activity gating.
    SetVadGating { enabled: bool },

    /// Arm a different named search.
    SwitchSearch { name: String },

    /// Non-voice color trigger. `color: None` randomizes every light.
    TriggerColor { color: Option<String> },

    /// Subscribe to pushed status events.
    Subscribe,
}

/// Responses from the daemon to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping.
    Pong,

    /// Current session status.
    Status(SessionSnapshot),

    /// Request accepted.
    Ack,

    /// Subscription confirmed.
    Subscribed,

    /// Error response.
    Error { code: String, message: String },
}

/// Push notification to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    StatusEvent(StatusEvent),
}

/// Full session status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Daemon version.
    pub version: String,

    /// Current lifecycle state.
    pub state: LifecycleState,

    /// Name of the armed search, if any.
    pub active_search: Option<String>,

    /// Whether voice-activity edges trigger randomize commands.
    pub vad_gating: bool,

    /// Whether the host reported itself foregrounded.
    pub in_foreground: bool,

    /// Uptime in seconds.
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SwitchSearch {
            name: "colors".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("switch_search"));
        assert!(json.contains("colors"));
    }

    #[test]
    fn test_trigger_color_roundtrip() {
        let json = r#"{"type":"trigger_color","color":null}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::TriggerColor { color: None }));

        let json = r#"{"type":"trigger_color","color":"red"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::TriggerColor { color: Some(c) } if c == "red"));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(SessionSnapshot {
            version: "0.1.0".to_string(),
            state: LifecycleState::Listening,
            active_search: Some("colors".to_string()),
            vad_gating: false,
            in_foreground: true,
            uptime_secs: 42,
        });
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("listening"));
    }

    #[test]
    fn test_lifecycle_state_from_session_state() {
        assert_eq!(
            LifecycleState::from(SessionState::Listening),
            LifecycleState::Listening
        );
        assert_eq!(
            LifecycleState::from(SessionState::Destroyed),
            LifecycleState::Destroyed
        );
    }
}
