//! Session lifecycle state machine.
//!
//! One controller instance owns the recognition session: the engine
//! handle, the search registry, and the session flags. All inputs (host
//! requests, engine events, init completions) funnel through a single
//! command channel, so exactly one transition is in flight at a time.

mod controller;

pub use controller::{
    SessionController, SessionHandle, SessionOptions, SessionState, SessionStatus, SwitchError,
};
