//! IPC module for host control of the session.

mod protocol;
mod server;

pub use protocol::{LifecycleState, Notification, Request, Response, SessionSnapshot};
pub use server::Server;
