//! Recognition engine adapter.
//!
//! The decoder itself is an external black box; this module defines the
//! contract the session controller drives it through, plus the stub engine
//! used by the default wiring.

mod adapter;
mod stub;

pub use adapter::{ArmError, EngineEvents, EngineLoader, InitError, Recognizer};
pub use stub::StubLoader;
