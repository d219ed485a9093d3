//! Command dispatch to the light set.
//!
//! One logical color command fans out to every reachable fixture as
//! independent update tasks. Outcomes are tracked per fixture in a batch;
//! nothing blocks on slow or unresponsive lights.

mod batch;
mod dispatcher;

pub use batch::{ActuatorOutcome, ActuatorResult, ColorCommand, DispatchBatch, Trigger};
pub use dispatcher::{BatchHandle, Dispatcher};
