//! Contract between the session controller and the recognition engine.
//!
//! Initialization is expensive and I/O-bound (resource sync plus decoder
//! construction), so the loader runs on a worker task and hands back the
//! engine handle asynchronously. The handle holds exclusive hardware
//! resources (the microphone); `shutdown` must complete before another
//! engine may be constructed.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::EngineEvent;
use crate::search::SearchConfig;

/// Stream of events produced by a running engine, in engine order.
pub type EngineEvents = mpsc::Receiver<EngineEvent>;

/// Resource sync or decoder construction failure.
///
/// Recoverable: the session stays down and the host may retry by entering
/// the foreground again.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to sync recognizer resources: {0}")]
    ResourceSync(String),

    #[error("failed to construct recognizer: {0}")]
    Construction(String),
}

/// Failure to arm a search the engine was configured with.
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    #[error("engine was not configured with search '{0}'")]
    UnknownSearch(String),

    #[error("decoder refused to start: {0}")]
    Decoder(String),
}

/// A constructed recognition engine.
///
/// Exclusively owned by the session controller; no other component may
/// start or stop it.
#[async_trait]
pub trait Recognizer: Send {
    /// Arm the named search and begin collecting audio.
    async fn arm(&mut self, search: &str) -> Result<(), ArmError>;

    /// Stop collecting audio for the current utterance. The final
    /// hypothesis, if any, follows on the event stream.
    async fn stop(&mut self);

    /// Release the decoder and the audio device.
    async fn shutdown(self: Box<Self>);
}

/// Constructs engines from synced resources.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    /// Sync resources under `resource_dir`, construct a decoder configured
    /// with the given searches, and return the handle plus its event
    /// stream.
    async fn load(
        &self,
        resource_dir: &Path,
        searches: &[SearchConfig],
    ) -> Result<(Box<dyn Recognizer>, EngineEvents), InitError>;
}
