//! Stub engine for the default wiring.
//!
//! Stands in for the native decoder: validates the resource directory,
//! accepts arm/stop calls, and emits no events. Lets the daemon run end to
//! end (lifecycle, IPC, dispatch) without an acoustic model on disk.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::adapter::{ArmError, EngineEvents, EngineLoader, InitError, Recognizer};
use crate::events::EngineEvent;
use crate::search::SearchConfig;

pub struct StubLoader;

impl StubLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineLoader for StubLoader {
    async fn load(
        &self,
        resource_dir: &Path,
        searches: &[SearchConfig],
    ) -> Result<(Box<dyn Recognizer>, EngineEvents), InitError> {
        tokio::fs::metadata(resource_dir)
            .await
            .map_err(|e| InitError::ResourceSync(format!("{}: {}", resource_dir.display(), e)))?;

        let names: Vec<String> = searches.iter().map(|s| s.name.clone()).collect();
        info!(?names, "stub recognizer constructed");

        // The sender lives inside the recognizer so the stream stays open
        // for the engine's lifetime, even though nothing is ever emitted.
        let (event_tx, event_rx) = mpsc::channel(32);

        let recognizer = StubRecognizer {
            searches: names,
            armed: None,
            _event_tx: event_tx,
        };

        Ok((Box::new(recognizer), event_rx))
    }
}

struct StubRecognizer {
    searches: Vec<String>,
    armed: Option<String>,
    _event_tx: mpsc::Sender<EngineEvent>,
}

#[async_trait]
impl Recognizer for StubRecognizer {
    async fn arm(&mut self, search: &str) -> Result<(), ArmError> {
        if !self.searches.iter().any(|s| s == search) {
            return Err(ArmError::UnknownSearch(search.to_string()));
        }
        debug!(search, "stub recognizer armed");
        self.armed = Some(search.to_string());
        Ok(())
    }

    async fn stop(&mut self) {
        debug!(armed = ?self.armed, "stub recognizer stopped");
    }

    async fn shutdown(self: Box<Self>) {
        debug!("stub recognizer shut down");
    }
}
