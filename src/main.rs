//! voxlight-daemon: Background daemon for voice-controlled lighting
//!
//! The daemon keeps a continuously-listening recognition session alive and
//! fans recognized color commands out to every reachable light fixture:
//! - Explicit state machine for the session lifecycle
//! - Named-search registry for decoder reconfiguration
//! - Per-fixture dispatch batches with acknowledgement tracking
//! - IPC server for host lifecycle and manual triggers
//!
//! The decoder and the light bridge are external; the default wiring runs
//! the stub engine and the loopback bridge so the daemon is drivable end
//! to end without either.

mod bridge;
mod config;
mod dispatch;
mod engine;
mod events;
mod ipc;
mod lifecycle;
mod search;
mod session;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bridge::{ActuatorBridge, ColorResolver, LoopbackBridge, NamedPalette};
use crate::config::{Config, DEFAULT_SEARCH};
use crate::dispatch::Dispatcher;
use crate::engine::{EngineLoader, StubLoader};
use crate::events::StatusEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::search::SearchRegistry;
use crate::session::{SessionController, SessionOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voxlight-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.resource_dir, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Channel for broadcasting session status events
    let (status_tx, _status_rx) = broadcast::channel::<StatusEvent>(64);

    // Register the searches available for the session's lifetime
    let mut registry = SearchRegistry::new();
    for search in config.searches() {
        registry.register(search);
    }

    // External collaborators: stub engine and loopback bridge stand in
    // for the native decoder and a paired light bridge
    let resolver: Arc<dyn ColorResolver> = Arc::new(NamedPalette);
    let bridge: Arc<dyn ActuatorBridge> = Arc::new(LoopbackBridge::with_default_lights());
    let loader: Arc<dyn EngineLoader> = Arc::new(StubLoader::new());

    let dispatcher = Dispatcher::new(Arc::clone(&bridge), config.dispatch_timeout);

    // Create the session controller
    let options = SessionOptions {
        resource_dir: config.resource_dir.clone(),
        default_search: DEFAULT_SEARCH.to_string(),
        vad_gating: config.vad_gating,
    };
    let (controller, session) = SessionController::new(
        options,
        registry,
        loader,
        dispatcher,
        Arc::clone(&resolver),
        status_tx.clone(),
    );
    let controller_task = tokio::spawn(controller.run());

    // Create IPC server forwarding host requests to the session
    let server = Server::new(
        &config.socket_path,
        session.clone(),
        resolver,
        status_tx.clone(),
    )?;

    // A daemon start counts as entering the foreground; the host can
    // background the session over IPC at any time.
    session.enter_foreground().await;

    // Log status events as they happen
    let mut log_rx = status_tx.subscribe();
    let log_task = tokio::spawn(async move {
        loop {
            match log_rx.recv().await {
                Ok(event) => info!(%event, "status event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "status event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup: destroy the session first so the engine handle is released
    // before the process exits
    info!("shutting down...");

    session.shutdown().await;
    if let Err(e) = controller_task.await {
        error!(?e, "session controller task failed");
    }
    server.shutdown().await;
    log_task.abort();

    info!("voxlight-daemon stopped");

    Ok(())
}
