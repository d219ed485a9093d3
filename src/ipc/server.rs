//! Unix domain socket server for host control.
//!
//! Provides request-response communication and push notifications for
//! session status events to subscribed clients. Requests are forwarded to
//! the session controller through its handle; the server holds no session
//! state of its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::ColorResolver;
use crate::events::StatusEvent;
use crate::session::{SessionHandle, SwitchError};

use super::protocol::{Notification, Request, Response, SessionSnapshot};

/// Everything a client handler needs, shared across connections.
struct ServerContext {
    session: SessionHandle,
    resolver: Arc<dyn ColorResolver>,
    status_tx: broadcast::Sender<StatusEvent>,
    start_time: Instant,
}

/// IPC Server handling client connections.
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    ctx: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server bound to `socket_path`.
    pub fn new(
        socket_path: &Path,
        session: SessionHandle,
        resolver: Arc<dyn ColorResolver>,
        status_tx: broadcast::Sender<StatusEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            ctx: Arc::new(ServerContext {
                session,
                resolver,
                status_tx,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = Arc::clone(&self.ctx);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, ctx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection.
    ///
    /// Reads length-prefixed requests; all outbound frames (responses and
    /// pushed notifications) go through one writer task so they never
    /// interleave mid-frame.
    async fn handle_client(stream: UnixStream, ctx: Arc<ServerContext>) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(32);
        let writer_task = tokio::spawn(write_frames(writer, out_rx));
        let mut push_task: Option<JoinHandle<()>> = None;

        let result = async {
            let mut len_buf = [0u8; 4];

            loop {
                // Read message length (4-byte little-endian)
                match reader.read_exact(&mut len_buf).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        debug!("client disconnected");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }

                let len = u32::from_le_bytes(len_buf) as usize;
                if len > 1024 * 1024 {
                    warn!(len, "message too large, disconnecting");
                    return Ok(());
                }

                // Read message body
                let mut msg_buf = vec![0u8; len];
                reader.read_exact(&mut msg_buf).await?;

                // Parse request
                let request: Request =
                    serde_json::from_slice(&msg_buf).context("failed to parse request")?;

                debug!(?request, "received request");

                let (response, subscribe) = Self::process_request(request, &ctx).await;
                out_tx.send(encode_frame(&response)?).await.ok();

                if subscribe && push_task.is_none() {
                    debug!("client subscribed to notifications");
                    push_task = Some(spawn_push_task(ctx.status_tx.subscribe(), out_tx.clone()));
                }
            }
        }
        .await;

        if let Some(task) = push_task {
            task.abort();
        }
        drop(out_tx);
        let _ = writer_task.await;

        result
    }

    /// Process a request and return a response.
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, ctx: &ServerContext) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => match ctx.session.status().await {
                Some(status) => {
                    let snapshot = SessionSnapshot {
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        state: status.state.into(),
                        active_search: status.active_search,
                        vad_gating: status.vad_gating,
                        in_foreground: status.in_foreground,
                        uptime_secs: ctx.start_time.elapsed().as_secs(),
                    };
                    (Response::Status(snapshot), false)
                }
                None => (error_response("session_closed", "session is shut down"), false),
            },

            Request::EnterForeground => {
                ctx.session.enter_foreground().await;
                (Response::Ack, false)
            }

            Request::EnterBackground => {
                ctx.session.enter_background().await;
                (Response::Ack, false)
            }

            Request::SetVadGating { enabled } => {
                ctx.session.set_vad_gating(enabled).await;
                (Response::Ack, false)
            }

            Request::SwitchSearch { name } => match ctx.session.switch_search(name).await {
                Ok(()) => (Response::Ack, false),
                Err(err) => (error_response(switch_error_code(&err), &err.to_string()), false),
            },

            Request::TriggerColor { color: None } => {
                ctx.session.trigger_manual(None).await;
                (Response::Ack, false)
            }

            Request::TriggerColor { color: Some(token) } => match ctx.resolver.resolve(&token) {
                Some(rgb) => {
                    ctx.session.trigger_manual(Some(rgb)).await;
                    (Response::Ack, false)
                }
                None => (
                    error_response("unknown_color", &format!("'{}' is not a known color", token)),
                    false,
                ),
            },

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn error_response(code: &str, message: &str) -> Response {
    Response::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}

fn switch_error_code(err: &SwitchError) -> &'static str {
    match err {
        SwitchError::UnknownSearch(_) => "unknown_search",
        SwitchError::NotReady => "not_ready",
        SwitchError::Arm(_) => "arm_failed",
        SwitchError::SessionClosed => "session_closed",
    }
}

/// Encode a length-prefixed JSON frame.
fn encode_frame<T: serde::Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

async fn write_frames(mut writer: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = out_rx.recv().await {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
}

fn spawn_push_task(
    mut status_rx: broadcast::Receiver<StatusEvent>,
    out_tx: mpsc::Sender<Vec<u8>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => {
                    let frame = match encode_frame(&Notification::StatusEvent(event)) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(?e, "failed to encode notification");
                            continue;
                        }
                    };
                    if out_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "status event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
