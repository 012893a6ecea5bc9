//! IPC server: accepts client connections on the relay socket.
//!
//! Connections are accepted concurrently, each in its own task. Every
//! request then queues on the shared [`Dispatcher`] mutex, which is held on
//! tokio's blocking pool for the duration of that request's hardware
//! operations, so hardware access is never interleaved.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use relayctl_config::AppConfig;

use super::codec::{self, MAX_FRAME_LEN, ProtocolError};
use super::types::{RelayRequest, RelayResponse};
use crate::daemon::ShutdownSignal;
use crate::dispatch::Dispatcher;

/// Default Unix socket path for the relay daemon.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/relayctl.sock";

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long a client may take to deliver its request.
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// The dispatcher as shared between connection tasks.
pub type SharedDispatcher = Arc<Mutex<Dispatcher>>;

/// A bound relay socket, ready to serve.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Bind the socket at `socket_path` and apply `mode` to it.
    ///
    /// A stale socket file left behind by a previous daemon is removed
    /// first.
    pub fn bind(socket_path: &Path, mode: u32) -> std::io::Result<Self> {
        if socket_path.exists() {
            debug!(path = %socket_path.display(), "removing stale socket");
            std::fs::remove_file(socket_path)?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let listener = UnixListener::bind(socket_path)?;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(mode))?;
        info!(path = %socket_path.display(), mode = %format!("{mode:o}"), "IPC server listening");

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve connections until a shutdown signal arrives.
    ///
    /// On shutdown the listener is closed and connections still waiting for
    /// their request are dropped. Requests already dispatched finish their
    /// response, then the socket file is removed.
    pub async fn serve(
        self,
        dispatcher: SharedDispatcher,
        mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    ) -> std::io::Result<()> {
        let Self {
            listener,
            socket_path,
        } = self;
        let mut connections = JoinSet::new();
        let (closing_tx, closing_rx) = watch::channel(false);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("IPC server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let closing = closing_rx.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, dispatcher, closing).await {
                                debug!(error = %e, "connection ended with an error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "connection task panicked");
                    }
                }
            }
        }

        drop(listener);
        closing_tx.send_replace(true);
        if !connections.is_empty() {
            info!(in_flight = connections.len(), "waiting for in-flight connections");
        }
        while connections.join_next().await.is_some() {}

        std::fs::remove_file(&socket_path).ok();
        info!(path = %socket_path.display(), "socket removed");
        Ok(())
    }
}

/// Read one request, dispatch it, write one response, close.
///
/// Reading is abandoned when `closing` flips to `true` or the client takes
/// longer than [`REQUEST_READ_TIMEOUT`]. Once a request is dispatched it
/// always runs to its response.
async fn handle_connection(
    mut stream: UnixStream,
    dispatcher: SharedDispatcher,
    mut closing: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let read = tokio::select! {
        read = tokio::time::timeout(
            REQUEST_READ_TIMEOUT,
            codec::read_frame(&mut stream, MAX_FRAME_LEN),
        ) => read,
        () = closed(&mut closing) => {
            debug!("dropping connection that had not sent a request before shutdown");
            return Ok(());
        }
    };
    let Ok(read) = read else {
        warn!(timeout = ?REQUEST_READ_TIMEOUT, "client did not send a request in time");
        return Ok(());
    };

    let response = match read {
        Ok(frame) => match codec::decode_request(&frame) {
            Ok(request) => dispatch(dispatcher, request).await,
            Err(e) => {
                warn!(error = %e, "rejecting malformed request");
                RelayResponse::error(e.to_string())
            }
        },
        Err(ProtocolError::Empty) => {
            debug!("client disconnected without sending a request");
            return Ok(());
        }
        Err(ProtocolError::Io(e)) => return Err(e),
        Err(e) => {
            warn!(error = %e, "rejecting request");
            RelayResponse::error(e.to_string())
        }
    };

    let bytes = codec::encode(&response).map_err(std::io::Error::other)?;
    stream.write_all(&bytes).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn closed(closing: &mut watch::Receiver<bool>) {
    let _ = closing.wait_for(|closing| *closing).await;
}

/// Run `request` on the blocking pool while holding the dispatcher lock.
async fn dispatch(dispatcher: SharedDispatcher, request: RelayRequest) -> RelayResponse {
    let outcome = tokio::task::spawn_blocking(move || {
        // A panic mid-request leaves nothing half-updated in the dispatcher;
        // pin state lives in the hardware.
        let mut dispatcher = dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        dispatcher.handle(&request)
    })
    .await;

    match outcome {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "dispatch task failed");
            RelayResponse::error("internal error while executing request")
        }
    }
}

/// Resolve the socket path from config.
pub fn socket_path_from_config(config: &AppConfig) -> PathBuf {
    if config.daemon.socket_path.is_empty() {
        PathBuf::from(DEFAULT_SOCKET_PATH)
    } else {
        PathBuf::from(&config.daemon.socket_path)
    }
}
