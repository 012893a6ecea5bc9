//! IPC client: one request/response exchange with the daemon.
//!
//! This is the bare transport. It never retries: a daemon that is not
//! running, refuses the connection, or closes before answering is
//! reported to the caller as-is. Use [`crate::client::RelayClient`] for the
//! lock-guarded exchange the CLI performs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use super::codec::{self, ProtocolError};
use super::types::{RelayRequest, RelayResponse};

/// Errors from the IPC client.
#[derive(Debug, thiserror::Error)]
pub enum IpcClientError {
    #[error("failed to connect to daemon socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("daemon is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("daemon closed the connection without responding")]
    NoResponse,

    #[error("no response from daemon within {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for the relay daemon's Unix socket.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
    response_timeout: Option<Duration>,
}

impl IpcClient {
    /// Create a client targeting `socket_path`, with no response timeout.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            response_timeout: None,
        }
    }

    /// Bound how long [`send`](Self::send) waits for the daemon's reply.
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Check if the daemon socket exists (daemon is likely running).
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send `request` and wait for the daemon's single response.
    pub async fn send(&self, request: &RelayRequest) -> Result<RelayResponse, IpcClientError> {
        if !self.daemon_available() {
            return Err(IpcClientError::NotRunning(self.socket_path.clone()));
        }

        let mut stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| IpcClientError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;

        debug!(relay = %request.relay, action = %request.action, "IPC request");

        stream.write_all(&codec::encode(request)?).await?;
        stream.shutdown().await?;

        let exchange = async {
            let mut reply = Vec::new();
            stream.read_to_end(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        };
        let reply = match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| IpcClientError::Timeout(limit))??,
            None => exchange.await?,
        };

        if reply.iter().all(u8::is_ascii_whitespace) {
            return Err(IpcClientError::NoResponse);
        }
        Ok(codec::decode_reply(request, &reply)?)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::UnixListener;

    use super::*;
    use crate::ipc::types::{Action, RelayStatus};

    #[tokio::test]
    async fn test_client_not_running() {
        let client = IpcClient::new("/tmp/relayctl-test-nonexistent.sock");
        assert!(!client.daemon_available());
        let result = client.send(&RelayRequest::new("mag", Action::Status, "t")).await;
        assert!(matches!(result, Err(IpcClientError::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_client_reads_single_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let daemon = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            stream.read_to_end(&mut request).await.unwrap();
            assert!(request.ends_with(b"\n"));
            stream
                .write_all(b"{\"relay\":\"mag\",\"status\":\"on\"}\n")
                .await
                .unwrap();
        });

        let client = IpcClient::new(&path);
        let response = client
            .send(&RelayRequest::new("mag", Action::On, "t"))
            .await
            .unwrap();
        assert_eq!(
            response,
            RelayResponse::Single {
                relay: "mag".to_string(),
                status: RelayStatus::On,
            }
        );
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_reports_missing_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mute.sock");
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let result = IpcClient::new(&path)
            .send(&RelayRequest::new("mag", Action::Status, "t"))
            .await;
        assert!(matches!(
            result,
            Err(IpcClientError::NoResponse | IpcClientError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_client_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stalled.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let stall = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let result = IpcClient::new(&path)
            .with_response_timeout(Some(Duration::from_millis(50)))
            .send(&RelayRequest::new("mag", Action::Status, "t"))
            .await;
        assert!(matches!(result, Err(IpcClientError::Timeout(_))));
        stall.abort();
    }
}
