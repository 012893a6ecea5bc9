//! Lock-guarded relay client.
//!
//! [`RelayClient::send`] takes the client lock, performs one exchange with
//! the daemon, and releases the lock, whether the exchange succeeded or not.

use std::path::PathBuf;

use relayctl_config::AppConfig;

use crate::ipc::server::socket_path_from_config;
use crate::ipc::{Action, IpcClient, IpcClientError, RelayRequest, RelayResponse};
use crate::lock::{ClientLock, LockError};

/// Errors from a client exchange.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("lock acquisition failed: {0}")]
    Lock(#[from] LockError),

    #[error("transport failure: {0}")]
    Transport(#[from] IpcClientError),
}

impl ClientError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            ClientError::Lock(_) => 3,
            ClientError::Transport(_) => 4,
        }
    }
}

/// Sends relay commands to the daemon, one at a time across processes.
#[derive(Debug, Clone)]
pub struct RelayClient {
    ipc: IpcClient,
    lock_path: PathBuf,
    requester: String,
}

impl RelayClient {
    pub fn new(ipc: IpcClient, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            ipc,
            lock_path: lock_path.into(),
            requester: current_user(),
        }
    }

    /// Build a client from the `[daemon]` and `[client]` config sections.
    pub fn from_config(config: &AppConfig) -> Self {
        let ipc = IpcClient::new(socket_path_from_config(config))
            .with_response_timeout(config.client.response_timeout());
        Self::new(ipc, &config.client.lock_path)
    }

    /// Override the requester recorded in the daemon's log.
    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = requester.into();
        self
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// Send one command while holding the client lock.
    ///
    /// Relay names are not checked here; the daemon's registry decides.
    pub async fn send(&self, relay: &str, action: Action) -> Result<RelayResponse, ClientError> {
        let request = RelayRequest::new(relay, action, self.requester.as_str());

        let lock_path = self.lock_path.clone();
        let _lock = tokio::task::spawn_blocking(move || ClientLock::acquire(&lock_path))
            .await
            .map_err(|e| LockError::Acquire {
                path: self.lock_path.clone(),
                source: std::io::Error::other(e),
            })??;

        Ok(self.ipc.send(&request).await?)
    }
}

/// The invoking OS user, for the audit-only `requester` field.
pub fn current_user() -> String {
    ["USER", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}
