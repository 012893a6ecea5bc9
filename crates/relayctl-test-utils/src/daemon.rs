//! Daemon test helpers.
//!
//! [`TestDaemon`] runs a real [`Daemon`] in-process on a socket inside an
//! owned temp directory, driving [`FlakyHardware`] so tests can inspect pin
//! levels and inject faults.

use std::path::PathBuf;
use std::time::Duration;

use relayctl_config::AppConfig;
use relayctl_core::daemon::{DaemonError, DaemonState, ShutdownHandle};
use relayctl_core::ipc::{Action, RelayResponse};
use relayctl_core::{Daemon, RelayClient};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::config::TestConfigBuilder;
use crate::hardware::FlakyHardware;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running in-process daemon with an owned temp directory.
///
/// The temp directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct TestDaemon {
    pub config: AppConfig,
    pub hardware: FlakyHardware,
    shutdown: ShutdownHandle,
    task: Option<JoinHandle<Result<(), DaemonError>>>,
    temp_dir: TempDir,
}

impl TestDaemon {
    /// Start a daemon with the default relay table on fresh hardware.
    pub async fn start() -> Self {
        Self::start_with(TestConfigBuilder::new(), FlakyHardware::new()).await
    }

    /// Start a daemon from `builder` on `hardware`. Socket and lock paths
    /// are placed in the temp directory.
    pub async fn start_with(builder: TestConfigBuilder, hardware: FlakyHardware) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = builder
            .socket_path(temp_dir.path().join("relay.sock"))
            .lock_path(temp_dir.path().join("client.lock"))
            .build();

        let daemon = Daemon::new(config.clone());
        let shutdown = daemon.shutdown_handle();
        let mut state = daemon.state();

        let backend = Box::new(hardware.clone());
        let task = tokio::spawn(async move { daemon.run_with_hardware(backend).await });

        let reached = tokio::time::timeout(
            STARTUP_TIMEOUT,
            state.wait_for(|s| matches!(s, DaemonState::Listening | DaemonState::Stopped)),
        )
        .await
        .expect("daemon did not start in time")
        .map(|s| *s)
        .expect("daemon state channel closed");

        if reached == DaemonState::Stopped {
            let outcome = task.await.expect("daemon task panicked");
            panic!("daemon failed to start: {outcome:?}");
        }

        Self {
            config,
            hardware,
            shutdown,
            task: Some(task),
            temp_dir,
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.temp_dir.path().join("relay.sock")
    }

    /// A client wired to this daemon's socket and lock file.
    pub fn client(&self) -> RelayClient {
        RelayClient::from_config(&self.config).with_requester("test")
    }

    /// Send one command and return the daemon's response.
    pub async fn send(&self, relay: &str, action: Action) -> RelayResponse {
        self.client()
            .send(relay, action)
            .await
            .expect("client exchange failed")
    }

    /// Pin wired to `relay` in this daemon's relay table.
    pub fn pin(&self, relay: &str) -> u8 {
        self.config
            .relay(relay)
            .unwrap_or_else(|| panic!("no relay named {relay:?}"))
            .pin
    }

    /// Whether `relay` is energized on the board right now.
    pub fn energized(&self, relay: &str) -> bool {
        self.hardware.board().energized(self.pin(relay))
    }

    /// Request shutdown and wait for the daemon to exit.
    pub async fn stop(mut self) -> Result<(), DaemonError> {
        self.shutdown.shutdown();
        match self.task.take() {
            Some(task) => task.await.expect("daemon task panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.shutdown.shutdown();
        }
    }
}
