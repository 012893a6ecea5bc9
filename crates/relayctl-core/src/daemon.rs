//! Relay daemon lifecycle: startup, serving, and shutdown.
//!
//! ```text
//! Starting ──▶ Listening ──▶ ShuttingDown ──▶ Stopped
//!    │
//!    └── any startup failure: Stopped, error returned
//! ```
//!
//! Startup opens the hardware, builds the relay registry, configures every
//! relay pin as an output, and binds the socket. A failure at any of these
//! steps is fatal and nothing is served.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use relayctl_config::{AppConfig, ConfigError};

use crate::dispatch::Dispatcher;
use crate::hardware::{self, BackendPreference, HardwareError, RelayHardware};
use crate::ipc::IpcServer;
use crate::ipc::server::socket_path_from_config;
use crate::registry::{RegistryError, RelayRegistry};
use crate::retry::{RetryError, RetryPolicy};

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// Where the daemon is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Cloneable handle that asks a running daemon to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<ShutdownSignal>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(ShutdownSignal);
    }
}

/// The relay control daemon.
pub struct Daemon {
    config: AppConfig,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    _shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    state_tx: watch::Sender<DaemonState>,
}

impl Daemon {
    /// Create a new daemon instance with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        let (state_tx, _) = watch::channel(DaemonState::Starting);

        Self {
            config,
            shutdown_tx,
            _shutdown_rx,
            state_tx,
        }
    }

    /// Open the configured hardware backend and serve until stopped.
    pub async fn run(&self) -> Result<(), DaemonError> {
        match self.open_hardware().await {
            Ok(hardware) => self.run_with_hardware(hardware).await,
            Err(e) => {
                self.state_tx.send_replace(DaemonState::Stopped);
                error!(error = %e, "Daemon failed to start");
                Err(e)
            }
        }
    }

    async fn open_hardware(&self) -> Result<Box<dyn RelayHardware>, DaemonError> {
        self.config.validate()?;
        let preference: BackendPreference =
            self.config.daemon.backend.parse().map_err(DaemonError::Startup)?;
        let retry = RetryPolicy::from_config(&self.config.retry);
        let daemon_config = self.config.daemon.clone();

        let hardware = tokio::task::spawn_blocking(move || {
            hardware::open_backend(preference, &daemon_config, &retry)
        })
        .await
        .map_err(|e| DaemonError::Startup(format!("hardware initialization panicked: {e}")))??;
        Ok(hardware)
    }

    /// Serve with an already-opened hardware backend.
    pub async fn run_with_hardware(
        &self,
        hardware: Box<dyn RelayHardware>,
    ) -> Result<(), DaemonError> {
        // Stop requests are observed from here on, including during startup.
        let shutdown_rx = self.shutdown_tx.subscribe();
        let signals = StopSignals::install()
            .inspect_err(|e| error!(error = %e, "Failed to install signal handlers"))
            .ok();
        let supervisor = tokio::spawn(supervise(
            self.shutdown_tx.clone(),
            self.shutdown_tx.subscribe(),
            self.state_tx.clone(),
            signals,
        ));

        let result = self.serve(hardware, shutdown_rx).await;
        supervisor.abort();
        self.state_tx.send_replace(DaemonState::Stopped);
        if let Err(e) = &result {
            error!(error = %e, "Daemon exited with an error");
        } else {
            info!("Daemon stopped");
        }
        result
    }

    async fn serve(
        &self,
        hardware: Box<dyn RelayHardware>,
        shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    ) -> Result<(), DaemonError> {
        let socket_path = socket_path_from_config(&self.config);

        info!(
            version = crate::VERSION,
            backend = hardware.name(),
            bus_device = %self.config.daemon.bus_device,
            bus_address = %format!("{:#04x}", self.config.daemon.bus_address),
            socket = %socket_path.display(),
            relays = self.config.relays.len(),
            "relayctl daemon starting"
        );

        let registry = RelayRegistry::from_config(&self.config.relays)?;
        let retry = RetryPolicy::from_config(&self.config.retry);
        let mut dispatcher = Dispatcher::new(hardware, registry, retry);

        let dispatcher = tokio::task::spawn_blocking(move || {
            dispatcher.configure_outputs().map(|()| dispatcher)
        })
        .await
        .map_err(|e| DaemonError::Startup(format!("pin configuration panicked: {e}")))??;

        let server = IpcServer::bind(&socket_path, self.config.daemon.socket_mode).map_err(
            |source| DaemonError::Bind {
                path: socket_path.clone(),
                source,
            },
        )?;
        self.state_tx.send_replace(DaemonState::Listening);

        server
            .serve(Arc::new(Mutex::new(dispatcher)), shutdown_rx)
            .await?;
        Ok(())
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// A handle that can stop the daemon from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Watch the daemon's lifecycle state.
    pub fn state(&self) -> watch::Receiver<DaemonState> {
        self.state_tx.subscribe()
    }

    /// Get a reference to the daemon's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// SIGTERM and SIGINT streams, registered as soon as they are created.
struct StopSignals {
    terminate: Signal,
    interrupt: Signal,
}

impl StopSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
        }
    }
}

/// Turn a stop signal into a shutdown request and track the
/// `ShuttingDown` transition.
async fn supervise(
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    state_tx: watch::Sender<DaemonState>,
    mut signals: Option<StopSignals>,
) {
    let stop_signal = async {
        match signals.as_mut() {
            Some(signals) => signals.recv().await,
            None => std::future::pending().await,
        }
    };

    let signalled = tokio::select! {
        _ = shutdown_rx.recv() => None,
        name = stop_signal => Some(name),
    };

    match signalled {
        Some(name) => {
            warn!(signal = name, "Stop signal received, initiating graceful shutdown");
            let _ = shutdown_tx.send(ShutdownSignal);
        }
        None => info!("Shutdown requested"),
    }
    state_tx.send_if_modified(|state| {
        if *state == DaemonState::Stopped {
            return false;
        }
        *state = DaemonState::ShuttingDown;
        true
    });
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon startup failed: {0}")]
    Startup(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid relay table: {0}")]
    Registry(#[from] RegistryError),

    #[error("hardware initialization failed: {0}")]
    Hardware(#[from] RetryError<HardwareError>),

    #[error("failed to bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
