#![deny(unsafe_code)]

//! relayctl CLI: runs the relay daemon and sends it commands.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use relayctl_config::{AppConfig, ConfigError, RelayConfig};
use relayctl_core::ipc::{Action, RelayResponse};
use relayctl_core::{ClientError, Daemon, RelayClient};

/// The daemon answered with `{"error": ...}`.
const EXIT_DAEMON_ERROR: u8 = 1;
/// Configuration could not be loaded or failed validation.
const EXIT_CONFIG: u8 = 5;

/// relayctl: irrigation relay control over an MCP23017 expander.
#[derive(Parser)]
#[command(name = "relayctl", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "relayctl.toml", global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay daemon in the foreground.
    Daemon {
        /// Hardware backend: mcp23017 or simulated.
        #[arg(long)]
        backend: Option<String>,

        /// I2C address of the expander (e.g. 0x27).
        #[arg(long, value_parser = parse_bus_address)]
        bus_address: Option<u16>,

        /// Socket path to listen on.
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Send one command to the daemon and print its response.
    Send {
        /// Relay name, or "all".
        #[arg(short, long)]
        relay: String,

        /// What to do with the relay.
        #[arg(short, long, value_enum)]
        action: ActionArg,

        /// Socket path of the daemon.
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Cycle every relay on and then off, one relay at a time.
    Test {
        /// Passes over the relay table.
        #[arg(long, default_value_t = 3)]
        count: u32,

        /// Seconds each relay stays on.
        #[arg(long, value_parser = parse_seconds, default_value = "1")]
        on_secs: Duration,

        /// Seconds to pause after switching a relay off.
        #[arg(long, value_parser = parse_seconds, default_value = "0.1")]
        off_secs: Duration,

        /// Socket path of the daemon.
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// List the configured relays.
    Relays,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    On,
    Off,
    Status,
}

impl From<ActionArg> for Action {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::On => Action::On,
            ActionArg::Off => Action::Off,
            ActionArg::Status => Action::Status,
        }
    }
}

fn parse_bus_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid bus address {s:?}: {e}"))
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("invalid seconds {s:?}: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid seconds {s:?}: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> u8 {
    if let Some(client) = error.downcast_ref::<ClientError>() {
        client.exit_code()
    } else if error.downcast_ref::<ConfigError>().is_some() {
        EXIT_CONFIG
    } else {
        1
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(&cli.config).await?;

    // An already-installed subscriber is kept.
    let _ = relayctl_core::logging::init(&config.logging, cli.verbose);

    match cli.command {
        Commands::Daemon {
            backend,
            bus_address,
            socket,
        } => {
            if let Some(backend) = backend {
                config.daemon.backend = backend;
            }
            if let Some(address) = bus_address {
                config.daemon.bus_address = address;
            }
            if let Some(socket) = socket {
                config.daemon.socket_path = socket.display().to_string();
            }
            config.validate()?;
            cmd_daemon(config).await
        }
        Commands::Send {
            relay,
            action,
            socket,
        } => {
            if let Some(socket) = socket {
                config.daemon.socket_path = socket.display().to_string();
            }
            cmd_send(&config, &relay, action.into()).await
        }
        Commands::Test {
            count,
            on_secs,
            off_secs,
            socket,
        } => {
            if let Some(socket) = socket {
                config.daemon.socket_path = socket.display().to_string();
            }
            cmd_test(&config, count, on_secs, off_secs).await
        }
        Commands::Relays => {
            cmd_relays(&config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { show } => cmd_config(&cli.config, &config, show),
    }
}

async fn cmd_daemon(config: AppConfig) -> Result<ExitCode> {
    info!("Starting relayctl daemon");
    let daemon = Daemon::new(config);
    daemon.run().await.context("daemon failed")?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_send(config: &AppConfig, relay: &str, action: Action) -> Result<ExitCode> {
    let client = RelayClient::from_config(config);
    let response = client.send(relay, action).await?;

    println!("{}", serde_json::to_string(&response)?);
    match response {
        RelayResponse::Error { .. } => Ok(ExitCode::from(EXIT_DAEMON_ERROR)),
        _ => Ok(ExitCode::SUCCESS),
    }
}

/// Each step is its own lock-guarded request, so other clients can
/// interleave between steps.
async fn cmd_test(
    config: &AppConfig,
    count: u32,
    on_time: Duration,
    off_time: Duration,
) -> Result<ExitCode> {
    let client = RelayClient::from_config(config);
    let mut relays: Vec<&RelayConfig> = config.relays.iter().collect();
    relays.sort_by_key(|relay| relay.index);

    for cycle in 0..count {
        for relay in &relays {
            for (action, pause) in [(Action::On, on_time), (Action::Off, off_time)] {
                info!(cycle, relay = %relay.name, %action, "test step");
                let response = client.send(&relay.name, action).await?;
                println!("{}", serde_json::to_string(&response)?);
                if response.is_error() {
                    return Ok(ExitCode::from(EXIT_DAEMON_ERROR));
                }
                tokio::time::sleep(pause).await;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_relays(config: &AppConfig) {
    println!("{:<12} {:>5} {:>4}", "NAME", "INDEX", "PIN");
    for relay in &config.relays {
        println!("{:<12} {:>5} {:>4}", relay.name, relay.index, relay.pin);
    }
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<ExitCode> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok(config)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(AppConfig::default())
    }
}
