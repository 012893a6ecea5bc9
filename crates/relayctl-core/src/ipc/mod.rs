//! Daemon IPC over a Unix domain socket.
//!
//! One JSON request and one JSON response per connection. The daemon closes
//! the connection after answering.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐       Unix socket        ┌──────────────┐
//! │ relayctl │─────────────────────────▶│  IPC Server  │
//! │   send   │  JSON request/response   │  (tokio)     │
//! └──────────┘                          └──────┬───────┘
//!                                              │ mutex
//!                                       ┌──────▼───────┐     ┌──────────┐
//!                                       │  Dispatcher  │────▶│ hardware │
//!                                       └──────────────┘     └──────────┘
//! ```

pub mod client;
pub mod codec;
pub mod server;
pub mod types;

pub use client::{IpcClient, IpcClientError};
pub use codec::ProtocolError;
pub use server::{DEFAULT_SOCKET_PATH, IpcServer, SharedDispatcher};
pub use types::*;
