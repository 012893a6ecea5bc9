//! Fuzz target for request decoding and dispatch.
//!
//! Run with: cargo +nightly fuzz run fuzz_request_dispatch
//!
//! Decodes arbitrary bytes as a request and executes it against a simulated
//! board. Rejected requests must never have written to the board.

#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use relayctl_config::AppConfig;
use relayctl_core::dispatch::Dispatcher;
use relayctl_core::hardware::SimulatedBoard;
use relayctl_core::ipc::codec;
use relayctl_core::registry::RelayRegistry;
use relayctl_core::retry::RetryPolicy;

fuzz_target!(|data: &[u8]| {
    let Ok(request) = codec::decode_request(data) else {
        return;
    };

    let board = SimulatedBoard::new();
    let Ok(registry) = RelayRegistry::from_config(&AppConfig::default().relays) else {
        return;
    };
    let mut dispatcher = Dispatcher::new(
        Box::new(board.clone()),
        registry,
        RetryPolicy::new(1, Duration::ZERO),
    );
    if dispatcher.configure_outputs().is_err() {
        return;
    }

    if let Err(e) = dispatcher.execute(&request) {
        assert!(e.is_protocol_error());
        assert_eq!(board.write_count(), 0);
    }
});
