//! Fuzz target for the TOML configuration parser and relay table checks.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text through `AppConfig::parse()` and, for configs that
//! pass validation, through `RelayRegistry::from_config()`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relayctl_core::registry::RelayRegistry;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = relayctl_config::AppConfig::parse(s) else {
        return;
    };
    if let Ok(registry) = RelayRegistry::from_config(&config.relays) {
        assert_eq!(registry.len(), config.relays.len());
        for (index, relay) in registry.all().iter().enumerate() {
            assert_eq!(relay.index, index);
        }
    }
});
