//! Fuzz target for config.toml parsing.
//!
//! Tests that TOML configuration parsing handles arbitrary input without
//! panicking, and that anything accepted passes validation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use gsd_core::config::EstimatorConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = EstimatorConfig::from_toml_str(text) {
        assert!(config.validate().is_ok());
    }
});
