//! Fuzz target for sample text parsing.
//!
//! Tests that `parse_samples` handles arbitrary text without panicking and
//! that every accepted line holds exactly five counts.

#![no_main]

use libfuzzer_sys::fuzz_target;
use gsd_core::io::parse_samples;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(samples) = parse_samples(text) {
        let data_lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .count();
        assert_eq!(samples.len(), data_lines);
    }
});
