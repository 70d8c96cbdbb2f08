//! Fuzz target for binary grid decoding.
//!
//! Arbitrary bytes and record widths must yield either a validated grid or
//! an error, never a panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use gsd_core::io::parse_grid;

#[derive(Debug, Arbitrary)]
struct GridInput<'a> {
    record_floats: u8,
    bytes: &'a [u8],
}

fuzz_target!(|input: GridInput<'_>| {
    let record_floats = usize::from(input.record_floats);
    if let Ok(grid) = parse_grid(input.bytes, record_floats) {
        assert_eq!(grid.len() * record_floats * 4, input.bytes.len());
        for (index, point) in grid.iter().enumerate() {
            assert!(point.validate(index).is_ok());
        }
    }
});
