//! Input loaders and result output.
//!
//! - `samples`: whitespace-delimited text, five counts per line
//! - `grid`: packed little-endian f32 records
//! - `csv`: `idx,psi,rho,log_likelihood` rows

pub mod csv;
pub mod grid;
pub mod samples;

pub use self::csv::{write_results, write_results_file, CSV_HEADER};
pub use grid::{encode_grid, load_grid, parse_grid};
pub use samples::{load_samples, parse_samples};

use std::path::Path;

use gsd_common::{Error, Result};

/// Read a whole input file, mapping a missing file to [`Error::MissingInput`].
pub(crate) fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::MissingInput {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })
}
