//! CSV result output.
//!
//! ```text
//! idx,psi,rho,log_likelihood
//! 0,0.9,0.1,-12.279
//! 1,1.4,1,
//! ```
//!
//! Grid-search rows carry the selected grid point. Closed-form rows carry the
//! estimate in `psi`, the case flag in `rho` and no log-likelihood.

use std::fs;
use std::io::Write;
use std::path::Path;

use gsd_common::{Error, Result};

use crate::estimator::{Estimate, EstimationResult};

pub const CSV_HEADER: &str = "idx,psi,rho,log_likelihood";

fn csv_error(err: csv::Error) -> Error {
    Error::Io(err.into())
}

/// Write the header and one row per result.
pub fn write_results<W: Write>(writer: W, results: &[EstimationResult]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER.split(',')).map_err(csv_error)?;
    for result in results {
        let idx = result.index.to_string();
        let record = match result.estimate {
            Estimate::GridSearch {
                psi,
                rho,
                log_likelihood,
                ..
            } => [idx, psi.to_string(), rho.to_string(), log_likelihood.to_string()],
            Estimate::ClosedForm { value, flag, .. } => {
                [idx, value.to_string(), flag.to_string(), String::new()]
            }
        };
        wtr.write_record(&record).map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write results to a sibling temp file, then rename it over `path`.
pub fn write_results_file(path: &Path, results: &[EstimationResult]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("csv.tmp");
    let file = fs::File::create(&temp_path)?;
    if let Err(e) = write_results(file, results) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}
