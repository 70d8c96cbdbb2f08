//! Binary grid format.
//!
//! A grid file is a packed sequence of records, each `record_floats`
//! little-endian f32 values: `psi, rho, g0, g1, g2, g3, g4`, then filler.
//! There is no header; the record count is the file length divided by the
//! record size.

use std::path::Path;

use gsd_common::{Error, GridPoint, Result, CATEGORIES};

use super::read_input;
use crate::config::MIN_GRID_RECORD_FLOATS;

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Decode and validate grid records.
pub fn parse_grid(bytes: &[u8], record_floats: usize) -> Result<Vec<GridPoint>> {
    if record_floats < MIN_GRID_RECORD_FLOATS {
        return Err(Error::Config(format!(
            "grid records need at least {MIN_GRID_RECORD_FLOATS} floats, got {record_floats}"
        )));
    }
    let record_bytes = record_floats * F32_BYTES;
    if bytes.len() % record_bytes != 0 {
        return Err(Error::GridFormat(format!(
            "{} bytes is not a whole number of {record_bytes}-byte records",
            bytes.len()
        )));
    }

    let mut points = Vec::with_capacity(bytes.len() / record_bytes);
    for (index, record) in bytes.chunks_exact(record_bytes).enumerate() {
        let mut floats = record
            .chunks_exact(F32_BYTES)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        let mut next = || floats.next().unwrap_or(f32::NAN);
        let psi = next();
        let rho = next();
        let mut grades = [0.0f32; CATEGORIES];
        for g in &mut grades {
            *g = next();
        }
        let point = GridPoint { psi, rho, grades };
        point.validate(index)?;
        points.push(point);
    }
    Ok(points)
}

/// Load a grid file.
pub fn load_grid(path: &Path, record_floats: usize) -> Result<Vec<GridPoint>> {
    let bytes = read_input(path)?;
    parse_grid(&bytes, record_floats)
}

/// Encode grid points into the file format, zero-filling extra floats.
pub fn encode_grid(points: &[GridPoint], record_floats: usize) -> Vec<u8> {
    let record_floats = record_floats.max(MIN_GRID_RECORD_FLOATS);
    let mut out = Vec::with_capacity(points.len() * record_floats * F32_BYTES);
    for point in points {
        out.extend_from_slice(&point.psi.to_le_bytes());
        out.extend_from_slice(&point.rho.to_le_bytes());
        for g in &point.grades {
            out.extend_from_slice(&g.to_le_bytes());
        }
        for _ in MIN_GRID_RECORD_FLOATS..record_floats {
            out.extend_from_slice(&0f32.to_le_bytes());
        }
    }
    out
}
