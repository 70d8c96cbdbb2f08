//! Sample and grid point records.
//!
//! Both records have a fixed device layout padded to eight lanes so that a
//! compute kernel can load them as a single 8-wide vector. The padding lanes
//! are always zero on upload and never read back.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of outcome categories per sample.
pub const CATEGORIES: usize = 5;

/// Beta-binomial trial count; categories are the outcomes `0..=TRIALS`.
pub const TRIALS: usize = CATEGORIES - 1;

/// Vector width used by the device layouts.
pub const DEVICE_LANES: usize = 8;

/// One observation: the counts observed in each of the five categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample {
    multiplicity: [u32; CATEGORIES],
}

impl Sample {
    /// Bytes occupied by one sample in a device buffer (8 x i32).
    pub const DEVICE_BYTES: usize = DEVICE_LANES * std::mem::size_of::<i32>();

    pub fn new(multiplicity: [u32; CATEGORIES]) -> Self {
        Self { multiplicity }
    }

    /// Counts in category order.
    pub fn multiplicity(&self) -> &[u32; CATEGORIES] {
        &self.multiplicity
    }

    /// Count values sorted ascending. Category order is lost.
    pub fn sorted_values(&self) -> [u32; CATEGORIES] {
        let mut values = self.multiplicity;
        values.sort_unstable();
        values
    }

    /// Sum of all category counts.
    pub fn total(&self) -> u64 {
        self.multiplicity.iter().map(|&m| u64::from(m)).sum()
    }
}

impl From<[u32; CATEGORIES]> for Sample {
    fn from(multiplicity: [u32; CATEGORIES]) -> Self {
        Self::new(multiplicity)
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.multiplicity;
        write!(f, "{{{} {} {} {} {}}}", m[0], m[1], m[2], m[3], m[4])
    }
}

/// One candidate parameter pair with its precomputed category probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub psi: f32,
    pub rho: f32,
    /// Probability of each outcome category under (psi, rho).
    pub grades: [f32; CATEGORIES],
}

impl GridPoint {
    /// Bytes occupied by one grid point in a device buffer
    /// (psi, rho and 8 grade lanes).
    pub const DEVICE_BYTES: usize = (2 + DEVICE_LANES) * std::mem::size_of::<f32>();

    /// Create a grid point, rejecting non-finite coordinates and negative or
    /// non-finite grades.
    pub fn new(psi: f32, rho: f32, grades: [f32; CATEGORIES]) -> Result<Self> {
        let point = Self { psi, rho, grades };
        point.check().map_err(|message| Error::InvalidGridPoint { index: 0, message })?;
        Ok(point)
    }

    /// Validate this point as the `index`-th entry of a grid.
    pub fn validate(&self, index: usize) -> Result<()> {
        self.check()
            .map_err(|message| Error::InvalidGridPoint { index, message })
    }

    fn check(&self) -> std::result::Result<(), String> {
        if !self.psi.is_finite() || !self.rho.is_finite() {
            return Err(format!(
                "coordinates must be finite (psi={}, rho={})",
                self.psi, self.rho
            ));
        }
        if let Some((k, g)) = self
            .grades
            .iter()
            .enumerate()
            .find(|(_, g)| !g.is_finite() || **g < 0.0)
        {
            return Err(format!("grade {k} must be finite and non-negative, got {g}"));
        }
        Ok(())
    }
}
