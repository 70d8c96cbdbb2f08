//! Beta-binomial log-likelihood over the five outcome categories.
//!
//! With `T = 4` trials an observation falls in one of the categories
//! `k = 0..=4`. For shape parameters `(α, β)` and category counts `c_k`
//! (with `N = Σ c_k`), the log-likelihood used by the estimator is
//!
//! ```text
//! log L = -N · Σ_{i=0}^{3} ln(α + β + i)
//!         + Σ_k c_k · [ Σ_{i=0}^{k-1} ln(α + i) + Σ_{i=0}^{3-k} ln(β + i) ]
//! ```
//!
//! which is `Σ_k c_k · ln( P(k | α, β) / C(4, k) )`: the beta-binomial mass
//! without the binomial coefficient, a constant that cannot move the argmax.
//!
//! A sample contributes through its values, not its category order: each of
//! its five counts is an observed category in `0..=4`, and `c_k` is how many
//! of them equal `k`.

use serde::{Deserialize, Serialize};

use gsd_common::{Error, GridPoint, Result, Sample, CATEGORIES, TRIALS};

use super::stable::log_rising_factorial;

/// Beta shape parameters, both strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaShape {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaShape {
    /// Create shape parameters, rejecting anything that would put a
    /// non-positive argument under a logarithm.
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(Error::NumericalDomain(format!(
                "alpha must be finite and > 0, got {alpha}"
            )));
        }
        if !(beta.is_finite() && beta > 0.0) {
            return Err(Error::NumericalDomain(format!(
                "beta must be finite and > 0, got {beta}"
            )));
        }
        Ok(Self { alpha, beta })
    }

    /// Read a grid point's (psi, rho) as (alpha, beta).
    pub fn from_grid_point(point: &GridPoint) -> Result<Self> {
        Self::new(f64::from(point.psi), f64::from(point.rho))
    }
}

/// Number of observations per outcome category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryCounts([u64; CATEGORIES]);

impl CategoryCounts {
    pub fn new(counts: [u64; CATEGORIES]) -> Self {
        Self(counts)
    }

    /// Bucket a sample's five values by category.
    ///
    /// Fails with a domain error if any value lies outside `0..=4`.
    pub fn from_sample(sample: &Sample) -> Result<Self> {
        Self::tally(sample.multiplicity())
    }

    /// Bucket observed category values (each in `0..=4`) by value.
    ///
    /// Sorting first makes each bucket a contiguous run, the same way the
    /// classifier sizes its runs of equal values.
    pub fn tally(values: &[u32]) -> Result<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();

        if let Some(&max) = sorted.last() {
            if max as usize > TRIALS {
                return Err(Error::NumericalDomain(format!(
                    "category value {max} outside 0..={TRIALS}"
                )));
            }
        }

        let mut counts = [0u64; CATEGORIES];
        let mut start = 0;
        for (k, count) in counts.iter_mut().enumerate() {
            let end = start + sorted[start..].partition_point(|&v| v as usize == k);
            *count = (end - start) as u64;
            start = end;
        }
        Ok(Self(counts))
    }

    pub fn get(&self, k: usize) -> u64 {
        self.0[k]
    }

    pub fn as_array(&self) -> &[u64; CATEGORIES] {
        &self.0
    }

    /// Total observations N.
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

/// Per-shape log terms, computed once per grid point and reused for every
/// sample evaluated against it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaBinomialTerms {
    /// Σ_{i=0}^{3} ln(α + β + i).
    pub normalization: f64,
    /// Σ_{i<k} ln(α + i) + Σ_{i<4-k} ln(β + i), per category k.
    pub per_category: [f64; CATEGORIES],
}

impl BetaBinomialTerms {
    pub fn new(shape: &BetaShape) -> Self {
        let normalization = log_rising_factorial(shape.alpha + shape.beta, TRIALS);
        let mut per_category = [0.0; CATEGORIES];
        for (k, term) in per_category.iter_mut().enumerate() {
            *term = log_rising_factorial(shape.alpha, k)
                + log_rising_factorial(shape.beta, TRIALS - k);
        }
        Self {
            normalization,
            per_category,
        }
    }

    /// Log-likelihood of the given category counts.
    pub fn log_likelihood(&self, counts: &CategoryCounts) -> f64 {
        let n = counts.total() as f64;
        let mut acc = -n * self.normalization;
        for (k, &c) in counts.as_array().iter().enumerate() {
            if c > 0 {
                acc += c as f64 * self.per_category[k];
            }
        }
        acc
    }
}

/// Log-likelihood of `counts` under Beta-binomial(4, α, β), without the
/// binomial coefficients.
pub fn log_likelihood(counts: &CategoryCounts, shape: &BetaShape) -> f64 {
    BetaBinomialTerms::new(shape).log_likelihood(counts)
}
