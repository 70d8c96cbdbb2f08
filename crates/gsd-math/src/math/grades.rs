//! Grade log-likelihood for grid search.
//!
//! A grid point's grades are category probabilities, so the log-likelihood
//! of a sample is `Σ_k multiplicity_k · ln(grade_k)`.

use gsd_common::{GridPoint, Sample, CATEGORIES};

/// Natural logs of a grid point's grades. A zero grade maps to NEG_INFINITY.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogGrades([f64; CATEGORIES]);

impl LogGrades {
    pub fn new(grades: &[f32; CATEGORIES]) -> Self {
        let mut logs = [0.0; CATEGORIES];
        for (l, &g) in logs.iter_mut().zip(grades) {
            *l = f64::from(g).ln();
        }
        Self(logs)
    }

    pub fn from_grid_point(point: &GridPoint) -> Self {
        Self::new(&point.grades)
    }

    pub fn as_array(&self) -> &[f64; CATEGORIES] {
        &self.0
    }

    /// Log-likelihood of one sample.
    ///
    /// Categories with a zero count contribute nothing, so a zero grade only
    /// yields NEG_INFINITY when the sample actually observed that category.
    pub fn log_likelihood(&self, sample: &Sample) -> f64 {
        let mut acc = 0.0;
        for (&log_g, &m) in self.0.iter().zip(sample.multiplicity()) {
            if m > 0 {
                acc += f64::from(m) * log_g;
            }
        }
        acc
    }
}

/// Convenience wrapper for a single (sample, grid point) pair.
pub fn log_likelihood(sample: &Sample, point: &GridPoint) -> f64 {
    LogGrades::from_grid_point(point).log_likelihood(sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_grades() {
        let point = GridPoint::new(0.0, 0.0, [0.2; 5]).unwrap();
        let sample = Sample::new([1, 2, 1, 2, 1]);
        let expected = 7.0 * f64::from(0.2f32).ln();
        assert!((log_likelihood(&sample, &point) - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_grade_with_zero_count_is_finite() {
        let point = GridPoint::new(0.0, 0.0, [0.0, 0.5, 0.5, 0.0, 0.0]).unwrap();
        let sample = Sample::new([0, 3, 1, 0, 0]);
        assert!(log_likelihood(&sample, &point).is_finite());
    }

    #[test]
    fn zero_grade_with_observed_count_is_neg_infinity() {
        let point = GridPoint::new(0.0, 0.0, [0.0, 0.5, 0.5, 0.0, 0.0]).unwrap();
        let sample = Sample::new([1, 3, 1, 0, 0]);
        assert_eq!(log_likelihood(&sample, &point), f64::NEG_INFINITY);
    }

    #[test]
    fn empty_sample_is_zero() {
        let point = GridPoint::new(0.0, 0.0, [0.1, 0.2, 0.3, 0.2, 0.2]).unwrap();
        assert_eq!(log_likelihood(&Sample::new([0; 5]), &point), 0.0);
    }

    #[test]
    fn prefers_matching_distribution() {
        let skewed = GridPoint::new(0.0, 0.0, [0.6, 0.1, 0.1, 0.1, 0.1]).unwrap();
        let flat = GridPoint::new(0.0, 0.0, [0.2; 5]).unwrap();
        let sample = Sample::new([6, 1, 1, 1, 1]);
        assert!(log_likelihood(&sample, &skewed) > log_likelihood(&sample, &flat));
    }
}
