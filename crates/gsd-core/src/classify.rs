//! Closed-form fast path.
//!
//! Most samples follow one of two degenerate patterns whose estimate is known
//! exactly. Only the remaining samples are sent to grid search.
//!
//! Classification looks at the sorted count values only. The sort happens on
//! a copy, so the per-category order that grid search needs is untouched.
//!
//! | Case | Pattern (sorted values) | Estimate | Flag |
//! |------|-------------------------|----------|------|
//! | single step | `max - min == 1` | `(k·n_k + (k+1)·n_{k+1}) / n` | 1 |
//! | one/five mixture | no zeros, first value above 1 is 5 | `(n_1 + n_5) / n` | 0 |
//! | grid search | anything else | none | none |
//!
//! For the mixture, `n_5` counts every entry above the ones, so the estimate
//! is always 1.

use gsd_common::{Sample, CATEGORIES};
use serde::Serialize;

use crate::config::ClosedFormDivision;

/// Which closed-form pattern a sample matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosedFormCase {
    /// All values are `k` or `k + 1`, both present.
    SingleStep,
    /// No zeros, and the smallest value above 1 is 5.
    OneFiveMixture,
}

impl ClosedFormCase {
    /// Auxiliary flag reported alongside the estimate.
    pub fn flag(self) -> u8 {
        match self {
            ClosedFormCase::SingleStep => 1,
            ClosedFormCase::OneFiveMixture => 0,
        }
    }
}

impl std::fmt::Display for ClosedFormCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosedFormCase::SingleStep => write!(f, "single_step"),
            ClosedFormCase::OneFiveMixture => write!(f, "one_five_mixture"),
        }
    }
}

/// An exact closed-form estimate, kept as a rational until a division
/// policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClosedForm {
    pub case: ClosedFormCase,
    pub numerator: u64,
    pub denominator: u64,
}

impl ClosedForm {
    /// Estimate under the given division policy.
    pub fn value(&self, division: ClosedFormDivision) -> f64 {
        match division {
            ClosedFormDivision::Exact => self.numerator as f64 / self.denominator as f64,
            ClosedFormDivision::Truncate => (self.numerator / self.denominator) as f64,
        }
    }

    pub fn flag(&self) -> u8 {
        self.case.flag()
    }
}

/// Outcome of classifying one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    ClosedForm(ClosedForm),
    GridSearch,
}

impl Classification {
    pub fn needs_grid(&self) -> bool {
        matches!(self, Classification::GridSearch)
    }
}

/// Classify a sample. Pure: the same sample always yields the same result.
pub fn classify(sample: &Sample) -> Classification {
    let values = sample.sorted_values();
    let n = CATEGORIES as u64;
    let (min, max) = (values[0], values[CATEGORIES - 1]);

    if max - min == 1 {
        let k = u64::from(min);
        let nk = values.partition_point(|&v| v == min) as u64;
        let nkp1 = n - nk;
        return Classification::ClosedForm(ClosedForm {
            case: ClosedFormCase::SingleStep,
            numerator: k * nk + (k + 1) * nkp1,
            denominator: n,
        });
    }

    // Values below 1 sort ahead of the ones, so a zero rules the mixture out
    // at the first position.
    let n1 = values.partition_point(|&v| v == 1);
    let rest = &values[n1..];
    if min >= 1 && rest.first() == Some(&5) {
        let n1 = n1 as u64;
        let n5 = rest.len() as u64;
        return Classification::ClosedForm(ClosedForm {
            case: ClosedFormCase::OneFiveMixture,
            numerator: n1 + n5,
            denominator: n,
        });
    }

    Classification::GridSearch
}

/// Whether any sample in the set falls through to grid search.
pub fn needs_grid(samples: &[Sample]) -> bool {
    samples.iter().any(|s| classify(s).needs_grid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(m: [u32; 5]) -> ClosedForm {
        match classify(&Sample::new(m)) {
            Classification::ClosedForm(cf) => cf,
            Classification::GridSearch => panic!("{m:?} should have a closed form"),
        }
    }

    fn is_grid(m: [u32; 5]) -> bool {
        classify(&Sample::new(m)) == Classification::GridSearch
    }

    #[test]
    fn single_step_one_two() {
        let cf = closed([1, 2, 1, 2, 1]);
        assert_eq!(cf.case, ClosedFormCase::SingleStep);
        // k=1, nk=3, nkp1=2: (1*3 + 2*2) / 5
        assert_eq!((cf.numerator, cf.denominator), (7, 5));
        assert_eq!(cf.value(ClosedFormDivision::Truncate), 1.0);
        assert!((cf.value(ClosedFormDivision::Exact) - 1.4).abs() < 1e-12);
        assert_eq!(cf.flag(), 1);
    }

    #[test]
    fn single_step_four_five() {
        let cf = closed([5, 4, 5, 4, 5]);
        assert_eq!(cf.case, ClosedFormCase::SingleStep);
        // k=4, nk=2, nkp1=3: (4*2 + 5*3) / 5 = 23/5
        assert_eq!((cf.numerator, cf.denominator), (23, 5));
        assert!((cf.value(ClosedFormDivision::Exact) - 4.6).abs() < 1e-12);
        assert_eq!(cf.value(ClosedFormDivision::Truncate), 4.0);
    }

    #[test]
    fn one_five_mixture() {
        let cf = closed([5, 1, 5, 1, 5]);
        assert_eq!(cf.case, ClosedFormCase::OneFiveMixture);
        assert_eq!((cf.numerator, cf.denominator), (5, 5));
        assert_eq!(cf.value(ClosedFormDivision::Exact), 1.0);
        assert_eq!(cf.flag(), 0);
    }

    #[test]
    fn all_fives_is_mixture_without_ones() {
        let cf = closed([5, 5, 5, 5, 5]);
        assert_eq!(cf.case, ClosedFormCase::OneFiveMixture);
        assert_eq!(cf.value(ClosedFormDivision::Exact), 1.0);
    }

    #[test]
    fn all_ones_falls_through() {
        assert!(is_grid([1, 1, 1, 1, 1]));
    }

    #[test]
    fn all_equal_other_values_fall_through() {
        assert!(is_grid([0, 0, 0, 0, 0]));
        assert!(is_grid([3, 3, 3, 3, 3]));
    }

    #[test]
    fn wider_spreads_fall_through() {
        assert!(is_grid([3, 2, 1, 2, 1]));
        assert!(is_grid([1, 4, 1, 4, 1]));
        assert!(is_grid([5, 1, 5, 4, 5]));
    }

    #[test]
    fn mixture_keys_on_first_value_above_one() {
        for m in [[1, 5, 7, 5, 5], [5, 5, 5, 5, 9], [1, 1, 5, 6, 100]] {
            let cf = closed(m);
            assert_eq!(cf.case, ClosedFormCase::OneFiveMixture, "{m:?}");
            assert_eq!((cf.numerator, cf.denominator), (5, 5), "{m:?}");
            assert_eq!(cf.flag(), 0);
        }
    }

    #[test]
    fn mixture_needs_a_five_right_after_the_ones() {
        assert!(is_grid([0, 1, 5, 5, 5]));
        assert!(is_grid([6, 6, 6, 6, 6]));
        assert!(is_grid([1, 6, 6, 6, 6]));
        assert!(is_grid([2, 5, 5, 5, 5]));
    }

    #[test]
    fn single_step_with_zero_minimum() {
        let cf = closed([0, 1, 0, 0, 0]);
        assert_eq!(cf.case, ClosedFormCase::SingleStep);
        assert_eq!(cf.numerator, 1);
    }

    #[test]
    fn single_step_at_u32_max() {
        let cf = closed([u32::MAX, u32::MAX - 1, u32::MAX, u32::MAX, u32::MAX]);
        assert_eq!(cf.case, ClosedFormCase::SingleStep);
        let k = u64::from(u32::MAX - 1);
        assert_eq!(cf.numerator, k + 4 * (k + 1));
    }

    #[test]
    fn classification_leaves_sample_untouched() {
        let sample = Sample::new([5, 4, 5, 4, 5]);
        let _ = classify(&sample);
        assert_eq!(sample.multiplicity(), &[5, 4, 5, 4, 5]);
    }

    #[test]
    fn needs_grid_detects_any_fallthrough() {
        assert!(!needs_grid(&[Sample::new([1, 2, 1, 2, 1])]));
        assert!(needs_grid(&[
            Sample::new([1, 2, 1, 2, 1]),
            Sample::new([1, 1, 1, 1, 1]),
        ]));
        assert!(!needs_grid(&[]));
    }
}
