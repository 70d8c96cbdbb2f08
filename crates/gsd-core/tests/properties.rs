//! Property-based tests for the classifier and the reducer.

use gsd_common::Sample;
use gsd_core::classify::{classify, needs_grid, Classification, ClosedFormCase};
use gsd_core::config::ClosedFormDivision;
use gsd_core::reduce::Reducer;
use proptest::prelude::*;

fn sample_strategy() -> impl Strategy<Value = Sample> {
    // Small counts make the closed-form patterns reachable.
    prop::array::uniform5(0u32..8).prop_map(Sample::new)
}

proptest! {
    #[test]
    fn classification_is_deterministic(sample in sample_strategy()) {
        prop_assert_eq!(classify(&sample), classify(&sample));
    }

    #[test]
    fn classification_ignores_category_order(
        counts in prop::array::uniform5(0u32..8),
        rotation in 0usize..5,
    ) {
        let mut rotated = counts;
        rotated.rotate_left(rotation);
        prop_assert_eq!(
            classify(&Sample::new(counts)),
            classify(&Sample::new(rotated))
        );
    }

    #[test]
    fn exactly_one_case_matches_its_pattern(sample in sample_strategy()) {
        let values = sample.sorted_values();
        let (min, max) = (values[0], values[4]);
        let single_step = max - min == 1;
        let first_above_one = values.iter().find(|&&v| v != 1);
        let one_five = !single_step && min >= 1 && first_above_one == Some(&5);

        match classify(&sample) {
            Classification::ClosedForm(cf) => match cf.case {
                ClosedFormCase::SingleStep => prop_assert!(single_step),
                ClosedFormCase::OneFiveMixture => prop_assert!(one_five),
            },
            Classification::GridSearch => prop_assert!(!single_step && !one_five),
        }
    }

    #[test]
    fn mixture_estimate_is_always_one(sample in sample_strategy()) {
        if let Classification::ClosedForm(cf) = classify(&sample) {
            if cf.case == ClosedFormCase::OneFiveMixture {
                prop_assert_eq!(cf.numerator, cf.denominator);
                prop_assert_eq!(cf.value(ClosedFormDivision::Truncate), 1.0);
                prop_assert_eq!(cf.flag(), 0);
            }
        }
    }

    #[test]
    fn single_step_estimate_is_the_mean(sample in sample_strategy()) {
        if let Classification::ClosedForm(cf) = classify(&sample) {
            if cf.case == ClosedFormCase::SingleStep {
                let mean = sample.total() as f64 / 5.0;
                prop_assert!((cf.value(ClosedFormDivision::Exact) - mean).abs() < 1e-12);
                prop_assert_eq!(cf.value(ClosedFormDivision::Truncate), mean.floor());
                prop_assert_eq!(cf.flag(), 1);
            }
        }
    }

    #[test]
    fn needs_grid_matches_any_fallthrough(samples in prop::collection::vec(sample_strategy(), 0..12)) {
        let expected = samples.iter().any(|s| classify(s) == Classification::GridSearch);
        prop_assert_eq!(needs_grid(&samples), expected);
    }

    #[test]
    fn reducer_is_order_independent(
        // Coarse values force frequent ties.
        values in prop::collection::vec(prop::collection::vec(-4i8..4, 3), 1..10),
        seed in any::<u64>(),
    ) {
        let n_grid = values.len();
        let cells: Vec<(usize, usize, f32)> = values
            .iter()
            .enumerate()
            .flat_map(|(g, row)| row.iter().enumerate().map(move |(n, &v)| (n, g, f32::from(v))))
            .collect();

        let mut forward = Reducer::new(3);
        for &(n, g, v) in &cells {
            forward.observe(n, g, v);
        }

        let mut shuffled = cells.clone();
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }
        let mut backward = Reducer::new(3);
        for &(n, g, v) in &shuffled {
            backward.observe(n, g, v);
        }

        let split = n_grid / 2;
        let mut low = Reducer::new(3);
        let mut high = Reducer::new(3);
        for &(n, g, v) in &cells {
            if g < split { low.observe(n, g, v) } else { high.observe(n, g, v) }
        }
        high.merge(&low);

        for n in 0..3 {
            let best = forward.get(n).unwrap();
            prop_assert_eq!(backward.get(n), Some(best));
            prop_assert_eq!(high.get(n), Some(best));
            let max = values.iter().map(|row| row[n]).max().unwrap();
            let first = values.iter().position(|row| row[n] == max).unwrap();
            prop_assert_eq!(best.grid_index, first);
        }
    }
}

#[test]
fn worked_examples() {
    let cases: [([u32; 5], Option<(ClosedFormCase, u64)>); 5] = [
        ([1, 2, 1, 2, 1], Some((ClosedFormCase::SingleStep, 7))),
        ([1, 1, 1, 1, 1], None),
        ([5, 4, 5, 4, 5], Some((ClosedFormCase::SingleStep, 23))),
        ([5, 1, 5, 1, 5], Some((ClosedFormCase::OneFiveMixture, 5))),
        ([5, 5, 5, 5, 5], Some((ClosedFormCase::OneFiveMixture, 5))),
    ];
    for (counts, expected) in cases {
        let got = match classify(&Sample::new(counts)) {
            Classification::ClosedForm(cf) => {
                assert_eq!(cf.denominator, 5);
                Some((cf.case, cf.numerator))
            }
            Classification::GridSearch => None,
        };
        assert_eq!(got, expected, "{counts:?}");
    }
}
