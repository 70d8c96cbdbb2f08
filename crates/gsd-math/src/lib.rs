//! GSD estimator math utilities.

pub mod math;

pub use math::beta_binomial::{self, BetaBinomialTerms, BetaShape, CategoryCounts};
pub use math::grades::{self, LogGrades};
pub use math::stable::*;
