//! Core math modules.

pub mod beta_binomial;
pub mod grades;
pub mod stable;
