//! GSD estimator common types and errors.
//!
//! This crate provides the types shared by the numerics and core crates:
//! - Sample and grid point records with their device layouts
//! - The unified error type with stable codes

pub mod error;
pub mod model;

pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use model::{GridPoint, Sample, CATEGORIES, TRIALS};
