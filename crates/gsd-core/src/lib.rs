//! GSD estimator core library.
//!
//! This library provides the estimation pipeline:
//! - Closed-form classification of degenerate samples
//! - Compute backends and the memory-budgeted batch dispatcher
//! - Streaming argmax reduction over grid points
//! - Sample/grid loading and CSV result output
//! - Configuration, logging and exit codes for the `gsd-mle` binary
//!
//! The binary entry point is in `main.rs`.

pub mod backend;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod estimator;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod reduce;

pub use backend::{ComputeBackend, CpuBackend, KernelKind, KernelSource};
pub use classify::{classify, Classification, ClosedForm, ClosedFormCase};
pub use config::{ClosedFormDivision, EstimatorConfig};
pub use dispatch::{BatchDispatcher, ChunkOutput, DispatchOptions, DispatchStats, MemoryBudget};
pub use estimator::{Estimate, EstimationReport, EstimationResult, Estimator, RunStats};
pub use reduce::{Best, Reducer};
