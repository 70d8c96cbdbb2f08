//! Error types for the GSD estimator.
//!
//! Every error is fatal for a run: the estimator is a batch job and reruns
//! are cheap. Errors still carry enough structure to tell a user what went
//! wrong and where:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Remediation hints for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Memory Budget Exceeded
//!   Reason: memory budget of 1024 bytes cannot hold output for a single sample (4000 bytes)
//!   Fix: Raise memory_fraction or max_allocation_bytes, or use a smaller grid.
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for estimator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration and grid-shape errors.
    Config,
    /// Malformed or missing sample/grid inputs.
    Input,
    /// Invalid arguments reaching the likelihood math.
    Numerical,
    /// Compute backend failures (device, compile, buffers, transfers).
    Backend,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Backend => write!(f, "backend"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for the estimator.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("grid search requested for {pending} sample(s) but the grid is empty")]
    EmptyGrid { pending: usize },

    #[error(
        "memory budget of {budget_bytes} bytes cannot hold {what} ({required_bytes} bytes)"
    )]
    MemoryBudget {
        budget_bytes: u64,
        required_bytes: u64,
        what: String,
    },

    #[error("invalid grid point {index}: {message}")]
    InvalidGridPoint { index: usize, message: String },

    // Input errors (20-29)
    #[error("malformed sample on line {line}: {message}")]
    SampleParse { line: usize, message: String },

    #[error("malformed grid file: {0}")]
    GridFormat(String),

    #[error("input file not found: {}", path.display())]
    MissingInput { path: PathBuf },

    // Numerical errors (30-39)
    #[error("numerical domain error: {0}")]
    NumericalDomain(String),

    // Backend errors (40-49)
    #[error("{backend} backend failed during {stage}: {message} ({name}, code {code})")]
    Backend {
        backend: String,
        stage: String,
        code: i32,
        name: String,
        message: String,
    },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Input errors
    /// - 30-39: Numerical errors
    /// - 40-49: Backend errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::EmptyGrid { .. } => 11,
            Error::MemoryBudget { .. } => 12,
            Error::InvalidGridPoint { .. } => 13,
            Error::SampleParse { .. } => 20,
            Error::GridFormat(_) => 21,
            Error::MissingInput { .. } => 22,
            Error::NumericalDomain(_) => 30,
            Error::Backend { .. } => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::EmptyGrid { .. }
            | Error::MemoryBudget { .. }
            | Error::InvalidGridPoint { .. } => ErrorCategory::Config,

            Error::SampleParse { .. } | Error::GridFormat(_) | Error::MissingInput { .. } => {
                ErrorCategory::Input
            }

            Error::NumericalDomain(_) => ErrorCategory::Numerical,

            Error::Backend { .. } => ErrorCategory::Backend,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => "Check the config file and command-line overrides.",
            Error::EmptyGrid { .. } => {
                "Provide a grid file with at least one record, or check grid_record_floats."
            }
            Error::MemoryBudget { .. } => {
                "Raise memory_fraction or max_allocation_bytes, or use a smaller grid."
            }
            Error::InvalidGridPoint { .. } => {
                "Regenerate the grid: grades must be finite and non-negative."
            }
            Error::SampleParse { .. } => {
                "Each sample line must hold exactly five non-negative integers."
            }
            Error::GridFormat(_) => {
                "The grid file must be a whole number of little-endian f32 records."
            }
            Error::MissingInput { .. } => "Check the path passed on the command line.",
            Error::NumericalDomain(_) => {
                "The beta-binomial kernel needs positive psi and rho (read as alpha, beta) and sample values in 0..=4."
            }
            Error::Backend { .. } => {
                "Check that a supported compute device is available and the driver works."
            }
            Error::Io(_) => "Check disk space and permissions, then rerun.",
            Error::Json(_) => "Internal serialization failure. Please report it.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::EmptyGrid { .. } => "Empty Grid",
            Error::MemoryBudget { .. } => "Memory Budget Exceeded",
            Error::InvalidGridPoint { .. } => "Invalid Grid Point",
            Error::SampleParse { .. } => "Malformed Sample",
            Error::GridFormat(_) => "Malformed Grid File",
            Error::MissingInput { .. } => "Input Not Found",
            Error::NumericalDomain(_) => "Numerical Domain Error",
            Error::Backend { .. } => "Compute Backend Failure",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }

    /// Format for a terminal: headline, reason and fix.
    pub fn format_human(&self) -> String {
        format!(
            "✗ {}\n  Reason: {}\n  Fix: {}",
            self.headline(),
            self,
            self.remediation()
        )
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Additional structured context (e.g., line number, backend stage).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::EmptyGrid { pending } => {
                context.insert("pending_samples".to_string(), serde_json::json!(pending));
            }
            Error::MemoryBudget {
                budget_bytes,
                required_bytes,
                ..
            } => {
                context.insert("budget_bytes".to_string(), serde_json::json!(budget_bytes));
                context.insert(
                    "required_bytes".to_string(),
                    serde_json::json!(required_bytes),
                );
            }
            Error::InvalidGridPoint { index, .. } => {
                context.insert("grid_index".to_string(), serde_json::json!(index));
            }
            Error::SampleParse { line, .. } => {
                context.insert("line".to_string(), serde_json::json!(line));
            }
            Error::MissingInput { path } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            Error::Backend {
                backend,
                stage,
                code,
                name,
                ..
            } => {
                context.insert("backend".to_string(), serde_json::json!(backend));
                context.insert("stage".to_string(), serde_json::json!(stage));
                context.insert("status_code".to_string(), serde_json::json!(code));
                context.insert("status_name".to_string(), serde_json::json!(name));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to a single JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"message":"serialization_failed"}}"#, self.code)
        })
    }
}
