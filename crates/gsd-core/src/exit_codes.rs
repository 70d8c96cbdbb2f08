//! Exit codes for the gsd-mle CLI.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors (bugs, should be reported)

use gsd_common::{Error, ErrorCategory};

/// Exit codes for gsd-mle runs.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Estimates written
    Success = 0,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid or missing command-line arguments
    ArgsError = 10,

    /// Sample or grid file missing or malformed
    InputError = 11,

    /// Configuration rejected (file, overrides, grid or memory budget)
    ConfigError = 12,

    /// Compute backend failed
    BackendError = 13,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        self.as_i32() >= 20
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Success => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::InputError => "ERR_INPUT",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::BackendError => "ERR_BACKEND",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(error: &Error) -> Self {
        match error.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Input => ExitCode::InputError,
            ErrorCategory::Backend => ExitCode::BackendError,
            ErrorCategory::Numerical => ExitCode::InternalError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
