//! Structured event definitions for logging.
//!
//! Events follow a consistent schema for machine-parseable JSONL output.
//! Events logged inside the run span carry the run_id and the pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of an estimation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Reading samples and the grid.
    Load,
    /// Closed-form classification.
    Classify,
    /// Chunked grid evaluation on the backend.
    Dispatch,
    /// Argmax over grid points.
    Reduce,
    /// CSV and summary output.
    Output,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Classify => "classify",
            Stage::Dispatch => "dispatch",
            Stage::Reduce => "reduce",
            Stage::Output => "output",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Load stage
    pub const LOAD_SAMPLES: &str = "load.samples";
    pub const LOAD_GRID: &str = "load.grid";

    // Classify stage
    pub const CLASSIFY_CASE: &str = "classify.case";
    pub const CLASSIFY_SUMMARY: &str = "classify.summary";

    // Dispatch stage
    pub const BACKEND_INITIALIZED: &str = "backend.initialized";
    pub const DISPATCH_CHUNK: &str = "dispatch.chunk";
    pub const DISPATCH_FINISHED: &str = "dispatch.finished";

    // Output stage
    pub const OUTPUT_WRITTEN: &str = "output.written";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";

    // Error events
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// A structured log event for JSONL output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    /// Event name (e.g., "run.started", "dispatch.chunk").
    pub event: String,
    /// Unique ID for this invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Additional structured fields (stable keys).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl LogEvent {
    pub fn new(level: Level, event: impl Into<String>) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: None,
            stage: None,
            message: None,
            fields: serde_json::Map::new(),
        }
    }

    /// Serialize to a single JSON line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Run-wide logging context; `log_event!` stamps its run_id on every event.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
        }
    }
}
