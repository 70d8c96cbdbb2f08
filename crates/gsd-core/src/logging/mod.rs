//! Structured logging for gsd-mle.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for pipelines
//!
//! # Usage
//!
//! ```ignore
//! use gsd_core::logging::{init_logging, LogConfig, LogContext, Stage, event_names};
//!
//! let config = LogConfig::from_env(None, None);
//! init_logging(&config);
//!
//! let ctx = LogContext::new(generate_run_id());
//! gsd_core::log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "starting");
//! ```
//!
//! stdout is reserved for the `--summary` payload; all log output goes to
//! stderr.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, LogContext, LogEvent, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Call once at startup. A second call is ignored.
pub fn init_logging(config: &LogConfig) {
    // Event targets are the dotted event names, so the filter is a bare
    // level rather than a crate-scoped directive.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.level).into())
        .parse_lossy("");

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init();
            } else {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init();
            }
        }
        LogFormat::Jsonl => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(JsonlLayer::stderr())
                .try_init();
        }
    }
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    format!("run-{}", &uuid.simple().to_string()[..12])
}

/// Structured event logging with context.
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::LOAD_GRID, Stage::Load, "grid loaded", points = 40);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::info!(
            target: $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($key = $val,)*
            message = $msg
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::debug!(
            target: $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($key = $val,)*
            message = $msg
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::warn!(
            target: $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($key = $val,)*
            message = $msg
        )
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::error!(
            target: $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($key = $val,)*
            message = $msg
        )
    };
}
