//! gsd-mle - hybrid psi/rho estimator CLI.
//!
//! Reads samples, estimates each one in closed form or by grid search, and
//! writes one CSV row per sample.

use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::Parser;
use gsd_common::{Error, ErrorCategory, Result, StructuredError};
use gsd_core::backend::KernelKind;
use gsd_core::classify::needs_grid;
use gsd_core::config::{load_config, ClosedFormDivision, ConfigOverrides};
use gsd_core::exit_codes::ExitCode;
use gsd_core::io::{load_grid, load_samples, write_results_file};
use gsd_core::log_event;
use gsd_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use gsd_core::{CpuBackend, Estimator, RunStats};
use serde::Serialize;

/// Estimate psi and rho for five-category count samples
#[derive(Parser, Debug)]
#[command(name = "gsd-mle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sample file: five whitespace-separated counts per line
    samples_file: PathBuf,

    /// CSV output path
    #[arg(default_value = "output.csv")]
    output_file: PathBuf,

    /// Binary grid file (little-endian f32 records)
    #[arg(default_value = "gsd_prob_grid.bin")]
    grid_file: PathBuf,

    /// Config file (overrides GSD_CONFIG and the XDG location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Share of the largest device allocation to spend per buffer, in (0, 1]
    #[arg(long)]
    memory_fraction: Option<f64>,

    /// Upper bound on samples per dispatched chunk
    #[arg(long)]
    max_chunk_samples: Option<usize>,

    /// Emulated device allocation limit for the CPU backend
    #[arg(long)]
    max_allocation_bytes: Option<u64>,

    /// Grid-search likelihood kernel
    #[arg(long, value_enum)]
    kernel: Option<KernelKind>,

    /// Closed-form division mode
    #[arg(long, value_enum)]
    closed_form_division: Option<ClosedFormDivision>,

    /// Worker threads for the CPU backend
    #[arg(long)]
    threads: Option<usize>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Print a JSON run summary to stdout
    #[arg(long)]
    summary: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            memory_fraction: self.memory_fraction,
            max_allocation_bytes: self.max_allocation_bytes,
            max_chunk_samples: self.max_chunk_samples,
            kernel: self.kernel,
            closed_form_division: self.closed_form_division,
            threads: self.threads,
        }
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    output: &'a str,
    #[serde(flatten)]
    stats: &'a RunStats,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::ArgsError,
            };
            std::process::exit(code.as_i32());
        }
    };

    let log_config = LogConfig::from_env(cli.log_level, cli.log_format);
    init_logging(&log_config);

    let ctx = LogContext::new(generate_run_id());
    let span = tracing::info_span!("run", run_id = %ctx.run_id);
    let _entered = span.enter();

    let exit_code = match run(&cli, &ctx) {
        Ok(()) => ExitCode::Success,
        Err(err) => report_error(&err, &ctx, log_config.format),
    };

    std::process::exit(exit_code.as_i32());
}

fn run(cli: &Cli, ctx: &LogContext) -> Result<()> {
    let loaded = load_config(cli.config.as_deref(), &cli.overrides())?;
    let source = loaded.source.to_string();
    let config_path = display_opt(loaded.path.as_deref());
    log_event!(
        ctx,
        INFO,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "configuration resolved",
        source = source.as_str(),
        path = config_path.as_str()
    );
    let config = loaded.config;

    let samples_path = cli.samples_file.display().to_string();
    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "estimation run started",
        samples_file = samples_path.as_str()
    );

    let samples = load_samples(&cli.samples_file)?;
    log_event!(
        ctx,
        INFO,
        event_names::LOAD_SAMPLES,
        Stage::Load,
        "samples loaded",
        count = samples.len() as u64
    );

    let grid = if needs_grid(&samples) {
        let grid = load_grid(&cli.grid_file, config.grid_record_floats)?;
        let grid_path = cli.grid_file.display().to_string();
        log_event!(
            ctx,
            INFO,
            event_names::LOAD_GRID,
            Stage::Load,
            "grid loaded",
            path = grid_path.as_str(),
            points = grid.len() as u64
        );
        grid
    } else {
        log_event!(
            ctx,
            DEBUG,
            event_names::LOAD_GRID,
            Stage::Load,
            "every sample has a closed form; grid not loaded"
        );
        Vec::new()
    };

    let mut backend = CpuBackend::with_max_allocation(config.max_allocation_bytes);
    if let Some(n) = config.threads {
        backend = backend.with_threads(n);
    }
    let mut estimator = Estimator::new(backend, config);
    let report = estimator.run(&samples, &grid)?;

    write_results_file(&cli.output_file, &report.results)?;
    let output = cli.output_file.display().to_string();
    log_event!(
        ctx,
        INFO,
        event_names::OUTPUT_WRITTEN,
        Stage::Output,
        "results written",
        path = output.as_str(),
        rows = report.results.len() as u64
    );

    if cli.summary {
        let summary = RunSummary {
            run_id: &ctx.run_id,
            output: &output,
            stats: &report.stats,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    log_event!(
        ctx,
        INFO,
        event_names::RUN_FINISHED,
        Stage::Output,
        "estimation run finished",
        samples = report.stats.samples as u64,
        closed_form = report.stats.closed_form() as u64,
        grid_search = report.stats.grid_search as u64,
        elapsed_ms = report.stats.elapsed_ms
    );
    Ok(())
}

fn report_error(err: &Error, ctx: &LogContext, format: LogFormat) -> ExitCode {
    let exit_code = ExitCode::from(err);
    let message = err.to_string();
    log_event!(
        ctx,
        ERROR,
        event_names::INTERNAL_ERROR,
        stage_for(err),
        message.as_str(),
        error_code = err.code(),
        exit_code = exit_code.as_i32()
    );
    match format {
        LogFormat::Jsonl => eprintln!("{}", StructuredError::from(err).to_json()),
        LogFormat::Human => eprintln!("{}", err.format_human()),
    }
    exit_code
}

fn stage_for(err: &Error) -> Stage {
    match err.category() {
        ErrorCategory::Config => Stage::Init,
        ErrorCategory::Input => Stage::Load,
        ErrorCategory::Numerical | ErrorCategory::Backend => Stage::Dispatch,
        ErrorCategory::Io => Stage::Output,
    }
}

fn display_opt(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}
