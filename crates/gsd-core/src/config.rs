//! Estimator configuration.
//!
//! A TOML file with every field optional:
//!
//! ```toml
//! memory_fraction = 0.7
//! max_allocation_bytes = 1073741824
//! max_chunk_samples = 4096
//! kernel = "grades"                 # or "beta-binomial"
//! grid_record_floats = 7
//! closed_form_division = "exact"    # or "truncate"
//! threads = 8
//! ```
//!
//! Resolution order: CLI `--config` → `GSD_CONFIG` → XDG config directory →
//! built-in defaults. Command-line flags are applied on top of the file.

use std::path::{Path, PathBuf};

use gsd_common::{Error, Result, CATEGORIES};
use serde::{Deserialize, Serialize};

use crate::backend::KernelKind;
use crate::dispatch::DispatchOptions;

/// Environment variable naming a config file.
pub const ENV_CONFIG_PATH: &str = "GSD_CONFIG";

/// Application name for XDG directories.
const APP_NAME: &str = "gsd-mle";

const CONFIG_FILENAME: &str = "config.toml";

/// Floats per grid record that carry data: psi, rho and the grades.
pub const MIN_GRID_RECORD_FLOATS: usize = 2 + CATEGORIES;

/// How closed-form estimates turn their exact rational into a number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ClosedFormDivision {
    /// Floating-point division.
    #[default]
    Exact,
    /// Integer floor division of the counts.
    Truncate,
}

impl std::fmt::Display for ClosedFormDivision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosedFormDivision::Exact => write!(f, "exact"),
            ClosedFormDivision::Truncate => write!(f, "truncate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorConfig {
    /// Share of the device's largest single allocation a run may use.
    pub memory_fraction: f64,
    /// Allocation limit reported by the CPU backend.
    pub max_allocation_bytes: u64,
    /// Upper bound on samples per chunk.
    pub max_chunk_samples: Option<usize>,
    pub kernel: KernelKind,
    /// f32 values per grid file record; extras past psi, rho and the grades
    /// are ignored.
    pub grid_record_floats: usize,
    pub closed_form_division: ClosedFormDivision,
    /// Worker threads for the CPU backend.
    pub threads: Option<usize>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            memory_fraction: 0.7,
            max_allocation_bytes: crate::backend::CpuBackend::DEFAULT_MAX_ALLOCATION,
            max_chunk_samples: None,
            kernel: KernelKind::Grades,
            grid_record_floats: MIN_GRID_RECORD_FLOATS,
            closed_form_division: ClosedFormDivision::Exact,
            threads: None,
        }
    }
}

impl EstimatorConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| match e {
                Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
                other => other,
            })
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.memory_fraction.is_finite()
            && self.memory_fraction > 0.0
            && self.memory_fraction <= 1.0)
        {
            return Err(Error::Config(format!(
                "memory_fraction must be in (0, 1], got {}",
                self.memory_fraction
            )));
        }
        if self.max_allocation_bytes == 0 {
            return Err(Error::Config("max_allocation_bytes must be positive".into()));
        }
        if self.max_chunk_samples == Some(0) {
            return Err(Error::Config("max_chunk_samples must be at least 1".into()));
        }
        if self.grid_record_floats < MIN_GRID_RECORD_FLOATS {
            return Err(Error::Config(format!(
                "grid_record_floats must be at least {MIN_GRID_RECORD_FLOATS}, got {}",
                self.grid_record_floats
            )));
        }
        if self.threads == Some(0) {
            return Err(Error::Config("threads must be at least 1".into()));
        }
        Ok(())
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            memory_fraction: self.memory_fraction,
            max_chunk_samples: self.max_chunk_samples,
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub memory_fraction: Option<f64>,
    pub max_allocation_bytes: Option<u64>,
    pub max_chunk_samples: Option<usize>,
    pub kernel: Option<KernelKind>,
    pub closed_form_division: Option<ClosedFormDivision>,
    pub threads: Option<usize>,
}

impl ConfigOverrides {
    /// Apply the set values, then re-validate.
    pub fn apply(&self, config: &mut EstimatorConfig) -> Result<()> {
        if let Some(v) = self.memory_fraction {
            config.memory_fraction = v;
        }
        if let Some(v) = self.max_allocation_bytes {
            config.max_allocation_bytes = v;
        }
        if let Some(v) = self.max_chunk_samples {
            config.max_chunk_samples = Some(v);
        }
        if let Some(v) = self.kernel {
            config.kernel = v;
        }
        if let Some(v) = self.closed_form_division {
            config.closed_form_division = v;
        }
        if let Some(v) = self.threads {
            config.threads = Some(v);
        }
        config.validate()
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,
    /// Named by the GSD_CONFIG environment variable.
    Environment,
    /// Found in the XDG config directory.
    XdgConfig,
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A resolved configuration with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EstimatorConfig,
    pub source: ConfigSource,
    pub path: Option<PathBuf>,
}

/// Find the config file to use.
///
/// An explicit CLI or environment path must exist; the XDG location is only
/// used when present.
pub fn resolve_config_path(
    cli_path: Option<&Path>,
    env_lookup: impl Fn(&str) -> Option<String>,
    xdg_dir: Option<PathBuf>,
) -> Result<(Option<PathBuf>, ConfigSource)> {
    if let Some(path) = cli_path {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok((Some(path.to_path_buf()), ConfigSource::CliArgument));
    }

    if let Some(env_path) = env_lookup(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(env_path);
        if !path.is_file() {
            return Err(Error::Config(format!(
                "{ENV_CONFIG_PATH} points to a missing file: {}",
                path.display()
            )));
        }
        return Ok((Some(path), ConfigSource::Environment));
    }

    if let Some(dir) = xdg_dir {
        let path = dir.join(CONFIG_FILENAME);
        if path.is_file() {
            return Ok((Some(path), ConfigSource::XdgConfig));
        }
    }

    Ok((None, ConfigSource::BuiltinDefault))
}

/// XDG config directory for gsd-mle.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Resolve, load and override the configuration for this process.
pub fn load_config(cli_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<LoadedConfig> {
    let (path, source) =
        resolve_config_path(cli_path, |key| std::env::var(key).ok(), xdg_config_dir())?;
    let mut config = match &path {
        Some(p) => EstimatorConfig::load(p)?,
        None => EstimatorConfig::default(),
    };
    overrides.apply(&mut config)?;
    Ok(LoadedConfig {
        config,
        source,
        path,
    })
}
