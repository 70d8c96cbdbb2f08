//! Hybrid estimation: closed form where possible, grid search otherwise.
//!
//! 1. Every sample is classified. Closed-form samples are finished here.
//! 2. The remaining samples go through the [`BatchDispatcher`] against the
//!    full grid, chunk by chunk.
//! 3. A [`Reducer`] keeps the argmax per pending sample across chunks.
//!
//! Results come back in input order, one per sample.

use std::time::Instant;

use gsd_common::{Error, GridPoint, Result, Sample};
use gsd_math::{BetaShape, CategoryCounts};
use serde::Serialize;

use crate::backend::{ComputeBackend, KernelKind, KernelSource};
use crate::classify::{classify, Classification, ClosedFormCase};
use crate::config::EstimatorConfig;
use crate::dispatch::{BatchDispatcher, DispatchStats};
use crate::logging::event_names;
use crate::reduce::Reducer;

/// How a sample's estimate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimate {
    /// Exact estimate from a degenerate pattern; no grid involved.
    ClosedForm {
        case: ClosedFormCase,
        value: f64,
        flag: u8,
    },
    /// Maximum-likelihood grid point.
    GridSearch {
        grid_index: usize,
        psi: f32,
        rho: f32,
        log_likelihood: f32,
    },
}

impl Estimate {
    pub fn is_closed_form(&self) -> bool {
        matches!(self, Estimate::ClosedForm { .. })
    }

    pub fn grid_index(&self) -> Option<usize> {
        match self {
            Estimate::GridSearch { grid_index, .. } => Some(*grid_index),
            Estimate::ClosedForm { .. } => None,
        }
    }
}

/// The estimate for one input sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EstimationResult {
    /// Position of the sample in the input.
    pub index: usize,
    pub sample: Sample,
    pub estimate: Estimate,
}

/// Counters for one estimation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub samples: usize,
    pub single_step: usize,
    pub one_five_mixture: usize,
    pub grid_search: usize,
    pub grid_points: usize,
    pub kernel: String,
    pub dispatch: DispatchStats,
    pub elapsed_ms: u64,
}

impl RunStats {
    pub fn closed_form(&self) -> usize {
        self.single_step + self.one_five_mixture
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimationReport {
    pub results: Vec<EstimationResult>,
    pub stats: RunStats,
}

/// Runs the hybrid estimator on an injected compute backend.
pub struct Estimator<B: ComputeBackend> {
    backend: B,
    config: EstimatorConfig,
}

impl<B: ComputeBackend> Estimator<B> {
    pub fn new(backend: B, config: EstimatorConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Estimate every sample. `grid` may be empty when no sample needs it.
    pub fn run(&mut self, samples: &[Sample], grid: &[GridPoint]) -> Result<EstimationReport> {
        let started = Instant::now();
        let division = self.config.closed_form_division;
        let mut stats = RunStats {
            samples: samples.len(),
            grid_points: grid.len(),
            kernel: self.config.kernel.to_string(),
            ..RunStats::default()
        };

        let mut estimates: Vec<Option<Estimate>> = Vec::with_capacity(samples.len());
        let mut pending: Vec<usize> = Vec::new();
        for (index, sample) in samples.iter().enumerate() {
            match classify(sample) {
                Classification::ClosedForm(cf) => {
                    tracing::debug!(
                        target: event_names::CLASSIFY_CASE,
                        stage = "classify",
                        index = index as u64,
                        sample = %sample,
                        case = %cf.case,
                        message = "sample classified"
                    );
                    match cf.case {
                        ClosedFormCase::SingleStep => stats.single_step += 1,
                        ClosedFormCase::OneFiveMixture => stats.one_five_mixture += 1,
                    }
                    estimates.push(Some(Estimate::ClosedForm {
                        case: cf.case,
                        value: cf.value(division),
                        flag: cf.flag(),
                    }));
                }
                Classification::GridSearch => {
                    tracing::debug!(
                        target: event_names::CLASSIFY_CASE,
                        stage = "classify",
                        index = index as u64,
                        sample = %sample,
                        case = "grid_search",
                        message = "sample classified"
                    );
                    pending.push(index);
                    estimates.push(None);
                }
            }
        }
        stats.grid_search = pending.len();

        tracing::info!(
            target: event_names::CLASSIFY_SUMMARY,
            stage = "classify",
            samples = samples.len() as u64,
            single_step = stats.single_step as u64,
            one_five_mixture = stats.one_five_mixture as u64,
            grid_search = stats.grid_search as u64,
            message = "classification finished"
        );

        if !pending.is_empty() {
            if grid.is_empty() {
                return Err(Error::EmptyGrid {
                    pending: pending.len(),
                });
            }
            self.validate_grid(grid)?;
            self.validate_pending(samples, &pending)?;

            let kernel = KernelSource::builtin(self.config.kernel);
            let mut reducer = Reducer::new(pending.len());
            stats.dispatch = BatchDispatcher::new(&mut self.backend, self.config.dispatch_options())
                .run_indexed(&kernel, grid, samples, &pending, |chunk| {
                    reducer.absorb(&chunk);
                    Ok(())
                })?;

            for (slot, best) in reducer.finish().into_iter().enumerate() {
                let index = pending[slot];
                let best = best.ok_or_else(|| {
                    Error::NumericalDomain(format!("sample {index} received no grid evaluations"))
                })?;
                let point = &grid[best.grid_index];
                estimates[index] = Some(Estimate::GridSearch {
                    grid_index: best.grid_index,
                    psi: point.psi,
                    rho: point.rho,
                    log_likelihood: best.log_likelihood,
                });
            }
        }

        let results = samples
            .iter()
            .zip(estimates)
            .enumerate()
            .map(|(index, (sample, estimate))| {
                estimate
                    .map(|estimate| EstimationResult {
                        index,
                        sample: *sample,
                        estimate,
                    })
                    .ok_or_else(|| {
                        Error::NumericalDomain(format!("sample {index} was never estimated"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(EstimationReport { results, stats })
    }

    /// Reject grid points the kernel cannot evaluate before any dispatch.
    fn validate_grid(&self, grid: &[GridPoint]) -> Result<()> {
        for (index, point) in grid.iter().enumerate() {
            point.validate(index)?;
            if self.config.kernel == KernelKind::BetaBinomial {
                BetaShape::from_grid_point(point).map_err(|e| match e {
                    Error::NumericalDomain(msg) => {
                        Error::NumericalDomain(format!("grid point {index}: {msg}"))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    /// The beta-binomial kernel reads sample values as categories in `0..=4`.
    fn validate_pending(&self, samples: &[Sample], pending: &[usize]) -> Result<()> {
        if self.config.kernel != KernelKind::BetaBinomial {
            return Ok(());
        }
        for &index in pending {
            CategoryCounts::from_sample(&samples[index]).map_err(|e| match e {
                Error::NumericalDomain(msg) => {
                    Error::NumericalDomain(format!("sample {index}: {msg}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}
