//! Memory-budgeted batch dispatch.
//!
//! The full grid stays resident on the device while samples stream through
//! in chunks of `B`. For each chunk the backend fills a `G x B` grid-major
//! matrix (`values[g * B + n]`) that is handed to the caller before the next
//! chunk overwrites it.
//!
//! # Sizing
//!
//! ```text
//! budget = floor(max_single_allocation * memory_fraction)
//! cap    = min(budget / (G * 4), budget / 32)      // output, sample buffers
//! B      = min(cap, max_chunk_samples, remaining)
//! ```
//!
//! The grid buffer (`G * 40` bytes) must fit the budget as well, so no single
//! allocation ever exceeds it. Sample and output buffers are reallocated only
//! when `B` changes, which in practice means once more for the final chunk.

use gsd_common::{Error, GridPoint, Result, Sample};
use serde::Serialize;

use crate::backend::{BufferRole, ComputeBackend, HostData, KernelArgs, KernelSource};
use crate::logging::event_names;

const OUTPUT_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Byte budget for a single device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryBudget {
    pub max_single_allocation: u64,
    pub fraction: f64,
    pub budget_bytes: u64,
}

impl MemoryBudget {
    pub fn new(max_single_allocation: u64, fraction: f64) -> Result<Self> {
        if !(fraction.is_finite() && fraction > 0.0 && fraction <= 1.0) {
            return Err(Error::Config(format!(
                "memory_fraction must be in (0, 1], got {fraction}"
            )));
        }
        let budget_bytes = (max_single_allocation as f64 * fraction).floor() as u64;
        Ok(Self {
            max_single_allocation,
            fraction,
            budget_bytes: budget_bytes.min(max_single_allocation),
        })
    }

    /// Fail unless the resident grid buffer fits the budget.
    pub fn check_grid(&self, n_grid: usize) -> Result<u64> {
        let required = (n_grid as u64).saturating_mul(GridPoint::DEVICE_BYTES as u64);
        if required > self.budget_bytes {
            return Err(Error::MemoryBudget {
                budget_bytes: self.budget_bytes,
                required_bytes: required,
                what: format!("a grid of {n_grid} points"),
            });
        }
        Ok(required)
    }

    /// Largest chunk whose sample and output buffers both fit the budget.
    pub fn sample_cap(&self, n_grid: usize) -> Result<usize> {
        let row_bytes = (n_grid as u64).saturating_mul(OUTPUT_BYTES).max(1);
        let by_output = self.budget_bytes / row_bytes;
        let by_samples = self.budget_bytes / Sample::DEVICE_BYTES as u64;
        let cap = by_output.min(by_samples);
        if cap == 0 {
            let (required, what) = if by_output == 0 {
                (row_bytes, "the output of a single sample".to_string())
            } else {
                (Sample::DEVICE_BYTES as u64, "a single sample".to_string())
            };
            return Err(Error::MemoryBudget {
                budget_bytes: self.budget_bytes,
                required_bytes: required,
                what,
            });
        }
        Ok(usize::try_from(cap).unwrap_or(usize::MAX))
    }
}

/// Tuning knobs for a dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DispatchOptions {
    /// Share of the device's max single allocation the run may use.
    pub memory_fraction: f64,
    /// Hard cap on samples per chunk, below the budget-derived cap.
    pub max_chunk_samples: Option<usize>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            memory_fraction: 0.7,
            max_chunk_samples: None,
        }
    }
}

/// One chunk's results, borrowed until the callback returns.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOutput<'a> {
    /// Position of the chunk's first sample in the dispatched sequence.
    pub offset: usize,
    pub n_samples: usize,
    pub n_grid: usize,
    /// Grid-major: `values[g * n_samples + n]`.
    pub values: &'a [f32],
}

impl<'a> ChunkOutput<'a> {
    pub fn value(&self, grid_index: usize, sample: usize) -> f32 {
        self.values[grid_index * self.n_samples + sample]
    }

    /// One row per grid point, `n_samples` values each.
    pub fn rows(&self) -> impl Iterator<Item = &'a [f32]> {
        let values: &'a [f32] = self.values;
        values[..self.n_grid * self.n_samples].chunks(self.n_samples.max(1))
    }
}

/// Counters for one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub device_name: String,
    pub budget_bytes: u64,
    pub grid_points: usize,
    pub samples: usize,
    pub chunks: usize,
    /// Chunk size cap in effect (B before the final short chunk).
    pub chunk_cap: usize,
    /// Times the sample and output buffers were (re)allocated.
    pub reallocations: usize,
    /// Largest single allocation requested.
    pub peak_allocation_bytes: u64,
}

/// Drives a backend over the grid, one memory-bounded chunk at a time.
pub struct BatchDispatcher<'b, B: ComputeBackend + ?Sized> {
    backend: &'b mut B,
    options: DispatchOptions,
}

impl<'b, B: ComputeBackend + ?Sized> BatchDispatcher<'b, B> {
    pub fn new(backend: &'b mut B, options: DispatchOptions) -> Self {
        Self { backend, options }
    }

    /// Evaluate every sample against every grid point.
    pub fn run<F>(
        &mut self,
        kernel: &KernelSource,
        grid: &[GridPoint],
        samples: &[Sample],
        on_chunk: F,
    ) -> Result<DispatchStats>
    where
        F: FnMut(ChunkOutput<'_>) -> Result<()>,
    {
        let all: Vec<usize> = (0..samples.len()).collect();
        self.run_indexed(kernel, grid, samples, &all, on_chunk)
    }

    /// Evaluate `samples[pending[i]]` for each `i`, in order. Chunk offsets
    /// index into `pending`, not into `samples`.
    pub fn run_indexed<F>(
        &mut self,
        kernel: &KernelSource,
        grid: &[GridPoint],
        samples: &[Sample],
        pending: &[usize],
        mut on_chunk: F,
    ) -> Result<DispatchStats>
    where
        F: FnMut(ChunkOutput<'_>) -> Result<()>,
    {
        let mut stats = DispatchStats {
            grid_points: grid.len(),
            samples: pending.len(),
            ..DispatchStats::default()
        };
        if pending.is_empty() {
            return Ok(stats);
        }
        if grid.is_empty() {
            return Err(Error::EmptyGrid {
                pending: pending.len(),
            });
        }
        if let Some(&bad) = pending.iter().find(|&&i| i >= samples.len()) {
            return Err(Error::Config(format!(
                "pending sample index {bad} out of range for {} samples",
                samples.len()
            )));
        }

        let limits = self.backend.initialize()?;
        let max_alloc = self.backend.max_single_allocation_size()?;
        let budget = MemoryBudget::new(max_alloc, self.options.memory_fraction)?;
        let grid_bytes = budget.check_grid(grid.len())?;
        let mut cap = budget.sample_cap(grid.len())?;
        if let Some(limit) = self.options.max_chunk_samples {
            if limit == 0 {
                return Err(Error::Config("max_chunk_samples must be at least 1".into()));
            }
            cap = cap.min(limit);
        }
        stats.device_name = limits.device_name;
        stats.budget_bytes = budget.budget_bytes;
        stats.chunk_cap = cap;

        tracing::info!(
            target: event_names::BACKEND_INITIALIZED,
            stage = "dispatch",
            backend = self.backend.name(),
            device = %stats.device_name,
            max_single_allocation = max_alloc,
            budget_bytes = budget.budget_bytes,
            chunk_cap = cap as u64,
            message = "backend initialized"
        );

        self.backend.compile(kernel)?;
        self.backend.allocate(BufferRole::Grid, grid_bytes)?;
        self.backend.upload(HostData::Grid(grid))?;
        stats.peak_allocation_bytes = grid_bytes;

        let n_grid = grid.len();
        let mut staging: Vec<Sample> = Vec::with_capacity(cap.min(pending.len()));
        let mut host_out: Vec<f32> = Vec::new();
        let mut current_b = 0usize;
        let mut offset = 0usize;

        while offset < pending.len() {
            let b = cap.min(pending.len() - offset);
            if b != current_b {
                let sample_bytes = (b * Sample::DEVICE_BYTES) as u64;
                let output_bytes = (b as u64) * (n_grid as u64) * OUTPUT_BYTES;
                self.backend.allocate(BufferRole::Samples, sample_bytes)?;
                self.backend.allocate(BufferRole::Output, output_bytes)?;
                host_out.resize(b * n_grid, 0.0);
                stats.reallocations += 1;
                stats.peak_allocation_bytes = stats
                    .peak_allocation_bytes
                    .max(sample_bytes)
                    .max(output_bytes);
                current_b = b;
            }

            staging.clear();
            staging.extend(pending[offset..offset + b].iter().map(|&i| samples[i]));
            self.backend.upload(HostData::Samples(&staging))?;
            self.backend.set_arguments(KernelArgs {
                n_grid,
                n_samples: b,
            })?;
            self.backend.enqueue(n_grid)?;
            self.backend.synchronize()?;
            self.backend.download(BufferRole::Output, &mut host_out)?;

            on_chunk(ChunkOutput {
                offset,
                n_samples: b,
                n_grid,
                values: &host_out,
            })?;

            tracing::debug!(
                target: event_names::DISPATCH_CHUNK,
                stage = "dispatch",
                chunk = stats.chunks as u64,
                offset = offset as u64,
                chunk_samples = b as u64,
                message = "chunk evaluated"
            );
            stats.chunks += 1;
            offset += b;
        }

        tracing::info!(
            target: event_names::DISPATCH_FINISHED,
            stage = "dispatch",
            chunks = stats.chunks as u64,
            samples = stats.samples as u64,
            reallocations = stats.reallocations as u64,
            message = "grid search finished"
        );
        Ok(stats)
    }
}
