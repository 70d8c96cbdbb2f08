//! CPU compute backend.
//!
//! Emulates a device on the host with rayon: one parallel task per grid
//! point, each filling its row of the grid-major output. Buffers, limits and
//! the deferred execution of `enqueue` behave like a real device so the
//! dispatcher is exercised the same way on every machine.

use gsd_common::{GridPoint, Result, Sample};
use gsd_math::{BetaBinomialTerms, BetaShape, CategoryCounts, LogGrades};
use rayon::prelude::*;

use super::{
    backend_error, status, BufferRole, ComputeBackend, DeviceLimits, HostData, KernelArgs,
    KernelKind, KernelSource,
};

const NAME: &str = "cpu";

#[derive(Debug)]
struct Buffer<T> {
    /// Allocated size in bytes.
    capacity: u64,
    data: Vec<T>,
}

/// CPU compute backend using rayon for parallelism.
pub struct CpuBackend {
    max_allocation: u64,
    n_threads: Option<usize>,
    pool: Option<rayon::ThreadPool>,
    kernel: Option<KernelKind>,
    grid: Option<Buffer<GridPoint>>,
    samples: Option<Buffer<Sample>>,
    output: Option<Buffer<f32>>,
    args: Option<KernelArgs>,
    pending: bool,
}

impl CpuBackend {
    /// Default emulated allocation limit: 1 GiB.
    pub const DEFAULT_MAX_ALLOCATION: u64 = 1 << 30;

    pub fn new() -> Self {
        Self::with_max_allocation(Self::DEFAULT_MAX_ALLOCATION)
    }

    /// Create a backend that reports `max_allocation` as its device limit.
    pub fn with_max_allocation(max_allocation: u64) -> Self {
        Self {
            max_allocation,
            n_threads: None,
            pool: None,
            kernel: None,
            grid: None,
            samples: None,
            output: None,
            args: None,
            pending: false,
        }
    }

    /// Fix the worker thread count (default: rayon's choice).
    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    fn require_initialized(&self, stage: &str) -> Result<&rayon::ThreadPool> {
        self.pool.as_ref().ok_or_else(|| {
            backend_error(NAME, stage, status::INVALID_CONTEXT, "backend not initialized")
        })
    }

    fn run_kernel(&mut self) -> Result<()> {
        let (Some(kind), Some(args)) = (self.kernel, self.args) else {
            return Err(backend_error(
                NAME,
                "synchronize",
                status::INVALID_KERNEL_ARGS,
                "no kernel arguments set",
            ));
        };
        let (Some(grid), Some(samples), Some(output), Some(pool)) = (
            self.grid.as_ref(),
            self.samples.as_ref(),
            self.output.as_mut(),
            self.pool.as_ref(),
        ) else {
            return Err(backend_error(
                NAME,
                "synchronize",
                status::INVALID_MEM_OBJECT,
                "kernel buffers were released",
            ));
        };

        let grid = &grid.data[..args.n_grid];
        let samples = &samples.data[..args.n_samples];
        let rows = &mut output.data[..args.n_grid * args.n_samples];

        pool.install(|| match kind {
            KernelKind::Grades => {
                rows.par_chunks_mut(args.n_samples)
                    .zip(grid.par_iter())
                    .for_each(|(row, point)| {
                        let logs = LogGrades::from_grid_point(point);
                        for (out, sample) in row.iter_mut().zip(samples) {
                            *out = logs.log_likelihood(sample) as f32;
                        }
                    });
                Ok(())
            }
            KernelKind::BetaBinomial => {
                let counts = samples
                    .par_iter()
                    .map(CategoryCounts::from_sample)
                    .collect::<Result<Vec<_>>>()?;
                rows.par_chunks_mut(args.n_samples)
                    .zip(grid.par_iter())
                    .try_for_each(|(row, point)| {
                        let terms = BetaBinomialTerms::new(&BetaShape::from_grid_point(point)?);
                        for (out, c) in row.iter_mut().zip(&counts) {
                            *out = terms.log_likelihood(c) as f32;
                        }
                        Ok(())
                    })
            }
        })
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self) -> Result<DeviceLimits> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = self.n_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder.build().map_err(|e| {
            backend_error(NAME, "initialize", status::OUT_OF_RESOURCES, e.to_string())
        })?;
        let device_name = format!("host ({} threads)", pool.current_num_threads());
        self.pool = Some(pool);
        Ok(DeviceLimits {
            device_name,
            max_single_allocation: self.max_allocation,
        })
    }

    fn max_single_allocation_size(&self) -> Result<u64> {
        self.require_initialized("query_limits")?;
        Ok(self.max_allocation)
    }

    fn compile(&mut self, kernel: &KernelSource) -> Result<()> {
        self.require_initialized("compile")?;
        if kernel.source.trim().is_empty() {
            return Err(backend_error(
                NAME,
                "compile",
                status::BUILD_PROGRAM_FAILURE,
                "empty kernel source",
            ));
        }
        if !kernel.declares_entry_point() {
            return Err(backend_error(
                NAME,
                "compile",
                status::INVALID_KERNEL_NAME,
                format!("kernel source does not declare `{}`", kernel.entry_point),
            ));
        }
        self.kernel = Some(kernel.kind);
        self.args = None;
        Ok(())
    }

    fn allocate(&mut self, role: BufferRole, bytes: u64) -> Result<()> {
        self.require_initialized("allocate")?;
        if bytes == 0 || bytes > self.max_allocation {
            return Err(backend_error(
                NAME,
                "allocate",
                status::INVALID_BUFFER_SIZE,
                format!(
                    "{role} buffer of {bytes} bytes outside 1..={} bytes",
                    self.max_allocation
                ),
            ));
        }
        // Previous contents and bound arguments do not survive reallocation.
        self.args = None;
        match role {
            BufferRole::Grid => {
                self.grid = Some(Buffer {
                    capacity: bytes,
                    data: Vec::new(),
                })
            }
            BufferRole::Samples => {
                self.samples = Some(Buffer {
                    capacity: bytes,
                    data: Vec::new(),
                })
            }
            BufferRole::Output => {
                let floats = bytes / std::mem::size_of::<f32>() as u64;
                let len = usize::try_from(floats).map_err(|_| {
                    backend_error(
                        NAME,
                        "allocate",
                        status::MEM_OBJECT_ALLOCATION_FAILURE,
                        format!("{bytes}-byte output buffer exceeds host address space"),
                    )
                })?;
                self.output = Some(Buffer {
                    capacity: bytes,
                    data: vec![0.0; len],
                })
            }
        }
        Ok(())
    }

    fn upload(&mut self, data: HostData<'_>) -> Result<()> {
        self.require_initialized("upload")?;
        let role = data.role();
        let needed = data.device_bytes();
        let capacity = match role {
            BufferRole::Grid => self.grid.as_ref().map(|b| b.capacity),
            BufferRole::Samples => self.samples.as_ref().map(|b| b.capacity),
            BufferRole::Output => None,
        };
        let Some(capacity) = capacity else {
            return Err(backend_error(
                NAME,
                "upload",
                status::INVALID_MEM_OBJECT,
                format!("no {role} buffer allocated"),
            ));
        };
        if needed > capacity {
            return Err(backend_error(
                NAME,
                "upload",
                status::INVALID_VALUE,
                format!("{needed} bytes do not fit the {capacity}-byte {role} buffer"),
            ));
        }
        match data {
            HostData::Grid(points) => {
                if let Some(buf) = self.grid.as_mut() {
                    buf.data.clear();
                    buf.data.extend_from_slice(points);
                }
            }
            HostData::Samples(samples) => {
                if let Some(buf) = self.samples.as_mut() {
                    buf.data.clear();
                    buf.data.extend_from_slice(samples);
                }
            }
        }
        Ok(())
    }

    fn set_arguments(&mut self, args: KernelArgs) -> Result<()> {
        if self.kernel.is_none() {
            return Err(backend_error(
                NAME,
                "set_arguments",
                status::INVALID_KERNEL,
                "no kernel compiled",
            ));
        }
        if args.n_grid == 0 || args.n_samples == 0 {
            return Err(backend_error(
                NAME,
                "set_arguments",
                status::INVALID_ARG_VALUE,
                format!(
                    "empty dispatch ({} grid points, {} samples)",
                    args.n_grid, args.n_samples
                ),
            ));
        }
        let grid_len = self.grid.as_ref().map_or(0, |b| b.data.len());
        let samples_len = self.samples.as_ref().map_or(0, |b| b.data.len());
        let output_len = self.output.as_ref().map_or(0, |b| b.data.len());
        let cells = args.n_grid.checked_mul(args.n_samples).unwrap_or(usize::MAX);
        if args.n_grid > grid_len || args.n_samples > samples_len || cells > output_len {
            return Err(backend_error(
                NAME,
                "set_arguments",
                status::INVALID_ARG_SIZE,
                format!(
                    "arguments need {} grid points, {} samples and {} output cells; \
                     buffers hold {grid_len}, {samples_len} and {output_len}",
                    args.n_grid, args.n_samples, cells
                ),
            ));
        }
        self.args = Some(args);
        Ok(())
    }

    fn enqueue(&mut self, work_size: usize) -> Result<()> {
        self.require_initialized("enqueue")?;
        let Some(args) = self.args else {
            return Err(backend_error(
                NAME,
                "enqueue",
                status::INVALID_KERNEL_ARGS,
                "kernel arguments not set",
            ));
        };
        if work_size != args.n_grid {
            return Err(backend_error(
                NAME,
                "enqueue",
                status::INVALID_GLOBAL_WORK_SIZE,
                format!("work size {work_size} != {} grid points", args.n_grid),
            ));
        }
        self.pending = true;
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        if !self.pending {
            return Ok(());
        }
        self.pending = false;
        self.run_kernel()
    }

    fn download(&mut self, role: BufferRole, out: &mut [f32]) -> Result<()> {
        if role != BufferRole::Output {
            return Err(backend_error(
                NAME,
                "download",
                status::INVALID_MEM_OBJECT,
                format!("{role} buffer is write-only from the host"),
            ));
        }
        if self.pending {
            return Err(backend_error(
                NAME,
                "download",
                status::INVALID_OPERATION,
                "queued work has not been synchronized",
            ));
        }
        let Some(output) = self.output.as_ref() else {
            return Err(backend_error(
                NAME,
                "download",
                status::INVALID_MEM_OBJECT,
                "no output buffer allocated",
            ));
        };
        if out.len() > output.data.len() {
            return Err(backend_error(
                NAME,
                "download",
                status::INVALID_VALUE,
                format!(
                    "requested {} floats from a {}-float buffer",
                    out.len(),
                    output.data.len()
                ),
            ));
        }
        out.copy_from_slice(&output.data[..out.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsd_common::Error;

    fn status_of(err: Error) -> i32 {
        match err {
            Error::Backend { code, .. } => code,
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    fn ready(kind: KernelKind) -> CpuBackend {
        let mut backend = CpuBackend::with_max_allocation(1 << 20).with_threads(2);
        backend.initialize().unwrap();
        backend.compile(&KernelSource::builtin(kind)).unwrap();
        backend
    }

    fn grid() -> Vec<GridPoint> {
        vec![
            GridPoint::new(1.0, 1.0, [0.2; 5]).unwrap(),
            GridPoint::new(2.0, 0.5, [0.6, 0.1, 0.1, 0.1, 0.1]).unwrap(),
            GridPoint::new(0.5, 2.0, [0.1, 0.1, 0.1, 0.1, 0.6]).unwrap(),
        ]
    }

    fn run(backend: &mut CpuBackend, grid: &[GridPoint], samples: &[Sample]) -> Vec<f32> {
        backend
            .allocate(BufferRole::Grid, HostData::Grid(grid).device_bytes())
            .unwrap();
        backend.upload(HostData::Grid(grid)).unwrap();
        backend
            .allocate(BufferRole::Samples, HostData::Samples(samples).device_bytes())
            .unwrap();
        backend.upload(HostData::Samples(samples)).unwrap();
        let cells = grid.len() * samples.len();
        backend
            .allocate(BufferRole::Output, (cells * 4) as u64)
            .unwrap();
        backend
            .set_arguments(KernelArgs {
                n_grid: grid.len(),
                n_samples: samples.len(),
            })
            .unwrap();
        backend.enqueue(grid.len()).unwrap();
        backend.synchronize().unwrap();
        let mut out = vec![0.0; cells];
        backend.download(BufferRole::Output, &mut out).unwrap();
        out
    }

    #[test]
    fn grades_output_is_grid_major() {
        let mut backend = ready(KernelKind::Grades);
        let grid = grid();
        let samples = [Sample::new([6, 1, 1, 1, 1]), Sample::new([1, 1, 1, 1, 6])];
        let out = run(&mut backend, &grid, &samples);

        let b = samples.len();
        for (g, point) in grid.iter().enumerate() {
            for (n, sample) in samples.iter().enumerate() {
                let expected = gsd_math::grades::log_likelihood(sample, point) as f32;
                assert_eq!(out[g * b + n], expected, "g={g} n={n}");
            }
        }
        // Skewed-low grid point beats the others for the first sample.
        assert!(out[b] > out[0] && out[b] > out[2 * b]);
    }

    #[test]
    fn beta_binomial_kernel_matches_model() {
        let mut backend = ready(KernelKind::BetaBinomial);
        let grid = grid();
        let samples = [Sample::new([0, 2, 0, 0, 1]), Sample::new([4, 4, 3, 4, 2])];
        let out = run(&mut backend, &grid, &samples);
        let b = samples.len();
        for (g, point) in grid.iter().enumerate() {
            let shape = BetaShape::from_grid_point(point).unwrap();
            for (n, sample) in samples.iter().enumerate() {
                let counts = CategoryCounts::from_sample(sample).unwrap();
                let expected = gsd_math::beta_binomial::log_likelihood(&counts, &shape) as f32;
                assert_eq!(out[g * b + n], expected, "g={g} n={n}");
            }
        }
    }

    #[test]
    fn beta_binomial_buckets_sample_values() {
        let mut backend = ready(KernelKind::BetaBinomial);
        let grid = [GridPoint::new(2.0, 3.0, [0.2; 5]).unwrap()];
        // Values 0, 1, 1, 2, 3 give c = [1, 2, 1, 1, 0] whatever their order.
        let samples = [Sample::new([0, 2, 1, 3, 1]), Sample::new([1, 3, 0, 1, 2])];
        let out = run(&mut backend, &grid, &samples);

        let ln = f64::ln;
        let norm = ln(5.0) + ln(6.0) + ln(7.0) + ln(8.0);
        let per_category = [
            ln(3.0) + ln(4.0) + ln(5.0) + ln(6.0),
            ln(2.0) + ln(3.0) + ln(4.0) + ln(5.0),
            ln(2.0) + ln(3.0) + ln(3.0) + ln(4.0),
            ln(2.0) + ln(3.0) + ln(4.0) + ln(3.0),
        ];
        let expected = -5.0 * norm
            + per_category[0]
            + 2.0 * per_category[1]
            + per_category[2]
            + per_category[3];
        assert!((f64::from(out[0]) - expected).abs() < 1e-4, "{} vs {expected}", out[0]);
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn beta_binomial_rejects_values_outside_categories() {
        let mut backend = ready(KernelKind::BetaBinomial);
        let grid = grid();
        let samples = [Sample::new([0, 1, 2, 3, 4]), Sample::new([0, 1, 2, 3, 5])];
        backend
            .allocate(BufferRole::Grid, HostData::Grid(&grid).device_bytes())
            .unwrap();
        backend.upload(HostData::Grid(&grid)).unwrap();
        backend.allocate(BufferRole::Samples, 64).unwrap();
        backend.upload(HostData::Samples(&samples)).unwrap();
        backend.allocate(BufferRole::Output, 24).unwrap();
        backend
            .set_arguments(KernelArgs {
                n_grid: 3,
                n_samples: 2,
            })
            .unwrap();
        backend.enqueue(3).unwrap();
        let err = backend.synchronize().unwrap_err();
        assert_eq!(err.code(), 30);
    }

    #[test]
    fn beta_binomial_rejects_non_positive_shape() {
        let mut backend = ready(KernelKind::BetaBinomial);
        let grid = [GridPoint::new(0.0, 1.0, [0.2; 5]).unwrap()];
        let samples = [Sample::new([1, 0, 0, 0, 0])];
        backend.allocate(BufferRole::Grid, 40).unwrap();
        backend.upload(HostData::Grid(&grid)).unwrap();
        backend.allocate(BufferRole::Samples, 32).unwrap();
        backend.upload(HostData::Samples(&samples)).unwrap();
        backend.allocate(BufferRole::Output, 4).unwrap();
        backend
            .set_arguments(KernelArgs {
                n_grid: 1,
                n_samples: 1,
            })
            .unwrap();
        backend.enqueue(1).unwrap();
        let err = backend.synchronize().unwrap_err();
        assert_eq!(err.code(), 30);
    }

    #[test]
    fn operations_before_initialize_fail() {
        let mut backend = CpuBackend::new();
        assert_eq!(
            status_of(backend.max_single_allocation_size().unwrap_err()),
            status::INVALID_CONTEXT
        );
        let err = backend
            .compile(&KernelSource::builtin(KernelKind::Grades))
            .unwrap_err();
        assert_eq!(status_of(err), status::INVALID_CONTEXT);
    }

    #[test]
    fn compile_rejects_unknown_entry_point_and_empty_source() {
        let mut backend = CpuBackend::new();
        backend.initialize().unwrap();

        let mut kernel = KernelSource::builtin(KernelKind::Grades);
        kernel.entry_point = "estimate".into();
        assert_eq!(
            status_of(backend.compile(&kernel).unwrap_err()),
            status::INVALID_KERNEL_NAME
        );

        kernel.source = "   ".into();
        assert_eq!(
            status_of(backend.compile(&kernel).unwrap_err()),
            status::BUILD_PROGRAM_FAILURE
        );
    }

    #[test]
    fn allocation_limit_is_enforced() {
        let mut backend = CpuBackend::with_max_allocation(1024);
        let limits = backend.initialize().unwrap();
        assert_eq!(limits.max_single_allocation, 1024);
        assert!(backend.allocate(BufferRole::Output, 1024).is_ok());
        assert_eq!(
            status_of(backend.allocate(BufferRole::Output, 1025).unwrap_err()),
            status::INVALID_BUFFER_SIZE
        );
        assert_eq!(
            status_of(backend.allocate(BufferRole::Samples, 0).unwrap_err()),
            status::INVALID_BUFFER_SIZE
        );
    }

    #[test]
    fn upload_requires_room() {
        let mut backend = ready(KernelKind::Grades);
        let samples = [Sample::new([1, 1, 1, 1, 1]); 2];
        assert_eq!(
            status_of(backend.upload(HostData::Samples(&samples)).unwrap_err()),
            status::INVALID_MEM_OBJECT
        );
        backend.allocate(BufferRole::Samples, 32).unwrap();
        assert_eq!(
            status_of(backend.upload(HostData::Samples(&samples)).unwrap_err()),
            status::INVALID_VALUE
        );
    }

    #[test]
    fn arguments_must_fit_buffers() {
        let mut backend = ready(KernelKind::Grades);
        let grid = grid();
        let samples = [Sample::new([1, 1, 1, 1, 1])];
        backend.allocate(BufferRole::Grid, 120).unwrap();
        backend.upload(HostData::Grid(&grid)).unwrap();
        backend.allocate(BufferRole::Samples, 32).unwrap();
        backend.upload(HostData::Samples(&samples)).unwrap();
        backend.allocate(BufferRole::Output, 8).unwrap();

        let err = backend
            .set_arguments(KernelArgs {
                n_grid: 3,
                n_samples: 1,
            })
            .unwrap_err();
        assert_eq!(status_of(err), status::INVALID_ARG_SIZE);

        let err = backend
            .set_arguments(KernelArgs {
                n_grid: 0,
                n_samples: 1,
            })
            .unwrap_err();
        assert_eq!(status_of(err), status::INVALID_ARG_VALUE);
    }

    #[test]
    fn enqueue_checks_work_size_and_download_waits_for_sync() {
        let mut backend = ready(KernelKind::Grades);
        let grid = grid();
        let samples = [Sample::new([2, 1, 1, 0, 0])];
        backend.allocate(BufferRole::Grid, 120).unwrap();
        backend.upload(HostData::Grid(&grid)).unwrap();
        backend.allocate(BufferRole::Samples, 32).unwrap();
        backend.upload(HostData::Samples(&samples)).unwrap();
        backend.allocate(BufferRole::Output, 12).unwrap();

        assert_eq!(
            status_of(backend.enqueue(3).unwrap_err()),
            status::INVALID_KERNEL_ARGS
        );
        backend
            .set_arguments(KernelArgs {
                n_grid: 3,
                n_samples: 1,
            })
            .unwrap();
        assert_eq!(
            status_of(backend.enqueue(2).unwrap_err()),
            status::INVALID_GLOBAL_WORK_SIZE
        );
        backend.enqueue(3).unwrap();

        let mut out = [0.0f32; 3];
        assert_eq!(
            status_of(backend.download(BufferRole::Output, &mut out).unwrap_err()),
            status::INVALID_OPERATION
        );
        backend.synchronize().unwrap();
        backend.download(BufferRole::Output, &mut out).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));

        let mut too_long = [0.0f32; 4];
        assert_eq!(
            status_of(backend.download(BufferRole::Output, &mut too_long).unwrap_err()),
            status::INVALID_VALUE
        );
        assert_eq!(
            status_of(backend.download(BufferRole::Grid, &mut out).unwrap_err()),
            status::INVALID_MEM_OBJECT
        );
    }

    #[test]
    fn reallocation_unbinds_arguments() {
        let mut backend = ready(KernelKind::Grades);
        let grid = grid();
        let samples = [Sample::new([1, 2, 0, 0, 0])];
        let _ = run(&mut backend, &grid, &samples);
        backend.allocate(BufferRole::Samples, 64).unwrap();
        assert_eq!(
            status_of(backend.enqueue(3).unwrap_err()),
            status::INVALID_KERNEL_ARGS
        );
    }
}
