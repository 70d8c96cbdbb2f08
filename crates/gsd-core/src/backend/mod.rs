//! Compute backend capability.
//!
//! The dispatcher never talks to a device directly. It drives a
//! [`ComputeBackend`] through the usual accelerator lifecycle:
//!
//! 1. `initialize` and query [`DeviceLimits`]
//! 2. `compile` a [`KernelSource`]
//! 3. `allocate` and `upload` the grid once
//! 4. per chunk: `allocate` (only when the chunk size changes), `upload`
//!    samples, `set_arguments`, `enqueue`, `synchronize`, `download`
//!
//! Every failure is an [`Error::Backend`] carrying the stage it happened in
//! and a device status code with its symbolic name.

mod cpu;
mod kernel;

pub use cpu::CpuBackend;
pub use kernel::{KernelKind, KernelSource};

use gsd_common::{Error, GridPoint, Result, Sample};
use serde::Serialize;

/// Which device buffer an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferRole {
    /// Read-only grid points, uploaded once per run.
    Grid,
    /// The current chunk of samples.
    Samples,
    /// Grid-major log-likelihood matrix for the current chunk.
    Output,
}

impl std::fmt::Display for BufferRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferRole::Grid => write!(f, "grid"),
            BufferRole::Samples => write!(f, "samples"),
            BufferRole::Output => write!(f, "output"),
        }
    }
}

/// Host data for an upload. The variant fixes the buffer it may go to.
#[derive(Debug, Clone, Copy)]
pub enum HostData<'a> {
    Grid(&'a [GridPoint]),
    Samples(&'a [Sample]),
}

impl HostData<'_> {
    pub fn role(&self) -> BufferRole {
        match self {
            HostData::Grid(_) => BufferRole::Grid,
            HostData::Samples(_) => BufferRole::Samples,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostData::Grid(points) => points.len(),
            HostData::Samples(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of this data in the device layout.
    pub fn device_bytes(&self) -> u64 {
        let record = match self {
            HostData::Grid(_) => GridPoint::DEVICE_BYTES,
            HostData::Samples(_) => Sample::DEVICE_BYTES,
        };
        (self.len() as u64).saturating_mul(record as u64)
    }
}

/// Scalar kernel arguments for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KernelArgs {
    /// Grid points to evaluate (the global work size).
    pub n_grid: usize,
    /// Samples in the current chunk (B).
    pub n_samples: usize,
}

/// Limits reported by a backend after initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceLimits {
    pub device_name: String,
    /// Largest single buffer the device will allocate, in bytes.
    pub max_single_allocation: u64,
}

/// A parallel compute device able to run one log-likelihood kernel.
pub trait ComputeBackend {
    /// Short backend name used in diagnostics.
    fn name(&self) -> &str;

    fn initialize(&mut self) -> Result<DeviceLimits>;

    /// Largest single allocation in bytes. Fails before `initialize`.
    fn max_single_allocation_size(&self) -> Result<u64>;

    fn compile(&mut self, kernel: &KernelSource) -> Result<()>;

    /// Allocate (or reallocate) the buffer for `role`, dropping any previous
    /// contents.
    fn allocate(&mut self, role: BufferRole, bytes: u64) -> Result<()>;

    fn upload(&mut self, data: HostData<'_>) -> Result<()>;

    fn set_arguments(&mut self, args: KernelArgs) -> Result<()>;

    /// Queue the kernel over `work_size` grid points. Execution may be
    /// deferred until [`synchronize`](ComputeBackend::synchronize).
    fn enqueue(&mut self, work_size: usize) -> Result<()>;

    /// Block until queued work has finished.
    fn synchronize(&mut self) -> Result<()>;

    /// Copy the leading `out.len()` floats of a buffer back to the host.
    fn download(&mut self, role: BufferRole, out: &mut [f32]) -> Result<()>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn initialize(&mut self) -> Result<DeviceLimits> {
        (**self).initialize()
    }
    fn max_single_allocation_size(&self) -> Result<u64> {
        (**self).max_single_allocation_size()
    }
    fn compile(&mut self, kernel: &KernelSource) -> Result<()> {
        (**self).compile(kernel)
    }
    fn allocate(&mut self, role: BufferRole, bytes: u64) -> Result<()> {
        (**self).allocate(role, bytes)
    }
    fn upload(&mut self, data: HostData<'_>) -> Result<()> {
        (**self).upload(data)
    }
    fn set_arguments(&mut self, args: KernelArgs) -> Result<()> {
        (**self).set_arguments(args)
    }
    fn enqueue(&mut self, work_size: usize) -> Result<()> {
        (**self).enqueue(work_size)
    }
    fn synchronize(&mut self) -> Result<()> {
        (**self).synchronize()
    }
    fn download(&mut self, role: BufferRole, out: &mut [f32]) -> Result<()> {
        (**self).download(role, out)
    }
}

/// Device status codes used by the backends.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const DEVICE_NOT_FOUND: i32 = -1;
    pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
    pub const OUT_OF_RESOURCES: i32 = -5;
    pub const BUILD_PROGRAM_FAILURE: i32 = -11;
    pub const INVALID_VALUE: i32 = -30;
    pub const INVALID_CONTEXT: i32 = -34;
    pub const INVALID_MEM_OBJECT: i32 = -38;
    pub const INVALID_KERNEL_NAME: i32 = -46;
    pub const INVALID_KERNEL: i32 = -48;
    pub const INVALID_ARG_VALUE: i32 = -50;
    pub const INVALID_ARG_SIZE: i32 = -51;
    pub const INVALID_KERNEL_ARGS: i32 = -52;
    pub const INVALID_OPERATION: i32 = -59;
    pub const INVALID_BUFFER_SIZE: i32 = -61;
    pub const INVALID_GLOBAL_WORK_SIZE: i32 = -63;
}

/// Symbolic name of an OpenCL-style status code.
pub fn status_name(code: i32) -> &'static str {
    match code {
        0 => "CL_SUCCESS",
        -1 => "CL_DEVICE_NOT_FOUND",
        -2 => "CL_DEVICE_NOT_AVAILABLE",
        -3 => "CL_COMPILER_NOT_AVAILABLE",
        -4 => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
        -5 => "CL_OUT_OF_RESOURCES",
        -6 => "CL_OUT_OF_HOST_MEMORY",
        -7 => "CL_PROFILING_INFO_NOT_AVAILABLE",
        -8 => "CL_MEM_COPY_OVERLAP",
        -9 => "CL_IMAGE_FORMAT_MISMATCH",
        -10 => "CL_IMAGE_FORMAT_NOT_SUPPORTED",
        -11 => "CL_BUILD_PROGRAM_FAILURE",
        -12 => "CL_MAP_FAILURE",
        -13 => "CL_MISALIGNED_SUB_BUFFER_OFFSET",
        -14 => "CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST",
        -15 => "CL_COMPILE_PROGRAM_FAILURE",
        -16 => "CL_LINKER_NOT_AVAILABLE",
        -17 => "CL_LINK_PROGRAM_FAILURE",
        -18 => "CL_DEVICE_PARTITION_FAILED",
        -19 => "CL_KERNEL_ARG_INFO_NOT_AVAILABLE",
        -30 => "CL_INVALID_VALUE",
        -31 => "CL_INVALID_DEVICE_TYPE",
        -32 => "CL_INVALID_PLATFORM",
        -33 => "CL_INVALID_DEVICE",
        -34 => "CL_INVALID_CONTEXT",
        -35 => "CL_INVALID_QUEUE_PROPERTIES",
        -36 => "CL_INVALID_COMMAND_QUEUE",
        -37 => "CL_INVALID_HOST_PTR",
        -38 => "CL_INVALID_MEM_OBJECT",
        -39 => "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR",
        -40 => "CL_INVALID_IMAGE_SIZE",
        -41 => "CL_INVALID_SAMPLER",
        -42 => "CL_INVALID_BINARY",
        -43 => "CL_INVALID_BUILD_OPTIONS",
        -44 => "CL_INVALID_PROGRAM",
        -45 => "CL_INVALID_PROGRAM_EXECUTABLE",
        -46 => "CL_INVALID_KERNEL_NAME",
        -47 => "CL_INVALID_KERNEL_DEFINITION",
        -48 => "CL_INVALID_KERNEL",
        -49 => "CL_INVALID_ARG_INDEX",
        -50 => "CL_INVALID_ARG_VALUE",
        -51 => "CL_INVALID_ARG_SIZE",
        -52 => "CL_INVALID_KERNEL_ARGS",
        -53 => "CL_INVALID_WORK_DIMENSION",
        -54 => "CL_INVALID_WORK_GROUP_SIZE",
        -55 => "CL_INVALID_WORK_ITEM_SIZE",
        -56 => "CL_INVALID_GLOBAL_OFFSET",
        -57 => "CL_INVALID_EVENT_WAIT_LIST",
        -58 => "CL_INVALID_EVENT",
        -59 => "CL_INVALID_OPERATION",
        -60 => "CL_INVALID_GL_OBJECT",
        -61 => "CL_INVALID_BUFFER_SIZE",
        -62 => "CL_INVALID_MIP_LEVEL",
        -63 => "CL_INVALID_GLOBAL_WORK_SIZE",
        -64 => "CL_INVALID_PROPERTY",
        -65 => "CL_INVALID_IMAGE_DESCRIPTOR",
        -66 => "CL_INVALID_COMPILER_OPTIONS",
        -67 => "CL_INVALID_LINKER_OPTIONS",
        -68 => "CL_INVALID_DEVICE_PARTITION_COUNT",
        -1000 => "CL_INVALID_GL_SHAREGROUP_REFERENCE_KHR",
        -1001 => "CL_PLATFORM_NOT_FOUND_KHR",
        -1002 => "CL_INVALID_D3D10_DEVICE_KHR",
        -1003 => "CL_INVALID_D3D10_RESOURCE_KHR",
        -1004 => "CL_D3D10_RESOURCE_ALREADY_ACQUIRED_KHR",
        -1005 => "CL_D3D10_RESOURCE_NOT_ACQUIRED_KHR",
        _ => "CL_UNKNOWN_ERROR",
    }
}

/// Build a backend error with the status name filled in.
pub fn backend_error(
    backend: &str,
    stage: &str,
    code: i32,
    message: impl Into<String>,
) -> Error {
    Error::Backend {
        backend: backend.to_string(),
        stage: stage.to_string(),
        code,
        name: status_name(code).to_string(),
        message: message.into(),
    }
}
