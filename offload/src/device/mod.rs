pub mod host;
mod runtime;
#[cfg(feature = "cuda")]
mod cuda;

pub use host::{HostKernelFn, HostRuntime, KernelArgs, LaunchDims};
pub use runtime::{
    ArgValue, BufferAccess, BufferId, ComputeRuntime, DeviceInfo, EventId, KernelId, ProgramId,
    ProgramSource,
};
pub(crate) use runtime::check_launch;
#[cfg(feature = "cuda")]
pub use cuda::CudaRuntime;
