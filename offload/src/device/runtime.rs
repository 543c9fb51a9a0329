use crate::error::{OffloadError, Result};
use std::path::Path;
use std::time::Duration;

/// Handle to a compiled program owned by a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

/// Handle to a kernel object created from a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub u64);

/// Handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Handle to a completed or in-flight kernel execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

/// Static properties of the device a runtime drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    /// Maximum number of work-items in one workgroup.
    pub max_work_group_size: usize,
}

/// How kernels may access a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
}

/// A value bound to one kernel argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgValue {
    Buffer(BufferId),
    U32(u32),
    I32(i32),
    /// Workgroup-local scratch memory of the given size in bytes.
    Local(usize),
}

/// Kernel source text loaded from one file.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    /// File name, used in diagnostics.
    pub name: String,
    pub text: String,
}

impl ProgramSource {
    /// Read `file` from `dir`. A missing or unreadable file is a build failure.
    pub fn load(dir: &Path, file: &str) -> Result<Self> {
        let path = dir.join(file);
        let text = std::fs::read_to_string(&path).map_err(|e| OffloadError::Compile {
            program: file.to_string(),
            log: format!("couldn't read the program file {}: {e}", path.display()),
        })?;
        Ok(Self {
            name: file.to_string(),
            text,
        })
    }

    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Names of the `__global__` entry points declared in the source.
    pub fn entry_points(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.text.as_str();
        while let Some(pos) = rest.find("__global__") {
            rest = &rest[pos + "__global__".len()..];
            let Some(open) = rest.find('(') else { break };
            let name = rest[..open]
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .trim_start_matches('*');
            if !name.is_empty() {
                names.push(name.to_string());
            }
            rest = &rest[open..];
        }
        names
    }
}

/// The compute-offload runtime the dispatch layer drives.
///
/// Construction of an implementor is context creation: it discovers the
/// device, creates the context and a profiling-enabled queue.
///
/// - `HostRuntime` (built-in): runs reference kernels on the CPU.
/// - `CudaRuntime` (feature `cuda`): NVRTC-compiled kernels on an NVIDIA GPU.
///
/// Release methods never fail: they are called from drop paths, so an
/// implementation logs and moves on.
pub trait ComputeRuntime: Send {
    /// Properties of the device behind this runtime.
    fn device_info(&self) -> &DeviceInfo;

    /// Build a program from source. Build failures carry the build log.
    fn compile(&mut self, source: &ProgramSource) -> Result<ProgramId>;

    /// Create a kernel object for the entry point `name` in `program`.
    fn create_kernel(&mut self, program: ProgramId, name: &str) -> Result<KernelId>;

    /// Allocate a device buffer of `size_bytes`, optionally initialised from
    /// `host_data` (which must then be exactly `size_bytes` long).
    fn create_buffer(
        &mut self,
        access: BufferAccess,
        size_bytes: usize,
        host_data: Option<&[u8]>,
    ) -> Result<BufferId>;

    /// Bind `value` to argument slot `index` of `kernel`.
    fn bind_arg(&mut self, kernel: KernelId, index: u32, value: ArgValue) -> Result<()>;

    /// Launch `kernel` over `global` work-items in groups of `local`.
    /// Both slices have one entry per dimension.
    fn enqueue(&mut self, kernel: KernelId, global: &[usize], local: &[usize]) -> Result<EventId>;

    /// Block until the execution behind `event` has finished.
    fn wait(&mut self, event: EventId) -> Result<()>;

    /// Device execution time of a finished event.
    fn elapsed(&self, event: EventId) -> Result<Duration>;

    /// Copy the whole of `buffer` into `dst` (blocking).
    fn read_buffer(&mut self, buffer: BufferId, dst: &mut [u8]) -> Result<()>;

    fn release_buffer(&mut self, buffer: BufferId);

    fn release_kernel(&mut self, kernel: KernelId);

    /// Forget a finished event once its timing has been read.
    fn release_event(&mut self, event: EventId);

    fn release_program(&mut self, program: ProgramId);
}

/// Validate launch dimensions against a device before enqueueing.
pub(crate) fn check_launch(info: &DeviceInfo, global: &[usize], local: &[usize]) -> Result<()> {
    if global.is_empty() || global.len() > 2 || global.len() != local.len() {
        return Err(OffloadError::dispatch(
            "enqueueing",
            format!(
                "unsupported launch shape: global {global:?}, local {local:?}"
            ),
        ));
    }
    for (g, l) in global.iter().zip(local) {
        if *l == 0 || g % l != 0 {
            return Err(OffloadError::dispatch(
                "enqueueing",
                format!("global size {g} is not a multiple of local size {l}"),
            ));
        }
    }
    let group_items: usize = local.iter().product();
    if group_items > info.max_work_group_size {
        return Err(OffloadError::dispatch(
            "enqueueing",
            format!(
                "workgroup of {group_items} items exceeds device limit {}",
                info.max_work_group_size
            ),
        ));
    }
    Ok(())
}
