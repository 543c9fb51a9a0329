//! Scoped ownership of a compute runtime.
//!
//! A [`ComputeSession`] is created once per driver run. It owns the runtime
//! (device, context and queue), the programs loaded into it, and the
//! configuration the drivers plan with. Each kernel file is built once per
//! session and reused by later runs; dropping the session releases every
//! program it loaded.

use crate::config::{Backend, OffloadConfig};
use crate::device::{ComputeRuntime, DeviceInfo, HostRuntime, ProgramId, ProgramSource};
use crate::error::{OffloadError, Result};
use crate::plan::{LocalSizePolicy, Planner};
use std::collections::HashMap;

pub struct ComputeSession {
    runtime: Box<dyn ComputeRuntime>,
    config: OffloadConfig,
    /// Built programs by source name.
    programs: HashMap<String, ProgramId>,
}

impl ComputeSession {
    /// Create the runtime selected by `config.backend`.
    pub fn open(config: &OffloadConfig) -> Result<Self> {
        let runtime: Box<dyn ComputeRuntime> = match config.backend {
            Backend::Host => Box::new(HostRuntime::new(config.host_max_work_group)?),
            #[cfg(feature = "cuda")]
            Backend::Cuda => Box::new(crate::device::CudaRuntime::new(config.cuda_device)?),
            #[cfg(not(feature = "cuda"))]
            Backend::Cuda => {
                return Err(OffloadError::setup(
                    "CUDA backend requested but offload was built without the `cuda` feature",
                ));
            }
        };
        Ok(Self::with_runtime(runtime, config.clone()))
    }

    /// Wrap an already constructed runtime.
    pub fn with_runtime(runtime: Box<dyn ComputeRuntime>, config: OffloadConfig) -> Self {
        let info = runtime.device_info();
        tracing::info!(
            device = %info.name,
            max_work_group = info.max_work_group_size,
            "compute session opened"
        );
        Self {
            runtime,
            config,
            programs: HashMap::new(),
        }
    }

    pub fn device(&self) -> &DeviceInfo {
        self.runtime.device_info()
    }

    pub fn config(&self) -> &OffloadConfig {
        &self.config
    }

    /// Planner for this session's device with the given default local size.
    pub fn planner(&self, default_local: LocalSizePolicy) -> Planner {
        Planner::new(
            self.device().max_work_group_size,
            default_local,
            self.config.remainder,
        )
    }

    /// Read `file` from the kernel directory and build it, unless this
    /// session already has.
    pub fn load_program(&mut self, file: &str) -> Result<ProgramId> {
        if let Some(id) = self.programs.get(file) {
            return Ok(*id);
        }
        let source = ProgramSource::load(&self.config.kernel_dir, file)?;
        self.build(&source)
    }

    /// Build a program from in-memory source. A program previously built
    /// under the same name is released and replaced.
    pub fn build(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        let id = self.runtime.compile(source)?;
        tracing::debug!(program = %source.name, ?id, "program built");
        if let Some(old) = self.programs.insert(source.name.clone(), id) {
            self.runtime.release_program(old);
        }
        Ok(id)
    }

    pub(crate) fn runtime_mut(&mut self) -> &mut dyn ComputeRuntime {
        self.runtime.as_mut()
    }
}

impl Drop for ComputeSession {
    fn drop(&mut self) {
        for (_, program) in self.programs.drain() {
            self.runtime.release_program(program);
        }
    }
}
