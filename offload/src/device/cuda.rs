//! NVIDIA runtime built on cudarc 0.19.
//!
//! Kernel sources are compiled with NVRTC when a program is loaded. Local
//! memory arguments become dynamic shared memory for the launch and are not
//! passed as kernel parameters. Launches are bracketed by a pair of timing
//! events on the stream, so `elapsed` reports device execution time.

use super::runtime::{
    ArgValue, BufferAccess, BufferId, ComputeRuntime, DeviceInfo, EventId, KernelId, ProgramId,
    ProgramSource, check_launch,
};
use crate::error::{OffloadError, Result};
use cudarc::driver::{
    CudaContext, CudaEvent, CudaFunction, CudaModule, CudaSlice, CudaStream, LaunchConfig,
    PushKernelArg,
    sys::{CUdevice_attribute, CUevent_flags},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

struct CudaKernel {
    name: String,
    func: CudaFunction,
    args: BTreeMap<u32, ArgValue>,
}

/// Runtime driving one CUDA device through its default stream.
pub struct CudaRuntime {
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    info: DeviceInfo,
    programs: HashMap<ProgramId, (String, Arc<CudaModule>)>,
    kernels: HashMap<KernelId, CudaKernel>,
    buffers: HashMap<BufferId, CudaSlice<u8>>,
    /// Start and end markers recorded around each launch.
    events: HashMap<EventId, (CudaEvent, CudaEvent)>,
    next_id: u64,
}

impl CudaRuntime {
    /// Create a context on GPU `device_ordinal`.
    pub fn new(device_ordinal: usize) -> Result<Self> {
        let ctx = CudaContext::new(device_ordinal).map_err(|e| {
            OffloadError::setup_with_source(
                format!("failed to create CUDA context for GPU {device_ordinal}"),
                e,
            )
        })?;
        let max_threads = ctx
            .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)
            .map_err(|e| OffloadError::setup_with_source("couldn't query device limits", e))?;
        let stream = ctx.default_stream();
        let info = DeviceInfo {
            name: format!("CUDA device {device_ordinal}"),
            max_work_group_size: usize::try_from(max_threads).unwrap_or(0),
        };
        tracing::info!(device = %info.name, max_work_group = info.max_work_group_size, "CUDA context ready");
        Ok(Self {
            ctx,
            stream,
            info,
            programs: HashMap::new(),
            kernels: HashMap::new(),
            buffers: HashMap::new(),
            events: HashMap::new(),
            next_id: 0,
        })
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn timing_event(&self, kernel: &str) -> Result<CudaEvent> {
        self.stream
            .record_event(Some(CUevent_flags::CU_EVENT_DEFAULT))
            .map_err(|e| OffloadError::dispatch_with_source("enqueueing", kernel.to_string(), e))
    }
}

impl ComputeRuntime for CudaRuntime {
    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn compile(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        let ptx = cudarc::nvrtc::compile_ptx(source.text.as_str()).map_err(|e| {
            OffloadError::Compile {
                program: source.name.clone(),
                log: format!("{e:?}"),
            }
        })?;
        let module = self.ctx.load_module(ptx).map_err(|e| OffloadError::Compile {
            program: source.name.clone(),
            log: format!("module load failed: {e}"),
        })?;
        let id = ProgramId(self.next_id());
        self.programs.insert(id, (source.name.clone(), module));
        Ok(id)
    }

    fn create_kernel(&mut self, program: ProgramId, name: &str) -> Result<KernelId> {
        let (file, module) = self
            .programs
            .get(&program)
            .ok_or_else(|| OffloadError::setup(format!("unknown program {program:?}")))?;
        let func = module.load_function(name).map_err(|e| OffloadError::Compile {
            program: file.clone(),
            log: format!("{file}: no kernel named `{name}`: {e}"),
        })?;
        let id = KernelId(self.next_id());
        self.kernels.insert(
            id,
            CudaKernel {
                name: name.to_string(),
                func,
                args: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn create_buffer(
        &mut self,
        _access: BufferAccess,
        size_bytes: usize,
        host_data: Option<&[u8]>,
    ) -> Result<BufferId> {
        if size_bytes == 0 {
            return Err(OffloadError::dispatch("creating buffer", "zero-sized buffer"));
        }
        let slice = match host_data {
            Some(bytes) if bytes.len() != size_bytes => {
                return Err(OffloadError::BufferSizeMismatch {
                    expected: size_bytes,
                    actual: bytes.len(),
                });
            }
            Some(bytes) => self.stream.memcpy_stod(bytes),
            None => self.stream.alloc_zeros::<u8>(size_bytes),
        }
        .map_err(|e| OffloadError::dispatch_with_source("creating buffer", "allocation failed", e))?;
        let id = BufferId(self.next_id());
        self.buffers.insert(id, slice);
        Ok(id)
    }

    fn bind_arg(&mut self, kernel: KernelId, index: u32, value: ArgValue) -> Result<()> {
        if let ArgValue::Buffer(b) = value {
            if !self.buffers.contains_key(&b) {
                return Err(OffloadError::dispatch(
                    "binding arguments",
                    format!("argument {index}: unknown buffer {b:?}"),
                ));
            }
        }
        let k = self.kernels.get_mut(&kernel).ok_or_else(|| {
            OffloadError::dispatch("binding arguments", format!("unknown kernel {kernel:?}"))
        })?;
        k.args.insert(index, value);
        Ok(())
    }

    fn enqueue(&mut self, kernel: KernelId, global: &[usize], local: &[usize]) -> Result<EventId> {
        check_launch(&self.info, global, local)?;
        let k = self.kernels.get(&kernel).ok_or_else(|| {
            OffloadError::dispatch("enqueueing", format!("unknown kernel {kernel:?}"))
        })?;
        let values: Vec<ArgValue> = k.args.values().copied().collect();
        if k.args.keys().copied().ne(0..values.len() as u32) {
            return Err(OffloadError::dispatch(
                "enqueueing",
                format!("{}: argument slots are not contiguous", k.name),
            ));
        }

        let dim = |v: &[usize], i: usize| v.get(i).copied().unwrap_or(1) as u32;
        let shared: usize = values
            .iter()
            .map(|v| if let ArgValue::Local(n) = v { *n } else { 0 })
            .sum();
        let cfg = LaunchConfig {
            grid_dim: (
                dim(global, 0) / dim(local, 0),
                dim(global, 1) / dim(local, 1),
                1,
            ),
            block_dim: (dim(local, 0), dim(local, 1), 1),
            shared_mem_bytes: shared as u32,
        };

        let stream = Arc::clone(&self.stream);
        let mut builder = stream.launch_builder(&k.func);
        for value in &values {
            match value {
                ArgValue::Buffer(id) => {
                    let slice = self.buffers.get(id).ok_or_else(|| {
                        OffloadError::dispatch("enqueueing", format!("unknown buffer {id:?}"))
                    })?;
                    builder.arg(slice);
                }
                ArgValue::U32(v) => {
                    builder.arg(v);
                }
                ArgValue::I32(v) => {
                    builder.arg(v);
                }
                ArgValue::Local(_) => {}
            }
        }

        let start = self.timing_event(&k.name)?;
        // SAFETY: argument slots were bound in declaration order against the
        // kernel signature, and every buffer is live for the launch.
        unsafe { builder.launch(cfg) }
            .map_err(|e| OffloadError::dispatch_with_source("enqueueing", k.name.clone(), e))?;
        let end = self.timing_event(&k.name)?;

        let id = EventId(self.next_id());
        self.events.insert(id, (start, end));
        Ok(id)
    }

    fn wait(&mut self, event: EventId) -> Result<()> {
        let (_, end) = self
            .events
            .get(&event)
            .ok_or_else(|| OffloadError::dispatch("waiting", format!("unknown event {event:?}")))?;
        end.synchronize()
            .map_err(|e| OffloadError::dispatch_with_source("waiting", "event sync failed", e))
    }

    fn elapsed(&self, event: EventId) -> Result<Duration> {
        let (start, end) = self.events.get(&event).ok_or_else(|| {
            OffloadError::dispatch("reading profiling info", format!("unknown event {event:?}"))
        })?;
        let ms = start.elapsed_ms(end).map_err(|e| {
            OffloadError::dispatch_with_source("reading profiling info", "event timing failed", e)
        })?;
        Ok(Duration::from_secs_f64(f64::from(ms.max(0.0)) / 1e3))
    }

    fn read_buffer(&mut self, buffer: BufferId, dst: &mut [u8]) -> Result<()> {
        let slice = self.buffers.get(&buffer).ok_or_else(|| {
            OffloadError::dispatch("reading back", format!("unknown buffer {buffer:?}"))
        })?;
        let host = self
            .stream
            .memcpy_dtov(slice)
            .map_err(|e| OffloadError::dispatch_with_source("reading back", "cuMemcpyDtoH failed", e))?;
        if host.len() != dst.len() {
            return Err(OffloadError::BufferSizeMismatch {
                expected: host.len(),
                actual: dst.len(),
            });
        }
        dst.copy_from_slice(&host);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_none() {
            tracing::warn!(?buffer, "release of unknown buffer");
        }
    }

    fn release_kernel(&mut self, kernel: KernelId) {
        if self.kernels.remove(&kernel).is_none() {
            tracing::warn!(?kernel, "release of unknown kernel");
        }
    }

    fn release_event(&mut self, event: EventId) {
        if self.events.remove(&event).is_none() {
            tracing::warn!(?event, "release of unknown event");
        }
    }

    fn release_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            tracing::warn!(?program, "release of unknown program");
        }
    }
}
