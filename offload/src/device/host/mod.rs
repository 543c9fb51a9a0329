//! Reference runtime that executes kernels on the host CPU.
//!
//! Programs are checked against the entry points declared in their source
//! file, and each entry point is served by a Rust implementation of the same
//! argument contract (see [`kernels`]). Workgroups are emulated with explicit
//! local scratch buffers and run in parallel on the rayon pool.

pub mod kernels;

use super::runtime::{
    ArgValue, BufferAccess, BufferId, ComputeRuntime, DeviceInfo, EventId, KernelId, ProgramId,
    ProgramSource, check_launch,
};
use crate::error::{OffloadError, Result};
use crate::types::{Element, decode, encode};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Signature of a host kernel: one call covers the whole launch.
pub type HostKernelFn = fn(&LaunchDims, &mut KernelArgs<'_>) -> Result<()>;

/// Launch shape, padded to two dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDims {
    pub global: [usize; 2],
    pub local: [usize; 2],
}

impl LaunchDims {
    fn from_slices(global: &[usize], local: &[usize]) -> Self {
        let mut dims = Self {
            global: [1, 1],
            local: [1, 1],
        };
        dims.global[..global.len()].copy_from_slice(global);
        dims.local[..local.len()].copy_from_slice(local);
        dims
    }

    pub fn group_count(&self, dim: usize) -> usize {
        self.global[dim] / self.local[dim]
    }

    pub fn total_groups(&self) -> usize {
        self.group_count(0) * self.group_count(1)
    }

    /// Work-items per workgroup.
    pub fn group_items(&self) -> usize {
        self.local[0] * self.local[1]
    }

    /// Work-items in the whole launch.
    pub fn global_items(&self) -> usize {
        self.global[0] * self.global[1]
    }
}

enum HostArg {
    Buffer {
        id: BufferId,
        access: BufferAccess,
        data: Vec<u8>,
    },
    U32(u32),
    I32(i32),
    Local(usize),
}

/// Arguments of one launch, in slot order.
pub struct KernelArgs<'a> {
    kernel: &'a str,
    args: Vec<HostArg>,
}

impl KernelArgs<'_> {
    fn fail(&self, index: usize, msg: impl std::fmt::Display) -> OffloadError {
        OffloadError::dispatch(
            "executing kernel",
            format!("{} argument {index}: {msg}", self.kernel),
        )
    }

    fn arg(&self, index: usize) -> Result<&HostArg> {
        self.args
            .get(index)
            .ok_or_else(|| self.fail(index, "missing"))
    }

    /// Decode a readable buffer argument.
    pub fn input<T: Element>(&self, index: usize) -> Result<Vec<T>> {
        match self.arg(index)? {
            HostArg::Buffer { access, .. } if *access == BufferAccess::WriteOnly => {
                Err(self.fail(index, "buffer is write-only"))
            }
            HostArg::Buffer { data, .. } => decode(data),
            _ => Err(self.fail(index, "expected a buffer")),
        }
    }

    /// Overwrite the start of a writable buffer argument with `values`.
    pub fn write<T: Element>(&mut self, index: usize, values: &[T]) -> Result<()> {
        let bytes = encode(values);
        let err = match self.args.get_mut(index) {
            Some(HostArg::Buffer { access, data, .. }) if *access != BufferAccess::ReadOnly => {
                if bytes.len() > data.len() {
                    format!("{} bytes written to a {}-byte buffer", bytes.len(), data.len())
                } else {
                    data[..bytes.len()].copy_from_slice(&bytes);
                    return Ok(());
                }
            }
            Some(HostArg::Buffer { .. }) => "buffer is read-only".to_string(),
            Some(_) => "expected a buffer".to_string(),
            None => "missing".to_string(),
        };
        Err(self.fail(index, err))
    }

    pub fn u32(&self, index: usize) -> Result<u32> {
        match self.arg(index)? {
            HostArg::U32(v) => Ok(*v),
            _ => Err(self.fail(index, "expected a u32 scalar")),
        }
    }

    pub fn i32(&self, index: usize) -> Result<i32> {
        match self.arg(index)? {
            HostArg::I32(v) => Ok(*v),
            _ => Err(self.fail(index, "expected an i32 scalar")),
        }
    }

    /// Check that a local-memory argument can hold `count` elements of `T`.
    pub fn local<T: Element>(&self, index: usize, count: usize) -> Result<()> {
        match self.arg(index)? {
            HostArg::Local(bytes) if *bytes >= count * T::DTYPE.size_in_bytes() => Ok(()),
            HostArg::Local(bytes) => Err(self.fail(
                index,
                format!(
                    "{bytes} bytes of local memory cannot hold {count} {} values",
                    T::DTYPE
                ),
            )),
            _ => Err(self.fail(index, "expected local memory")),
        }
    }
}

struct HostProgram {
    name: String,
    entry_points: Vec<String>,
}

struct HostKernel {
    name: String,
    func: HostKernelFn,
    args: BTreeMap<u32, ArgValue>,
}

struct HostBuffer {
    access: BufferAccess,
    data: Vec<u8>,
}

/// Runtime backed by the host CPU.
pub struct HostRuntime {
    info: DeviceInfo,
    registry: HashMap<String, HostKernelFn>,
    programs: HashMap<ProgramId, HostProgram>,
    kernels: HashMap<KernelId, HostKernel>,
    buffers: HashMap<BufferId, HostBuffer>,
    events: HashMap<EventId, Duration>,
    next_id: u64,
    live: Arc<AtomicUsize>,
}

impl HostRuntime {
    /// Create a runtime emulating a device whose workgroups hold at most
    /// `max_work_group_size` work-items, with the built-in kernels registered.
    pub fn new(max_work_group_size: usize) -> Result<Self> {
        if max_work_group_size == 0 {
            return Err(OffloadError::setup(
                "host device needs a non-zero workgroup capacity",
            ));
        }
        let mut rt = Self {
            info: DeviceInfo {
                name: format!("host ({} threads)", rayon::current_num_threads()),
                max_work_group_size,
            },
            registry: HashMap::new(),
            programs: HashMap::new(),
            kernels: HashMap::new(),
            buffers: HashMap::new(),
            events: HashMap::new(),
            next_id: 0,
            live: Arc::new(AtomicUsize::new(0)),
        };
        for (name, func) in kernels::builtin() {
            rt.register(name, func);
        }
        Ok(rt)
    }

    /// Serve entry point `name` with `func`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, func: HostKernelFn) {
        self.registry.insert(name.into(), func);
    }

    /// Shared count of programs, kernels, buffers and events currently held.
    pub fn live_objects(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live)
    }

    /// Fresh object id, counted as live until released.
    fn allocate(&mut self) -> u64 {
        self.live.fetch_add(1, Ordering::Relaxed);
        self.next_id += 1;
        self.next_id
    }

    fn released(&self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ComputeRuntime for HostRuntime {
    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn compile(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        let entry_points = source.entry_points();
        if entry_points.is_empty() {
            return Err(OffloadError::Compile {
                program: source.name.clone(),
                log: format!("{}: no __global__ entry points declared", source.name),
            });
        }
        let id = ProgramId(self.allocate());
        self.programs.insert(
            id,
            HostProgram {
                name: source.name.clone(),
                entry_points,
            },
        );
        Ok(id)
    }

    fn create_kernel(&mut self, program: ProgramId, name: &str) -> Result<KernelId> {
        let prog = self
            .programs
            .get(&program)
            .ok_or_else(|| OffloadError::setup(format!("unknown program {program:?}")))?;
        if !prog.entry_points.iter().any(|e| e == name) {
            return Err(OffloadError::Compile {
                program: prog.name.clone(),
                log: format!("{}: no kernel named `{name}`", prog.name),
            });
        }
        let func = *self.registry.get(name).ok_or_else(|| OffloadError::Compile {
            program: prog.name.clone(),
            log: format!("host runtime has no implementation of `{name}`"),
        })?;
        let id = KernelId(self.allocate());
        self.kernels.insert(
            id,
            HostKernel {
                name: name.to_string(),
                func,
                args: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn create_buffer(
        &mut self,
        access: BufferAccess,
        size_bytes: usize,
        host_data: Option<&[u8]>,
    ) -> Result<BufferId> {
        if size_bytes == 0 {
            return Err(OffloadError::dispatch("creating buffer", "zero-sized buffer"));
        }
        let data = match host_data {
            Some(bytes) if bytes.len() != size_bytes => {
                return Err(OffloadError::dispatch_with_source(
                    "creating buffer",
                    "host data does not match buffer size",
                    OffloadError::BufferSizeMismatch {
                        expected: size_bytes,
                        actual: bytes.len(),
                    },
                ));
            }
            Some(bytes) => bytes.to_vec(),
            None => vec![0u8; size_bytes],
        };
        let id = BufferId(self.allocate());
        self.buffers.insert(id, HostBuffer { access, data });
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
        let (name, func) = (k.name.clone(), k.func);
        let bound: Vec<(u32, ArgValue)> = k.args.iter().map(|(i, v)| (*i, *v)).collect();

        let mut args = Vec::with_capacity(bound.len());
        for (expected, (index, value)) in bound.iter().enumerate() {
            if *index as usize != expected {
                self.restore(&mut args);
                return Err(OffloadError::dispatch(
                    "enqueueing",
                    format!("{name}: argument {expected} is not set"),
                ));
            }
            let arg = match *value {
                ArgValue::Buffer(id) => {
                    // Contents are moved out for the launch; an empty buffer
                    // here is one already bound to an earlier slot.
                    let taken = self
                        .buffers
                        .get_mut(&id)
                        .filter(|b| !b.data.is_empty())
                        .map(|b| (b.access, std::mem::take(&mut b.data)));
                    match taken {
                        Some((access, data)) => HostArg::Buffer { id, access, data },
                        None => {
                            self.restore(&mut args);
                            return Err(OffloadError::dispatch(
                                "enqueueing",
                                format!("{name}: buffer {id:?} is missing or bound twice"),
                            ));
                        }
                    }
                }
                ArgValue::U32(v) => HostArg::U32(v),
                ArgValue::I32(v) => HostArg::I32(v),
                ArgValue::Local(n) => HostArg::Local(n),
            };
            args.push(arg);
        }

        let dims = LaunchDims::from_slices(global, local);
        let mut kernel_args = KernelArgs {
            kernel: &name,
            args,
        };
        let start = Instant::now();
        let outcome = func(&dims, &mut kernel_args);
        let elapsed = start.elapsed();
        let mut args = kernel_args.args;
        self.restore(&mut args);
        outcome?;

        let id = EventId(self.allocate());
        self.events.insert(id, elapsed);
        tracing::debug!(kernel = %name, ?global, ?local, ?elapsed, "host kernel finished");
        Ok(id)
    }

    fn wait(&mut self, event: EventId) -> Result<()> {
        if self.events.contains_key(&event) {
            Ok(())
        } else {
            Err(OffloadError::dispatch(
                "waiting",
                format!("unknown event {event:?}"),
            ))
        }
    }

    fn elapsed(&self, event: EventId) -> Result<Duration> {
        self.events.get(&event).copied().ok_or_else(|| {
            OffloadError::dispatch("reading profiling info", format!("unknown event {event:?}"))
        })
    }

    fn read_buffer(&mut self, buffer: BufferId, dst: &mut [u8]) -> Result<()> {
        let buf = self.buffers.get(&buffer).ok_or_else(|| {
            OffloadError::dispatch("reading back", format!("unknown buffer {buffer:?}"))
        })?;
        if buf.data.len() != dst.len() {
            return Err(OffloadError::dispatch_with_source(
                "reading back",
                format!("buffer {buffer:?} size differs from destination"),
                OffloadError::BufferSizeMismatch {
                    expected: buf.data.len(),
                    actual: dst.len(),
                },
            ));
        }
        dst.copy_from_slice(&buf.data);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_some() {
            self.released();
        } else {
            tracing::warn!(?buffer, "release of unknown buffer");
        }
    }

    fn release_kernel(&mut self, kernel: KernelId) {
        if self.kernels.remove(&kernel).is_some() {
            self.released();
        } else {
            tracing::warn!(?kernel, "release of unknown kernel");
        }
    }

    fn release_event(&mut self, event: EventId) {
        if self.events.remove(&event).is_some() {
            self.released();
        } else {
            tracing::warn!(?event, "release of unknown event");
        }
    }

    fn release_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            self.released();
        } else {
            tracing::warn!(?program, "release of unknown program");
        }
    }
}

impl HostRuntime {
    /// Hand buffer contents taken for a launch back to their owners.
    fn restore(&mut self, args: &mut Vec<HostArg>) {
        for arg in args.drain(..) {
            if let HostArg::Buffer { id, data, .. } = arg {
                if let Some(buf) = self.buffers.get_mut(&id) {
                    buf.data = data;
                }
            }
        }
    }
}
