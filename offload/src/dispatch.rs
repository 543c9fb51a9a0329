//! One offloaded kernel invocation, from argument binding to readback.

use crate::device::{
    ArgValue, BufferAccess, BufferId, ComputeRuntime, EventId, KernelId, ProgramId,
};
use crate::error::{OffloadError, Result};
use crate::lifecycle::{Lifecycle, RunState};
use crate::plan::{Geometry, TiledGeometry};
use crate::reduce::PartialResultSet;
use crate::session::ComputeSession;
use crate::types::{Element, decode, encode};
use std::time::Duration;

/// A declared kernel argument, bound to the slot matching its position.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelArg {
    /// Read-only device buffer initialised from host bytes.
    Input(Vec<u8>),
    /// Write-only device buffer, read back after execution.
    Output { len_bytes: usize },
    U32(u32),
    I32(i32),
    /// Workgroup-local scratch memory.
    Local { len_bytes: usize },
}

impl KernelArg {
    pub fn input<T: Element>(values: &[T]) -> Self {
        KernelArg::Input(encode(values))
    }

    /// Output buffer holding `count` values of `T`.
    pub fn output<T: Element>(count: usize) -> Self {
        KernelArg::Output {
            len_bytes: count * T::DTYPE.size_in_bytes(),
        }
    }

    /// Local memory for `count` values of `T` per workgroup.
    pub fn local<T: Element>(count: usize) -> Self {
        KernelArg::Local {
            len_bytes: count * T::DTYPE.size_in_bytes(),
        }
    }
}

/// Launch shape of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchGeometry {
    Linear(Geometry),
    Tiled(TiledGeometry),
}

impl LaunchGeometry {
    pub fn global(&self) -> Vec<usize> {
        match self {
            LaunchGeometry::Linear(g) => vec![g.global_size],
            LaunchGeometry::Tiled(t) => t.global().to_vec(),
        }
    }

    pub fn local(&self) -> Vec<usize> {
        match self {
            LaunchGeometry::Linear(g) => vec![g.local_size],
            LaunchGeometry::Tiled(t) => t.local().to_vec(),
        }
    }

    pub fn group_count(&self) -> usize {
        match self {
            LaunchGeometry::Linear(g) => g.group_count,
            LaunchGeometry::Tiled(t) => t.group_count(),
        }
    }
}

impl From<Geometry> for LaunchGeometry {
    fn from(g: Geometry) -> Self {
        LaunchGeometry::Linear(g)
    }
}

impl From<TiledGeometry> for LaunchGeometry {
    fn from(t: TiledGeometry) -> Self {
        LaunchGeometry::Tiled(t)
    }
}

/// Everything needed to run one kernel once.
#[derive(Debug, Clone)]
pub struct KernelInvocation<'a> {
    pub program: ProgramId,
    pub kernel: &'a str,
    pub geometry: LaunchGeometry,
    pub args: Vec<KernelArg>,
}

/// The transferred output buffer and the device time it took to produce.
#[derive(Debug, Clone)]
pub struct DispatchOutput {
    bytes: Vec<u8>,
    elapsed: Duration,
}

impl DispatchOutput {
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn values<T: Element>(&self) -> Result<Vec<T>> {
        decode(&self.bytes)
    }

    /// View the output as one partial result per workgroup.
    pub fn partials<T: Element>(self) -> Result<PartialResultSet<T>> {
        PartialResultSet::from_bytes(&self.bytes)
    }
}

/// Releases everything created for one dispatch when it goes out of scope.
struct DispatchScope<'s> {
    runtime: &'s mut dyn ComputeRuntime,
    kernel: Option<KernelId>,
    buffers: Vec<BufferId>,
    event: Option<EventId>,
}

impl DispatchScope<'_> {
    fn buffer(&mut self, access: BufferAccess, len: usize, data: Option<&[u8]>) -> Result<BufferId> {
        let id = self.runtime.create_buffer(access, len, data)?;
        self.buffers.push(id);
        Ok(id)
    }
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.runtime.release_event(event);
        }
        for buffer in self.buffers.drain(..) {
            self.runtime.release_buffer(buffer);
        }
        if let Some(kernel) = self.kernel.take() {
            self.runtime.release_kernel(kernel);
        }
    }
}

/// Run `invocation` on the session's device and read its output back.
///
/// `run` must be `Planned`; it ends `Completed` on success and `Aborted` on
/// any failure. Device resources are released on every path.
pub fn dispatch(
    session: &mut ComputeSession,
    run: &mut Lifecycle,
    invocation: &KernelInvocation<'_>,
) -> Result<DispatchOutput> {
    let result = execute(session.runtime_mut(), run, invocation);
    if result.is_err() {
        run.abort();
    }
    result
}

fn execute(
    runtime: &mut dyn ComputeRuntime,
    run: &mut Lifecycle,
    invocation: &KernelInvocation<'_>,
) -> Result<DispatchOutput> {
    if run.state() != RunState::Planned {
        return Err(OffloadError::InvalidTransition {
            from: run.state(),
            to: RunState::Dispatched,
        });
    }
    let outputs = invocation
        .args
        .iter()
        .filter(|a| matches!(a, KernelArg::Output { .. }))
        .count();
    if outputs != 1 {
        return Err(OffloadError::dispatch(
            "binding arguments",
            format!("{}: expected one output buffer, found {outputs}", invocation.kernel),
        ));
    }

    let mut scope = DispatchScope {
        runtime,
        kernel: None,
        buffers: Vec::new(),
        event: None,
    };
    let kernel = scope
        .runtime
        .create_kernel(invocation.program, invocation.kernel)?;
    scope.kernel = Some(kernel);

    let mut output = None;
    for (index, arg) in invocation.args.iter().enumerate() {
        let value = match arg {
            KernelArg::Input(bytes) => {
                let id = scope.buffer(BufferAccess::ReadOnly, bytes.len(), Some(bytes.as_slice()))?;
                ArgValue::Buffer(id)
            }
            KernelArg::Output { len_bytes } => {
                let id = scope.buffer(BufferAccess::WriteOnly, *len_bytes, None)?;
                output = Some((id, *len_bytes));
                ArgValue::Buffer(id)
            }
            KernelArg::U32(v) => ArgValue::U32(*v),
            KernelArg::I32(v) => ArgValue::I32(*v),
            KernelArg::Local { len_bytes } => ArgValue::Local(*len_bytes),
        };
        tracing::debug!(kernel = invocation.kernel, index, ?value, "binding argument");
        scope.runtime.bind_arg(kernel, index as u32, value)?;
    }
    let (output, len_bytes) = output.ok_or_else(|| {
        OffloadError::dispatch("binding arguments", "output buffer was not created")
    })?;

    let global = invocation.geometry.global();
    let local = invocation.geometry.local();
    let event = scope.runtime.enqueue(kernel, &global, &local)?;
    scope.event = Some(event);
    run.advance(RunState::Dispatched)?;
    scope.runtime.wait(event)?;
    let elapsed = scope.runtime.elapsed(event)?;

    let mut bytes = vec![0u8; len_bytes];
    scope.runtime.read_buffer(output, &mut bytes)?;
    run.advance(RunState::Completed)?;

    tracing::info!(
        kernel = invocation.kernel,
        groups = invocation.geometry.group_count(),
        elapsed_ms = elapsed.as_secs_f64() * 1e3,
        "kernel completed"
    );
    Ok(DispatchOutput { bytes, elapsed })
}
