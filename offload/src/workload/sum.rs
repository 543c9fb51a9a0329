//! Sum of `1..=M` with one partial per workgroup.

use crate::dispatch::{KernelArg, KernelInvocation, dispatch};
use crate::error::{OffloadError, Result};
use crate::lifecycle::{Lifecycle, RunState};
use crate::plan::{Geometry, LocalSizePolicy};
use crate::reduce::reduce_partials;
use crate::session::ComputeSession;
use crate::types::ReduceOp;
use std::time::Duration;

pub const PROGRAM_FILE: &str = "add_numbers.cu";
pub const KERNEL: &str = "add_numbers";

#[derive(Debug, Clone, Copy)]
pub struct SumParams {
    /// Upper bound `M` of the summed range.
    pub problem_size: usize,
    pub local_size: LocalSizePolicy,
}

impl Default for SumParams {
    fn default() -> Self {
        Self {
            problem_size: 64,
            local_size: LocalSizePolicy::Fixed(32),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SumReport {
    pub geometry: Geometry,
    pub partial_count: usize,
    pub total: i64,
    pub elapsed: Duration,
}

/// Sum `1..=problem_size` on the session's device.
pub fn run(session: &mut ComputeSession, params: &SumParams) -> Result<SumReport> {
    let count = i32::try_from(params.problem_size).map_err(|_| {
        OffloadError::geometry(format!(
            "problem size {} does not fit the kernel's 32-bit count",
            params.problem_size
        ))
    })?;
    let program = session.load_program(PROGRAM_FILE)?;

    let mut run = Lifecycle::new(KERNEL);
    let planner = session.planner(params.local_size);
    let geometry = run.step(RunState::Planned, || {
        planner.plan(params.problem_size, None)
    })?;
    tracing::info!(%geometry, "planned");

    let output = dispatch(
        session,
        &mut run,
        &KernelInvocation {
            program,
            kernel: KERNEL,
            geometry: geometry.into(),
            args: vec![
                KernelArg::output::<i64>(geometry.group_count),
                KernelArg::I32(count),
                KernelArg::local::<i64>(geometry.local_size),
            ],
        },
    )?;
    let elapsed = output.elapsed();

    let parallel_min = session.config().parallel_reduce_min;
    let (partial_count, total) = run.step(RunState::Reduced, || {
        let partials = output.partials::<i64>()?;
        Ok((partials.len(), reduce_partials(partials, ReduceOp::Sum, parallel_min)))
    })?;
    run.advance(RunState::Idle)?;

    Ok(SumReport {
        geometry,
        partial_count,
        total,
        elapsed,
    })
}
