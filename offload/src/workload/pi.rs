//! Monte-Carlo estimate of pi from per-workgroup hit counts.

use crate::dispatch::{KernelArg, KernelInvocation, dispatch};
use crate::error::Result;
use crate::lifecycle::{Lifecycle, RunState};
use crate::plan::{Geometry, LocalSizePolicy};
use crate::reduce::reduce_partials;
use crate::session::ComputeSession;
use crate::types::ReduceOp;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PROGRAM_FILE: &str = "pi.cu";
pub const KERNEL: &str = "pi";

#[derive(Debug, Clone, Copy)]
pub struct PiParams {
    /// Total number of points drawn across all work-items.
    pub samples: u32,
    /// Number of work-items launched.
    pub work_items: usize,
    pub local_size: LocalSizePolicy,
    /// Base of the per-item seeds; `None` uses the current time.
    pub seed: Option<u32>,
}

impl Default for PiParams {
    fn default() -> Self {
        Self {
            samples: (i32::MAX / 2) as u32,
            work_items: 32 * 128,
            local_size: LocalSizePolicy::Fixed(32),
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PiReport {
    pub geometry: Geometry,
    pub samples: u32,
    pub inside: u64,
    pub estimate: f64,
    pub elapsed: Duration,
}

/// One seed per work-item: `base ^ i`.
pub fn seeds(base: u32, count: usize) -> Vec<u32> {
    (0..count).map(|i| base ^ i as u32).collect()
}

fn time_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default()
}

pub fn run(session: &mut ComputeSession, params: &PiParams) -> Result<PiReport> {
    let program = session.load_program(PROGRAM_FILE)?;

    let mut run = Lifecycle::new(KERNEL);
    let planner = session.planner(params.local_size);
    let geometry = run.step(RunState::Planned, || planner.plan(params.work_items, None))?;
    tracing::info!(%geometry, samples = params.samples, "planned");

    let seeds = seeds(params.seed.unwrap_or_else(time_seed), geometry.global_size);
    let output = dispatch(
        session,
        &mut run,
        &KernelInvocation {
            program,
            kernel: KERNEL,
            geometry: geometry.into(),
            args: vec![
                KernelArg::input(seeds.as_slice()),
                KernelArg::local::<u32>(geometry.local_size),
                KernelArg::output::<u32>(geometry.group_count),
                KernelArg::U32(params.samples),
            ],
        },
    )?;
    let elapsed = output.elapsed();

    let parallel_min = session.config().parallel_reduce_min;
    let inside = run.step(RunState::Reduced, || {
        Ok(reduce_partials(output.partials::<u32>()?, ReduceOp::Sum, parallel_min))
    })?;
    run.advance(RunState::Idle)?;

    let estimate = if params.samples == 0 {
        0.0
    } else {
        4.0 * inside as f64 / f64::from(params.samples)
    };
    Ok(PiReport {
        geometry,
        samples: params.samples,
        inside,
        estimate,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeds_are_distinct() {
        let s = seeds(0xdead_beef, 4096);
        let mut sorted = s.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 4096);
        assert_eq!(s[0], 0xdead_beef);
    }
}
