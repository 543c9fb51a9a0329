//! 1-D box convolution of a random integer signal.

use crate::dispatch::{KernelArg, KernelInvocation, dispatch};
use crate::error::{OffloadError, Result};
use crate::lifecycle::{Lifecycle, RunState};
use crate::plan::{Geometry, LocalSizePolicy};
use crate::session::ComputeSession;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

pub const PROGRAM_FILE: &str = "conv.cu";
pub const KERNEL: &str = "conv";

#[derive(Debug, Clone, Copy)]
pub struct ConvParams {
    /// Signal length `N`.
    pub problem_size: usize,
    pub radius: u32,
    pub local_size: LocalSizePolicy,
    /// Seed for the input signal; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            problem_size: 256,
            radius: 4,
            local_size: LocalSizePolicy::FullCapacity,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvReport {
    pub geometry: Geometry,
    pub input: Vec<u32>,
    pub output: Vec<u32>,
    pub elapsed: Duration,
}

/// `len` values drawn uniformly from `0..10`.
pub fn random_signal(len: usize, seed: Option<u64>) -> Vec<u32> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    (0..len).map(|_| rng.gen_range(0..10)).collect()
}

/// Convolve `input` with a box of half-width `radius` on the device.
pub fn convolve(
    session: &mut ComputeSession,
    input: &[u32],
    radius: u32,
    local_size: LocalSizePolicy,
) -> Result<(Geometry, Vec<u32>, Duration)> {
    let n = u32::try_from(input.len()).map_err(|_| {
        OffloadError::geometry(format!("signal of {} values is too long", input.len()))
    })?;
    let program = session.load_program(PROGRAM_FILE)?;

    let mut run = Lifecycle::new(KERNEL);
    let planner = session.planner(local_size);
    let geometry = run.step(RunState::Planned, || planner.plan(input.len(), None))?;
    tracing::info!(%geometry, radius, "planned");

    let output = dispatch(
        session,
        &mut run,
        &KernelInvocation {
            program,
            kernel: KERNEL,
            geometry: geometry.into(),
            args: vec![
                KernelArg::input(input),
                KernelArg::output::<u32>(input.len()),
                KernelArg::U32(n),
                KernelArg::U32(radius),
            ],
        },
    )?;
    let elapsed = output.elapsed();
    let values = run.step(RunState::Reduced, || output.values::<u32>())?;
    run.advance(RunState::Idle)?;
    Ok((geometry, values, elapsed))
}

/// Generate a signal per `params` and convolve it.
pub fn run(session: &mut ComputeSession, params: &ConvParams) -> Result<ConvReport> {
    let input = random_signal(params.problem_size, params.seed);
    let (geometry, output, elapsed) =
        convolve(session, &input, params.radius, params.local_size)?;
    Ok(ConvReport {
        geometry,
        input,
        output,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_signal_range_and_seed() {
        let a = random_signal(1000, Some(7));
        assert!(a.iter().all(|&v| v < 10));
        assert_eq!(a, random_signal(1000, Some(7)));
    }
}
