//! Sum of `1..=M` split across the ranks of a local cluster.
//!
//! Each rank opens its own compute session, sums its contiguous sub-range on
//! the device, and the per-rank totals are combined at the root with a tree
//! reduce.

use crate::collective::{Communicator, LocalCluster};
use crate::config::OffloadConfig;
use crate::dispatch::{KernelArg, KernelInvocation, dispatch};
use crate::error::{OffloadError, Result};
use crate::lifecycle::{Lifecycle, RunState};
use crate::plan::{Geometry, LocalSizePolicy};
use crate::reduce::reduce_partials;
use crate::session::ComputeSession;
use crate::split::{WorkRange, split};
use crate::types::{Rank, ReduceOp};
use futures::future::try_join_all;
use std::time::Duration;

pub const PROGRAM_FILE: &str = "add_numbers_range.cu";
pub const KERNEL: &str = "add_numbers_range";

#[derive(Debug, Clone, Copy)]
pub struct DistributedSumParams {
    pub problem_size: u64,
    pub world_size: u32,
    pub local_size: LocalSizePolicy,
    pub root: Rank,
}

impl Default for DistributedSumParams {
    fn default() -> Self {
        Self {
            problem_size: 64,
            world_size: 4,
            local_size: LocalSizePolicy::CapacityFraction(4),
            root: 0,
        }
    }
}

/// What one rank computed locally.
#[derive(Debug, Clone)]
pub struct RankReport {
    pub rank: Rank,
    pub range: WorkRange,
    /// `None` when the rank's range was empty and nothing was dispatched.
    pub geometry: Option<Geometry>,
    pub local_sum: i64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct DistributedSumReport {
    /// One entry per rank, in rank order.
    pub ranks: Vec<RankReport>,
    /// Global sum as received by the root.
    pub total: i64,
}

/// Sum `range` (1-indexed, inclusive view) on a fresh session.
pub fn local_range_sum(
    config: &OffloadConfig,
    rank: Rank,
    range: WorkRange,
    local_size: LocalSizePolicy,
) -> Result<RankReport> {
    if range.is_empty() {
        return Ok(RankReport {
            rank,
            range,
            geometry: None,
            local_sum: 0,
            elapsed: Duration::ZERO,
        });
    }
    let to_i32 = |v: u64| {
        i32::try_from(v).map_err(|_| {
            OffloadError::geometry(format!("range bound {v} does not fit the kernel's 32-bit ints"))
        })
    };
    let (first, last) = (to_i32(range.first())?, to_i32(range.last())?);

    let mut session = ComputeSession::open(config)?;
    let program = session.load_program(PROGRAM_FILE)?;
    let mut run = Lifecycle::new(KERNEL);
    let planner = session.planner(local_size);
    let geometry = run.step(RunState::Planned, || planner.plan(range.len() as usize, None))?;
    tracing::info!(rank, %range, %geometry, "planned");

    let output = dispatch(
        &mut session,
        &mut run,
        &KernelInvocation {
            program,
            kernel: KERNEL,
            geometry: geometry.into(),
            args: vec![
                KernelArg::output::<i64>(geometry.group_count),
                KernelArg::I32(first),
                KernelArg::I32(last),
                KernelArg::local::<i64>(geometry.local_size),
            ],
        },
    )?;
    let elapsed = output.elapsed();
    let parallel_min = config.parallel_reduce_min;
    let local_sum = run.step(RunState::Reduced, || {
        Ok(reduce_partials(output.partials::<i64>()?, ReduceOp::Sum, parallel_min))
    })?;
    run.advance(RunState::Idle)?;

    Ok(RankReport {
        rank,
        range,
        geometry: Some(geometry),
        local_sum,
        elapsed,
    })
}

async fn run_rank(
    comm: Communicator,
    config: OffloadConfig,
    params: DistributedSumParams,
) -> Result<(RankReport, Option<i64>)> {
    let rank = comm.rank();
    let range = split(params.problem_size, comm.world_size(), rank)?;
    let report = tokio::task::spawn_blocking(move || {
        local_range_sum(&config, rank, range, params.local_size)
    })
    .await
    .map_err(|e| OffloadError::CollectiveFailed {
        operation: "local sum",
        rank,
        reason: e.to_string(),
    })??;
    let total = comm
        .reduce_value(report.local_sum, ReduceOp::Sum, params.root)
        .await?;
    Ok((report, total))
}

/// Run every rank of the cluster concurrently and return the root's total.
pub async fn run(config: &OffloadConfig, params: &DistributedSumParams) -> Result<DistributedSumReport> {
    if params.root >= params.world_size {
        return Err(OffloadError::InvalidRank {
            rank: params.root,
            world_size: params.world_size,
        });
    }
    let comms =
        LocalCluster::bootstrap_with_timeout(params.world_size, config.collective_timeout)?;
    let tasks = comms.into_iter().map(|comm| {
        let rank = comm.rank();
        let handle = tokio::spawn(run_rank(comm, config.clone(), *params));
        async move {
            handle.await.map_err(|e| OffloadError::CollectiveFailed {
                operation: "rank task",
                rank,
                reason: e.to_string(),
            })?
        }
    });
    let results = try_join_all(tasks).await?;

    let mut total = None;
    let mut ranks = Vec::with_capacity(results.len());
    for (report, root_total) in results {
        total = total.or(root_total);
        ranks.push(report);
    }
    let total = total.ok_or_else(|| OffloadError::CollectiveFailed {
        operation: "reduce",
        rank: params.root,
        reason: "root produced no result".into(),
    })?;
    Ok(DistributedSumReport { ranks, total })
}
