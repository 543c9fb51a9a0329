//! Host implementations of the kernels shipped in `offload/kernels/`.
//!
//! Each function follows the argument contract of the `__global__` entry
//! point of the same name. Workgroups are independent and run on the rayon
//! pool; work-items inside a group are emulated sequentially, with local
//! memory modelled as a per-group scratch vector.

use super::{HostKernelFn, KernelArgs, LaunchDims};
use crate::error::{OffloadError, Result};
use rayon::prelude::*;

/// LCG multiplier and increment used by the `pi` kernel.
pub const LCG_A: u32 = 1_664_525;
pub const LCG_C: u32 = 1_013_904_223;

pub(super) fn builtin() -> [(&'static str, HostKernelFn); 5] {
    [
        ("add_numbers", add_numbers),
        ("add_numbers_range", add_numbers_range),
        ("conv", conv),
        ("matmul", matmul),
        ("pi", pi),
    ]
}

fn one_dimensional(dims: &LaunchDims, kernel: &str) -> Result<()> {
    if dims.global[1] != 1 || dims.local[1] != 1 {
        return Err(OffloadError::dispatch(
            "executing kernel",
            format!("{kernel} expects a 1-D launch, got {:?}", dims.global),
        ));
    }
    Ok(())
}

/// Tree reduction over local scratch, as a workgroup does with barriers
/// between halving steps.
fn group_tree_sum(scratch: &mut [i64]) -> i64 {
    let mut len = scratch.len();
    while len > 1 {
        let half = len.div_ceil(2);
        for i in 0..len - half {
            scratch[i] = scratch[i].wrapping_add(scratch[i + half]);
        }
        len = half;
    }
    scratch.first().copied().unwrap_or(0)
}

/// Per-group sums of `first + gid` for every work-item with `first + gid <= last`.
fn range_sums(dims: &LaunchDims, first: i64, last: i64) -> Vec<i64> {
    let local = dims.group_items();
    (0..dims.total_groups())
        .into_par_iter()
        .map(|group| {
            let mut scratch: Vec<i64> = (0..local)
                .map(|lid| {
                    let value = first + (group * local + lid) as i64;
                    if value <= last { value } else { 0 }
                })
                .collect();
            group_tree_sum(&mut scratch)
        })
        .collect()
}

/// `add_numbers(long long *sums, int count, __shared__ long long scratch[])`
///
/// Work-item `gid` contributes `gid + 1` when `gid < count`.
pub fn add_numbers(dims: &LaunchDims, args: &mut KernelArgs<'_>) -> Result<()> {
    one_dimensional(dims, "add_numbers")?;
    let count = args.i32(1)?;
    args.local::<i64>(2, dims.group_items())?;
    let sums = range_sums(dims, 1, i64::from(count));
    args.write(0, &sums)
}

/// `add_numbers_range(long long *sums, int first, int last, __shared__ ...)`
///
/// Work-item `gid` contributes `first + gid` when it does not pass `last`.
pub fn add_numbers_range(dims: &LaunchDims, args: &mut KernelArgs<'_>) -> Result<()> {
    one_dimensional(dims, "add_numbers_range")?;
    let first = args.i32(1)?;
    let last = args.i32(2)?;
    args.local::<i64>(3, dims.group_items())?;
    let sums = range_sums(dims, i64::from(first), i64::from(last));
    args.write(0, &sums)
}

/// `conv(const unsigned *in, unsigned *out, unsigned n, unsigned radius)`
///
/// Box filter: `out[i]` is the sum of `in[j]` for `j` within `radius` of `i`,
/// clipped to `[0, n)`.
pub fn conv(dims: &LaunchDims, args: &mut KernelArgs<'_>) -> Result<()> {
    one_dimensional(dims, "conv")?;
    let input = args.input::<u32>(0)?;
    let n = args.u32(2)? as usize;
    let radius = args.u32(3)? as usize;
    if input.len() < n {
        return Err(OffloadError::dispatch(
            "executing kernel",
            format!("conv: input holds {} values, n is {n}", input.len()),
        ));
    }
    let items = dims.global_items().min(n);
    let out: Vec<u32> = (0..items)
        .into_par_iter()
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            input[lo..=hi].iter().fold(0u32, |acc, &v| acc.wrapping_add(v))
        })
        .collect();
    args.write(1, &out)
}

/// `matmul(const unsigned *a, const unsigned *b, unsigned *c, unsigned m)`
///
/// Row-major `m × m` product, one work-item per output element, launched as
/// square tiles over the whole padded extent.
pub fn matmul(dims: &LaunchDims, args: &mut KernelArgs<'_>) -> Result<()> {
    let m = args.u32(3)? as usize;
    if dims.global != [m, m] {
        return Err(OffloadError::dispatch(
            "executing kernel",
            format!("matmul: launch {:?} does not cover a {m}x{m} matrix", dims.global),
        ));
    }
    let a = args.input::<u32>(0)?;
    let b = args.input::<u32>(1)?;
    if a.len() < m * m || b.len() < m * m {
        return Err(OffloadError::dispatch(
            "executing kernel",
            format!("matmul: operands are smaller than {m}x{m}"),
        ));
    }
    let mut c = vec![0u32; m * m];
    c.par_chunks_mut(m).enumerate().for_each(|(row, out)| {
        for (col, cell) in out.iter_mut().enumerate() {
            *cell = (0..m).fold(0u32, |acc, k| {
                acc.wrapping_add(a[row * m + k].wrapping_mul(b[k * m + col]))
            });
        }
    });
    args.write(2, &c)
}

/// `pi(const unsigned *seeds, __shared__ unsigned scratch[], unsigned *inside,
/// unsigned samples)`
///
/// Each work-item draws points in the unit square from its own LCG stream and
/// counts those inside the quarter circle. `samples` is shared out across all
/// work-items; the first `samples % global` items draw one extra point.
pub fn pi(dims: &LaunchDims, args: &mut KernelArgs<'_>) -> Result<()> {
    one_dimensional(dims, "pi")?;
    let seeds = args.input::<u32>(0)?;
    args.local::<u32>(1, dims.group_items())?;
    let samples = args.u32(3)? as usize;
    let global = dims.global_items();
    if seeds.len() < global {
        return Err(OffloadError::dispatch(
            "executing kernel",
            format!("pi: {} seeds for {global} work-items", seeds.len()),
        ));
    }
    let (per_item, extra) = (samples / global, samples % global);
    let local = dims.group_items();

    let inside: Vec<u32> = (0..dims.total_groups())
        .into_par_iter()
        .map(|group| {
            let mut scratch: Vec<i64> = (0..local)
                .map(|lid| {
                    let gid = group * local + lid;
                    let draws = per_item + usize::from(gid < extra);
                    i64::from(count_inside(seeds[gid], draws))
                })
                .collect();
            group_tree_sum(&mut scratch) as u32
        })
        .collect();
    args.write(2, &inside)
}

fn next_unit(state: &mut u32) -> f32 {
    *state = state.wrapping_mul(LCG_A).wrapping_add(LCG_C);
    (*state >> 8) as f32 / (1u32 << 24) as f32
}

fn count_inside(seed: u32, draws: usize) -> u32 {
    let mut state = seed;
    let mut inside = 0u32;
    for _ in 0..draws {
        let x = next_unit(&mut state);
        let y = next_unit(&mut state);
        if x * x + y * y <= 1.0 {
            inside += 1;
        }
    }
    inside
}
