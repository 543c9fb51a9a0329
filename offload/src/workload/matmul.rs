//! Square matrix product over zero-padded tiles.

use crate::dispatch::{KernelArg, KernelInvocation, dispatch};
use crate::error::{OffloadError, Result};
use crate::lifecycle::{Lifecycle, RunState};
use crate::plan::{TiledGeometry, plan_tiled};
use crate::session::ComputeSession;
use crate::types::Element;
use std::fmt;
use std::time::Duration;

pub const PROGRAM_FILE: &str = "matmul.cu";
pub const KERNEL: &str = "matmul";

/// Row-major `extent × extent` storage holding a `logical × logical` matrix
/// in its top-left block. Everything outside that block is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedMatrix<T> {
    logical: usize,
    extent: usize,
    data: Vec<T>,
}

impl<T: Element + Default> PaddedMatrix<T> {
    pub fn zeros(logical: usize, extent: usize) -> Result<Self> {
        if extent < logical {
            return Err(OffloadError::geometry(format!(
                "padded extent {extent} is smaller than the {logical}x{logical} matrix"
            )));
        }
        Ok(Self {
            logical,
            extent,
            data: vec![T::default(); extent * extent],
        })
    }

    /// Fill the logical block with `f(row, col)`.
    pub fn from_fn(logical: usize, extent: usize, f: impl Fn(usize, usize) -> T) -> Result<Self> {
        let mut m = Self::zeros(logical, extent)?;
        for r in 0..logical {
            for c in 0..logical {
                m.data[r * extent + c] = f(r, c);
            }
        }
        Ok(m)
    }

    /// Wrap a full `extent × extent` buffer read back from the device.
    pub fn from_vec(logical: usize, extent: usize, data: Vec<T>) -> Result<Self> {
        if extent < logical {
            return Err(OffloadError::geometry(format!(
                "padded extent {extent} is smaller than the {logical}x{logical} matrix"
            )));
        }
        if data.len() != extent * extent {
            return Err(OffloadError::BufferSizeMismatch {
                expected: extent * extent * T::DTYPE.size_in_bytes(),
                actual: data.len() * T::DTYPE.size_in_bytes(),
            });
        }
        Ok(Self {
            logical,
            extent,
            data,
        })
    }

    pub fn logical_size(&self) -> usize {
        self.logical
    }

    pub fn extent(&self) -> usize {
        self.extent
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.extent + col]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The logical matrix, row-major and without padding.
    pub fn logical_block(&self) -> Vec<T> {
        self.data
            .chunks_exact(self.extent)
            .take(self.logical)
            .flat_map(|row| row[..self.logical].iter().copied())
            .collect()
    }
}

impl<T: Element + Default + fmt::Display> fmt::Display for PaddedMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.logical {
            for c in 0..self.logical {
                write!(f, "{}\t", self.get(r, c))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatmulParams {
    /// Logical matrix dimension `M`.
    pub problem_size: usize,
}

impl Default for MatmulParams {
    fn default() -> Self {
        Self { problem_size: 5 }
    }
}

#[derive(Debug, Clone)]
pub struct MatmulReport {
    pub geometry: TiledGeometry,
    pub a: PaddedMatrix<u32>,
    pub b: PaddedMatrix<u32>,
    pub c: PaddedMatrix<u32>,
    pub elapsed: Duration,
}

/// `A[i][j] = i·M + j + 1` and `B = Aᵀ`, padded to `extent`.
pub fn operands(logical: usize, extent: usize) -> Result<(PaddedMatrix<u32>, PaddedMatrix<u32>)> {
    let value = |i: usize, j: usize| (i * logical + j + 1) as u32;
    let a = PaddedMatrix::from_fn(logical, extent, value)?;
    let b = PaddedMatrix::from_fn(logical, extent, |i, j| value(j, i))?;
    Ok((a, b))
}

/// Multiply two padded matrices of the same shape on the device.
pub fn multiply(
    session: &mut ComputeSession,
    geometry: TiledGeometry,
    a: &PaddedMatrix<u32>,
    b: &PaddedMatrix<u32>,
) -> Result<(PaddedMatrix<u32>, Duration)> {
    let extent = geometry.padded_extent;
    if a.extent() != extent || b.extent() != extent {
        return Err(OffloadError::geometry(format!(
            "operands are {}x{} and {}x{}, launch covers {extent}x{extent}",
            a.extent(),
            a.extent(),
            b.extent(),
            b.extent()
        )));
    }
    let m = u32::try_from(extent)
        .map_err(|_| OffloadError::geometry(format!("extent {extent} does not fit in u32")))?;
    let program = session.load_program(PROGRAM_FILE)?;

    let mut run = Lifecycle::new(KERNEL);
    run.advance(RunState::Planned)?;
    let output = dispatch(
        session,
        &mut run,
        &KernelInvocation {
            program,
            kernel: KERNEL,
            geometry: geometry.into(),
            args: vec![
                KernelArg::input(a.as_slice()),
                KernelArg::input(b.as_slice()),
                KernelArg::output::<u32>(extent * extent),
                KernelArg::U32(m),
            ],
        },
    )?;
    let elapsed = output.elapsed();
    let logical = a.logical_size();
    let c = run.step(RunState::Reduced, || {
        PaddedMatrix::from_vec(logical, extent, output.values::<u32>()?)
    })?;
    run.advance(RunState::Idle)?;
    Ok((c, elapsed))
}

/// Build the operands for `params`, pad them to whole tiles and multiply.
pub fn run(session: &mut ComputeSession, params: &MatmulParams) -> Result<MatmulReport> {
    let geometry = plan_tiled(params.problem_size, session.device().max_work_group_size)?;
    tracing::info!(%geometry, padded = geometry.padded_extent, "planned");
    let (a, b) = operands(params.problem_size, geometry.padded_extent)?;
    let (c, elapsed) = multiply(session, geometry, &a, &b)?;
    Ok(MatmulReport {
        geometry,
        a,
        b,
        c,
        elapsed,
    })
}
