use super::Communicator;
use super::helpers::{collective_recv, collective_send};
use crate::error::{OffloadError, Result};
use crate::reduce::reduce_slice;
use crate::types::{DataType, Rank, ReduceOp};

/// Tree reduce: reduce `buf` from all ranks into `buf` on the root rank.
///
/// Uses a binomial tree with O(log N) steps. Non-power-of-2 world sizes first
/// fold the excess ranks into the lower power-of-2 set. On non-root ranks
/// `buf` is left holding an intermediate value.
pub async fn tree_reduce(
    comm: &Communicator,
    buf: &mut [u8],
    count: usize,
    dtype: DataType,
    op: ReduceOp,
    root: Rank,
) -> Result<()> {
    let world = comm.world_size() as usize;
    let rank = comm.rank() as usize;
    let root = root as usize;

    let total_bytes = count * dtype.size_in_bytes();
    if buf.len() != total_bytes {
        return Err(OffloadError::BufferSizeMismatch {
            expected: total_bytes,
            actual: buf.len(),
        });
    }
    if world <= 1 {
        return Ok(());
    }

    let vrank = (rank + world - root) % world;
    let real = |v: usize| ((v + root) % world) as Rank;

    let p2 = if world.is_power_of_two() {
        world
    } else {
        world.next_power_of_two() >> 1
    };
    let excess = world - p2;

    let combine = |buf: &mut [u8], received: Vec<u8>| -> Result<()> {
        if received.len() != total_bytes {
            return Err(OffloadError::BufferSizeMismatch {
                expected: total_bytes,
                actual: received.len(),
            });
        }
        reduce_slice(buf, &received, count, dtype, op)
    };

    if vrank < excess {
        let received = collective_recv(comm, real(vrank + p2), "reduce").await?;
        combine(&mut *buf, received)?;
    } else if vrank >= p2 {
        collective_send(comm, real(vrank - p2), buf, "reduce").await?;
        return Ok(());
    }

    for round in 0..p2.trailing_zeros() {
        let mask = 1usize << round;
        let partner = vrank ^ mask;
        if vrank & mask != 0 {
            collective_send(comm, real(partner), buf, "reduce").await?;
            break;
        }
        if partner < p2 {
            let received = collective_recv(comm, real(partner), "reduce").await?;
            combine(&mut *buf, received)?;
        }
    }

    tracing::trace!(rank, root, "tree reduce step complete");
    Ok(())
}
