//! Contiguous range splitting across cooperating workers.

use crate::error::{OffloadError, Result};
use crate::types::Rank;

/// Half-open interval `[start, end)` of a 0-indexed domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRange {
    pub start: u64,
    pub end: u64,
}

impl WorkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// First element when the domain is numbered from 1.
    pub fn first(&self) -> u64 {
        self.start + 1
    }

    /// Last element (inclusive) when the domain is numbered from 1.
    pub fn last(&self) -> u64 {
        self.end
    }
}

impl std::fmt::Display for WorkRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Range of `domain_size` owned by `worker_index` out of `worker_count`.
///
/// Boundaries are `i * domain_size / worker_count` with truncating division,
/// so consecutive workers share a boundary and lengths differ by at most one.
/// Every worker computes its range locally; the same inputs must be used on
/// all workers.
pub fn split(domain_size: u64, worker_count: u32, worker_index: Rank) -> Result<WorkRange> {
    if worker_count == 0 || worker_index >= worker_count {
        return Err(OffloadError::InvalidRank {
            rank: worker_index,
            world_size: worker_count,
        });
    }
    let boundary = |i: u32| (i as u128 * domain_size as u128 / worker_count as u128) as u64;
    let range = WorkRange {
        start: boundary(worker_index),
        end: boundary(worker_index + 1),
    };
    if range.is_empty() {
        tracing::warn!(
            worker_index,
            worker_count,
            domain_size,
            "worker received an empty range"
        );
    }
    Ok(range)
}
