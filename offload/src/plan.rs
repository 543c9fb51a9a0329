//! Partition planning: how a problem domain is cut into device workgroups.
//!
//! The planner is a pure function of the problem size, the device's workgroup
//! capacity and the policies below. A fresh [`Geometry`] or [`TiledGeometry`]
//! is computed for every dispatch.

use crate::error::{OffloadError, Result};
use std::str::FromStr;

/// What happens to the tail of a 1-D domain that does not fill a workgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainderPolicy {
    /// Round the domain down to a multiple of the local size. Elements past
    /// the last full group are not computed.
    Truncate,
    /// Round the global size up to the next multiple of the local size.
    /// Kernels bounds-check against the logical domain, so the extra
    /// work-items contribute nothing.
    Pad,
}

impl FromStr for RemainderPolicy {
    type Err = OffloadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "truncate" => Ok(RemainderPolicy::Truncate),
            "pad" => Ok(RemainderPolicy::Pad),
            _ => Err(OffloadError::Config {
                key: "OFFLOAD_REMAINDER",
                value: s.to_string(),
            }),
        }
    }
}

/// How the local size is chosen when the caller does not request one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSizePolicy {
    /// A constant local size, independent of the device.
    Fixed(usize),
    /// `device_capacity / divisor`.
    CapacityFraction(usize),
    /// The full workgroup capacity of the device.
    FullCapacity,
}

impl LocalSizePolicy {
    /// Resolve the policy against a device capacity.
    pub fn resolve(self, device_capacity: usize) -> Result<usize> {
        let local = match self {
            LocalSizePolicy::Fixed(n) => n,
            LocalSizePolicy::CapacityFraction(0) => {
                return Err(OffloadError::geometry("capacity divisor must be non-zero"));
            }
            LocalSizePolicy::CapacityFraction(d) => device_capacity / d,
            LocalSizePolicy::FullCapacity => device_capacity,
        };
        if local == 0 {
            return Err(OffloadError::geometry(format!(
                "{self:?} yields an empty workgroup on a device with capacity {device_capacity}"
            )));
        }
        Ok(local)
    }
}

/// 1-D launch geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Logical problem size the geometry was planned for.
    pub domain: usize,
    pub local_size: usize,
    pub global_size: usize,
    pub group_count: usize,
}

impl Geometry {
    /// Work-items past the logical domain (non-zero only under `Pad`).
    pub fn padding(&self) -> usize {
        self.global_size.saturating_sub(self.domain)
    }

    /// Domain elements left out of the launch (non-zero only under `Truncate`).
    pub fn dropped(&self) -> usize {
        self.domain.saturating_sub(self.global_size)
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Num groups: {} GlobalSize: {} LocalSize: {}",
            self.group_count, self.global_size, self.local_size
        )
    }
}

/// Plans 1-D geometries for one device.
#[derive(Debug, Clone, Copy)]
pub struct Planner {
    pub device_capacity: usize,
    pub remainder: RemainderPolicy,
    pub default_local: LocalSizePolicy,
}

impl Planner {
    pub fn new(
        device_capacity: usize,
        default_local: LocalSizePolicy,
        remainder: RemainderPolicy,
    ) -> Self {
        Self {
            device_capacity,
            remainder,
            default_local,
        }
    }

    /// Plan a launch for `problem_size` work-items.
    ///
    /// `requested_local_size` overrides the default policy.
    pub fn plan(&self, problem_size: usize, requested_local_size: Option<usize>) -> Result<Geometry> {
        let local_size = match requested_local_size {
            Some(n) => n,
            None => self.default_local.resolve(self.device_capacity)?,
        };
        plan(
            problem_size,
            self.device_capacity,
            local_size,
            self.remainder,
        )
    }
}

/// Compute the 1-D geometry for `problem_size` with a fixed `local_size`.
pub fn plan(
    problem_size: usize,
    device_capacity: usize,
    local_size: usize,
    remainder: RemainderPolicy,
) -> Result<Geometry> {
    if local_size == 0 {
        return Err(OffloadError::geometry("local size must be non-zero"));
    }
    if local_size > device_capacity {
        return Err(OffloadError::geometry(format!(
            "local size {local_size} exceeds device workgroup capacity {device_capacity}"
        )));
    }

    let group_count = match remainder {
        RemainderPolicy::Truncate => problem_size / local_size,
        RemainderPolicy::Pad => problem_size.div_ceil(local_size),
    };
    if group_count == 0 {
        return Err(OffloadError::geometry(format!(
            "problem size {problem_size} yields zero workgroups of {local_size} ({remainder:?})"
        )));
    }
    let global_size = local_size.checked_mul(group_count).ok_or_else(|| {
        OffloadError::geometry(format!(
            "global size overflows: {group_count} groups of {local_size}"
        ))
    })?;

    let geometry = Geometry {
        domain: problem_size,
        local_size,
        global_size,
        group_count,
    };
    if geometry.dropped() > 0 {
        tracing::warn!(
            dropped = geometry.dropped(),
            domain = problem_size,
            "truncating domain to whole workgroups"
        );
    }
    Ok(geometry)
}

/// 2-D tiled launch geometry for a square problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiledGeometry {
    pub problem_size: usize,
    pub tile_size: usize,
    pub padded_extent: usize,
    pub group_count_x: usize,
    pub group_count_y: usize,
}

impl TiledGeometry {
    /// Global work size per dimension.
    pub fn global(&self) -> [usize; 2] {
        [self.padded_extent, self.padded_extent]
    }

    /// Local (tile) work size per dimension.
    pub fn local(&self) -> [usize; 2] {
        [self.tile_size, self.tile_size]
    }

    /// Total number of workgroups.
    pub fn group_count(&self) -> usize {
        self.group_count_x * self.group_count_y
    }
}

impl std::fmt::Display for TiledGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Num groups: {} GlobalSize: {} LocalSize: {}",
            self.group_count_x,
            self.padded_extent * self.padded_extent,
            self.tile_size * self.tile_size
        )
    }
}

/// Compute a square tiling for a `problem_size × problem_size` problem.
///
/// The tile edge is `floor(sqrt(device_capacity))`; the extent is padded to
/// the smallest multiple of the tile that holds the problem.
pub fn plan_tiled(problem_size: usize, device_capacity: usize) -> Result<TiledGeometry> {
    if problem_size == 0 {
        return Err(OffloadError::geometry("matrix dimension must be non-zero"));
    }
    let tile_size = device_capacity.isqrt();
    if tile_size == 0 {
        return Err(OffloadError::geometry(format!(
            "device capacity {device_capacity} cannot hold a single tile"
        )));
    }

    let padded_extent = if problem_size < tile_size {
        tile_size
    } else if problem_size % tile_size != 0 {
        problem_size + tile_size - problem_size % tile_size
    } else {
        problem_size
    };
    let groups = padded_extent / tile_size;

    Ok(TiledGeometry {
        problem_size,
        tile_size,
        padded_extent,
        group_count_x: groups,
        group_count_y: groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_local_size() {
        let g = plan(64, 128, 32, RemainderPolicy::Truncate).unwrap();
        assert_eq!(g.group_count, 2);
        assert_eq!(g.global_size, 64);
        assert_eq!(g.local_size, 32);
    }

    #[test]
    fn test_truncate_drops_tail() {
        let g = plan(70, 128, 32, RemainderPolicy::Truncate).unwrap();
        assert_eq!(g.group_count, 2);
        assert_eq!(g.global_size, 64);
        assert_eq!(g.dropped(), 6);
        assert_eq!(g.padding(), 0);
    }

    #[test]
    fn test_pad_rounds_up() {
        let g = plan(70, 128, 32, RemainderPolicy::Pad).unwrap();
        assert_eq!(g.group_count, 3);
        assert_eq!(g.global_size, 96);
        assert_eq!(g.padding(), 26);
        assert_eq!(g.dropped(), 0);
    }

    #[test]
    fn test_zero_groups_is_invalid() {
        let err = plan(16, 1024, 256, RemainderPolicy::Truncate).unwrap_err();
        assert!(matches!(err, OffloadError::InvalidGeometry(_)));
        let err = plan(0, 1024, 256, RemainderPolicy::Pad).unwrap_err();
        assert!(matches!(err, OffloadError::InvalidGeometry(_)));
    }

    #[test]
    fn test_local_size_bounds() {
        assert!(plan(64, 128, 0, RemainderPolicy::Pad).is_err());
        assert!(plan(1024, 128, 256, RemainderPolicy::Pad).is_err());
    }

    #[test]
    fn test_partition_invariant_holds() {
        for remainder in [RemainderPolicy::Truncate, RemainderPolicy::Pad] {
            for capacity in 1..=64usize {
                for local in 1..=capacity {
                    for size in 0..=130usize {
                        match plan(size, capacity, local, remainder) {
                            Ok(g) => {
                                assert!(g.group_count >= 1);
                                assert_eq!(g.global_size % g.local_size, 0);
                                assert_eq!(g.global_size / g.local_size, g.group_count);
                            }
                            Err(e) => assert!(matches!(e, OffloadError::InvalidGeometry(_))),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_planner_default_policies() {
        let quarter = Planner::new(1024, LocalSizePolicy::CapacityFraction(4), RemainderPolicy::Pad);
        assert_eq!(quarter.plan(1000, None).unwrap().local_size, 256);
        assert_eq!(quarter.plan(1000, Some(64)).unwrap().local_size, 64);

        let full = Planner::new(512, LocalSizePolicy::FullCapacity, RemainderPolicy::Pad);
        let g = full.plan(256, None).unwrap();
        assert_eq!(g.group_count, 1);
        assert_eq!(g.global_size, 512);

        let fixed = Planner::new(512, LocalSizePolicy::Fixed(32), RemainderPolicy::Truncate);
        assert_eq!(fixed.plan(64, None).unwrap().group_count, 2);
    }

    #[test]
    fn test_capacity_fraction_too_small() {
        assert!(LocalSizePolicy::CapacityFraction(4).resolve(3).is_err());
        assert!(LocalSizePolicy::CapacityFraction(0).resolve(64).is_err());
    }

    #[test]
    fn test_tiled_pads_small_problem_to_one_tile() {
        let t = plan_tiled(5, 256).unwrap();
        assert_eq!(t.tile_size, 16);
        assert_eq!(t.padded_extent, 16);
        assert_eq!(t.group_count_x, 1);
        assert_eq!(t.group_count_y, 1);
    }

    #[test]
    fn test_tiled_rounds_to_next_tile() {
        let t = plan_tiled(33, 256).unwrap();
        assert_eq!(t.padded_extent, 48);
        assert_eq!(t.group_count(), 9);
        assert_eq!(plan_tiled(32, 256).unwrap().padded_extent, 32);
    }

    #[test]
    fn test_tile_is_floor_sqrt() {
        assert_eq!(plan_tiled(10, 1000).unwrap().tile_size, 31);
        assert_eq!(plan_tiled(10, 1).unwrap().tile_size, 1);
        assert!(plan_tiled(10, 0).is_err());
        assert!(plan_tiled(0, 256).is_err());
    }

    #[test]
    fn test_padding_is_minimal() {
        for capacity in 1..=300usize {
            for size in 1..=100usize {
                let t = plan_tiled(size, capacity).unwrap();
                assert!(t.padded_extent >= size);
                assert_eq!(t.padded_extent % t.tile_size, 0);
                assert!(t.padded_extent < size.max(t.tile_size) + t.tile_size);
                assert!(t.padded_extent - t.tile_size < size || t.padded_extent == t.tile_size);
            }
        }
    }

    #[test]
    fn test_remainder_policy_parse() {
        assert_eq!("Pad".parse::<RemainderPolicy>().unwrap(), RemainderPolicy::Pad);
        assert_eq!(
            "truncate".parse::<RemainderPolicy>().unwrap(),
            RemainderPolicy::Truncate
        );
        assert!("round".parse::<RemainderPolicy>().is_err());
    }
}
