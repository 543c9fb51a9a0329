//! Host-side combination of per-workgroup partial results, and the shared
//! element-wise primitives used by the collective layer.

use crate::error::{OffloadError, Result};
use crate::types::{DataType, Element, ReduceOp};
use rayon::prelude::*;

/// Trait for types that support the four reduction operations.
pub trait Reducible: Element {
    fn reduce(a: Self, b: Self, op: ReduceOp) -> Self;
    fn identity(op: ReduceOp) -> Self;
}

macro_rules! impl_reducible {
    (int: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }

                #[inline]
                fn identity(op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => 0,
                        ReduceOp::Prod => 1,
                        ReduceOp::Min => <$ty>::MAX,
                        ReduceOp::Max => <$ty>::MIN,
                    }
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a + b,
                        ReduceOp::Prod => a * b,
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }

                #[inline]
                fn identity(op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => 0.0,
                        ReduceOp::Prod => 1.0,
                        ReduceOp::Min => <$ty>::MAX,
                        ReduceOp::Max => <$ty>::MIN,
                    }
                }
            }
        )*
    };
}

impl_reducible!(int: i32, i64, u32, u64);
impl_reducible!(float: f32, f64);

/// Per-item types paired with the accumulator they are summed into.
///
/// 32-bit partials are widened to 64 bits so that millions of them can be
/// combined without wrapping.
pub trait Accumulate: Element {
    type Acc: Reducible;

    fn widen(self) -> Self::Acc;
}

macro_rules! impl_accumulate {
    ($($ty:ty => $acc:ty),*) => {
        $(
            impl Accumulate for $ty {
                type Acc = $acc;

                #[inline]
                fn widen(self) -> $acc {
                    self as $acc
                }
            }
        )*
    };
}

impl_accumulate!(u32 => u64, i32 => i64, u64 => u64, i64 => i64, f32 => f64, f64 => f64);

/// One result per workgroup, in group order, as transferred from the device.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResultSet<T> {
    values: Vec<T>,
}

impl<T: Element> PartialResultSet<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self { values }
    }

    /// Decode a device output buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(crate::types::decode(bytes)?))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<T> {
        self.values
    }
}

/// Sequential left fold over the partials with a widened accumulator.
pub fn reduce_sequential<T: Accumulate>(partials: &[T], op: ReduceOp) -> T::Acc {
    partials
        .iter()
        .fold(T::Acc::identity(op), |acc, &v| T::Acc::reduce(acc, v.widen(), op))
}

/// Combine every partial into one scalar.
///
/// Sets of at least `parallel_min` entries are folded on the rayon pool: each
/// worker thread keeps its own accumulator and the per-thread values are
/// combined at the end. The result is independent of entry order.
pub fn reduce_partials<T: Accumulate>(
    partials: PartialResultSet<T>,
    op: ReduceOp,
    parallel_min: usize,
) -> T::Acc {
    let values = partials.into_vec();
    if values.len() < parallel_min.max(2) {
        return reduce_sequential(&values, op);
    }
    values
        .par_iter()
        .fold(
            || T::Acc::identity(op),
            |acc, &v| T::Acc::reduce(acc, v.widen(), op),
        )
        .reduce(|| T::Acc::identity(op), |a, b| T::Acc::reduce(a, b, op))
}

/// Element-wise reduce on byte slices interpreted as `dtype` elements.
///
/// `dst` and `src` must both contain exactly `count * dtype.size_in_bytes()` bytes.
pub fn reduce_slice(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    dtype: DataType,
    op: ReduceOp,
) -> Result<()> {
    let expected = count * dtype.size_in_bytes();
    if dst.len() != expected || src.len() != expected {
        return Err(OffloadError::BufferSizeMismatch {
            expected,
            actual: if dst.len() != expected {
                dst.len()
            } else {
                src.len()
            },
        });
    }
    match dtype {
        DataType::F32 => reduce_slice_typed::<f32>(dst, src, op),
        DataType::F64 => reduce_slice_typed::<f64>(dst, src, op),
        DataType::I32 => reduce_slice_typed::<i32>(dst, src, op),
        DataType::I64 => reduce_slice_typed::<i64>(dst, src, op),
        DataType::U32 => reduce_slice_typed::<u32>(dst, src, op),
        DataType::U64 => reduce_slice_typed::<u64>(dst, src, op),
    }
    Ok(())
}

fn reduce_slice_typed<T: Reducible>(dst: &mut [u8], src: &[u8], op: ReduceOp) {
    let t_size = T::DTYPE.size_in_bytes();
    for (d, s) in dst.chunks_exact_mut(t_size).zip(src.chunks_exact(t_size)) {
        let r = T::reduce(T::read_le(d), T::read_le(s), op);
        r.write_le(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{decode, encode};

    #[test]
    fn test_sum_widens_u32() {
        let partials = PartialResultSet::new(vec![u32::MAX, u32::MAX, 2]);
        let total = reduce_partials(partials, ReduceOp::Sum, 0);
        assert_eq!(total, 2 * u32::MAX as u64 + 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let values: Vec<i64> = (0..100_000).map(|i| (i * 7919) % 1013 - 500).collect();
        let seq = reduce_sequential(&values, ReduceOp::Sum);
        let par = reduce_partials(PartialResultSet::new(values), ReduceOp::Sum, 1);
        assert_eq!(seq, par);
    }

    #[test]
    fn test_permutation_invariance() {
        let values: Vec<u32> = (1..=257).collect();
        let mut reversed = values.clone();
        reversed.reverse();
        let mut rotated = values.clone();
        rotated.rotate_left(100);
        for op in [ReduceOp::Sum, ReduceOp::Min, ReduceOp::Max] {
            let a = reduce_partials(PartialResultSet::new(values.clone()), op, 1);
            let b = reduce_partials(PartialResultSet::new(reversed.clone()), op, 1);
            let c = reduce_partials(PartialResultSet::new(rotated.clone()), op, usize::MAX);
            assert_eq!(a, b, "{op}");
            assert_eq!(a, c, "{op}");
        }
    }

    #[test]
    fn test_split_groups_same_total() {
        // 64 values as two groups of 32 vs one group of 64.
        let items: Vec<i64> = (1..=64).collect();
        let two: Vec<i64> = items.chunks(32).map(|c| c.iter().sum()).collect();
        let one: Vec<i64> = vec![items.iter().sum()];
        assert_eq!(
            reduce_partials(PartialResultSet::new(two), ReduceOp::Sum, 0),
            reduce_partials(PartialResultSet::new(one), ReduceOp::Sum, 0)
        );
    }

    #[test]
    fn test_empty_set_is_identity() {
        let empty: PartialResultSet<u32> = PartialResultSet::new(Vec::new());
        assert_eq!(reduce_partials(empty, ReduceOp::Sum, 0), 0);
        let empty: PartialResultSet<i32> = PartialResultSet::new(Vec::new());
        assert_eq!(reduce_partials(empty, ReduceOp::Min, 0), i64::MAX);
    }

    #[test]
    fn test_from_bytes() {
        let set = PartialResultSet::<i64>::from_bytes(&encode(&[528i64, 1552])).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(reduce_partials(set, ReduceOp::Sum, 0), 2080);
    }

    #[test]
    fn test_reduce_slice_sum_f32() {
        let mut dst = encode(&[1.0f32, 2.0, 3.0, 4.0]);
        let src = encode(&[10.0f32, 20.0, 30.0, 40.0]);
        reduce_slice(&mut dst, &src, 4, DataType::F32, ReduceOp::Sum).unwrap();
        assert_eq!(decode::<f32>(&dst).unwrap(), vec![11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn test_reduce_slice_max_i64() {
        let mut dst = encode(&[1i64, -9]);
        let src = encode(&[-4i64, 3]);
        reduce_slice(&mut dst, &src, 2, DataType::I64, ReduceOp::Max).unwrap();
        assert_eq!(decode::<i64>(&dst).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_reduce_slice_size_mismatch() {
        let mut dst = [0u8; 8];
        let src = [0u8; 4];
        let result = reduce_slice(&mut dst, &src, 2, DataType::U32, ReduceOp::Sum);
        assert!(matches!(
            result,
            Err(OffloadError::BufferSizeMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }
}
