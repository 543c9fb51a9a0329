use crate::error::{OffloadError, Result};

/// Rank of a participant in a communicator group (0-indexed).
pub type Rank = u32;

/// Element types that kernels exchange with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    F32 = 0,
    F64 = 1,
    I32 = 2,
    I64 = 3,
    U32 = 4,
    U64 = 5,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Associative, commutative combining operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Prod,
    Min,
    Max,
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
            ReduceOp::Prod => f.write_str("prod"),
            ReduceOp::Min => f.write_str("min"),
            ReduceOp::Max => f.write_str("max"),
        }
    }
}

/// A scalar that can cross the host/device boundary as little-endian bytes.
pub trait Element: Copy + Send + Sync + std::fmt::Debug + 'static {
    const DTYPE: DataType;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),*) => {
        $(
            impl Element for $ty {
                const DTYPE: DataType = DataType::$dtype;

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Self::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element!(f32 => F32, f64 => F64, i32 => I32, i64 => I64, u32 => U32, u64 => U64);

/// Encode a typed slice as little-endian bytes.
pub fn encode<T: Element>(values: &[T]) -> Vec<u8> {
    let t_size = T::DTYPE.size_in_bytes();
    let mut buf = vec![0u8; values.len() * t_size];
    for (chunk, v) in buf.chunks_exact_mut(t_size).zip(values) {
        v.write_le(chunk);
    }
    buf
}

/// Decode little-endian bytes into a typed vector.
pub fn decode<T: Element>(bytes: &[u8]) -> Result<Vec<T>> {
    let t_size = T::DTYPE.size_in_bytes();
    if bytes.len() % t_size != 0 {
        return Err(OffloadError::BufferSizeMismatch {
            expected: bytes.len() - bytes.len() % t_size,
            actual: bytes.len(),
        });
    }
    Ok(bytes.chunks_exact(t_size).map(T::read_le).collect())
}
