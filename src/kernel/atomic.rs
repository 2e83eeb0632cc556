//! Atomic accumulation capability.
//!
//! Parallel kernels that accumulate into shared counters go through
//! [`AtomicAdd`] instead of naming a concrete atomic type. Integer adds map
//! to `fetch_add`; float adds are a compare-exchange loop on the bit
//! pattern. The set of implementors is fixed at compile time.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::element::DType;
use crate::util::{NmsError, NmsResult};

/// Element type that supports atomic addition.
pub trait AtomicAdd: Copy + Send + Sync {
    /// Shared cell holding a value of this type.
    type Cell: Send + Sync;

    const DTYPE: DType;

    fn new_cell(value: Self) -> Self::Cell;

    /// Adds `value` to `cell` and returns the previous value.
    fn atomic_add(cell: &Self::Cell, value: Self) -> Self;

    fn load(cell: &Self::Cell) -> Self;
}

impl AtomicAdd for i32 {
    type Cell = AtomicI32;
    const DTYPE: DType = DType::Int32;

    fn new_cell(value: Self) -> Self::Cell {
        AtomicI32::new(value)
    }

    #[inline]
    fn atomic_add(cell: &Self::Cell, value: Self) -> Self {
        cell.fetch_add(value, Ordering::Relaxed)
    }

    fn load(cell: &Self::Cell) -> Self {
        cell.load(Ordering::Relaxed)
    }
}

impl AtomicAdd for f32 {
    type Cell = AtomicU32;
    const DTYPE: DType = DType::Float32;

    fn new_cell(value: Self) -> Self::Cell {
        AtomicU32::new(value.to_bits())
    }

    #[inline]
    fn atomic_add(cell: &Self::Cell, value: Self) -> Self {
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + value).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(prev) => return f32::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }

    fn load(cell: &Self::Cell) -> Self {
        f32::from_bits(cell.load(Ordering::Relaxed))
    }
}

impl AtomicAdd for f64 {
    type Cell = AtomicU64;
    const DTYPE: DType = DType::Float64;

    fn new_cell(value: Self) -> Self::Cell {
        AtomicU64::new(value.to_bits())
    }

    #[inline]
    fn atomic_add(cell: &Self::Cell, value: Self) -> Self {
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(prev) => return f64::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }

    fn load(cell: &Self::Cell) -> Self {
        f64::from_bits(cell.load(Ordering::Relaxed))
    }
}

/// Fails unless `dtype` has an [`AtomicAdd`] implementation.
pub fn ensure_supported(dtype: DType) -> NmsResult<()> {
    match dtype {
        DType::Int32 | DType::Float32 | DType::Float64 => Ok(()),
        other => Err(NmsError::UnsupportedElementType(other)),
    }
}
