//! Numeric element types accepted by the kernels.
//!
//! Box data is stored as fixed-width floats. Index and count tensors are
//! always `i32`, matching the sentinel convention of `-1`.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

use crate::util::{NmsError, NmsResult};

/// Tag describing the numeric type of a tensor buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Float16,
    Float32,
    Float64,
    Int8,
    Int32,
    Int64,
    UInt8,
}

impl DType {
    /// Canonical lower-case name, e.g. `float32`.
    pub fn name(self) -> &'static str {
        match self {
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Int8 => "int8",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
        }
    }

    /// Fails unless box rows can be stored in this type.
    pub fn ensure_box_type(self) -> NmsResult<()> {
        match self {
            DType::Float32 | DType::Float64 => Ok(()),
            other => Err(NmsError::UnsupportedElementType(other)),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float16" | "f16" => Ok(DType::Float16),
            "float32" | "f32" => Ok(DType::Float32),
            "float64" | "f64" => Ok(DType::Float64),
            "int8" | "i8" => Ok(DType::Int8),
            "int32" | "i32" => Ok(DType::Int32),
            "int64" | "i64" => Ok(DType::Int64),
            "uint8" | "u8" => Ok(DType::UInt8),
            other => Err(format!("unknown dtype `{other}`")),
        }
    }
}

/// Floating point element stored in box tensors.
pub trait Element:
    Copy
    + Send
    + Sync
    + PartialOrd
    + fmt::Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + 'static
{
    /// Runtime tag of this type.
    const DTYPE: DType;
    const ZERO: Self;
    /// Value written to every field of a suppressed or empty row.
    const SENTINEL: Self;

    /// Converts a threshold given in single precision.
    fn from_f32(value: f32) -> Self;

    /// Total ordering used for deterministic ranking.
    fn total_cmp(&self, other: &Self) -> Ordering;

    /// Computes the IoU of `anchor` against each box in `others`.
    ///
    /// `out` must be at least as long as `others`.
    fn overlap_lanes(anchor: [Self; 4], others: &[[Self; 4]], out: &mut [Self]) {
        for (dst, other) in out.iter_mut().zip(others.iter()) {
            *dst = crate::overlap::overlap(*other, anchor);
        }
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::Float32;
    const ZERO: Self = 0.0;
    const SENTINEL: Self = -1.0;

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(self, other)
    }

    #[cfg(feature = "simd")]
    fn overlap_lanes(anchor: [Self; 4], others: &[[Self; 4]], out: &mut [Self]) {
        crate::kernel::simd::overlap_lanes_f32(anchor, others, out);
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::Float64;
    const ZERO: Self = 0.0;
    const SENTINEL: Self = -1.0;

    #[inline]
    fn from_f32(value: f32) -> Self {
        f64::from(value)
    }

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }
}
