//! Error types for batchnms.

use crate::element::DType;
use thiserror::Error;

/// Result alias for batchnms operations.
pub type NmsResult<T> = std::result::Result<T, NmsError>;

/// Errors raised when a tensor or configuration breaks the kernel contract.
///
/// Every variant is detected before a kernel touches data; the kernels
/// themselves have no failure modes on validated input.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NmsError {
    /// A tensor dimension is zero or the element count overflows.
    #[error("invalid shape: batch_size={batch_size}, num_anchors={num_anchors}, elem_length={elem_length}")]
    InvalidShape {
        batch_size: usize,
        num_anchors: usize,
        elem_length: usize,
    },
    /// The backing buffer does not hold the declared shape.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Two tensors passed to the same stage disagree on a dimension.
    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    /// Rows are too short to hold class, score and four coordinates.
    #[error("elem_length {elem_length} is shorter than the minimum of 6")]
    ElemLengthTooShort { elem_length: usize },
    /// A field offset points outside the row.
    #[error("{field} index {index} out of range for elem_length {elem_length}")]
    FieldOutOfRange {
        field: &'static str,
        index: i64,
        elem_length: usize,
    },
    /// A valid count is negative or larger than the anchor count.
    #[error("valid count {count} for batch {batch} outside [0, {num_anchors}]")]
    ValidCountOutOfRange {
        batch: usize,
        count: i32,
        num_anchors: usize,
    },
    /// A rank entry does not address a compacted candidate, or repeats one
    /// already ranked.
    #[error("rank order entry {value} at batch {batch}, rank {rank} is out of [0, {valid_count}) or repeated")]
    InvalidRankOrder {
        batch: usize,
        rank: usize,
        value: i32,
        valid_count: i32,
    },
    /// The requested backend was not compiled in.
    #[error("backend {0} is not available in this build")]
    BackendUnavailable(&'static str),
    /// The element type cannot be used on this path.
    #[error("unsupported element type: {0}")]
    UnsupportedElementType(DType),
}
