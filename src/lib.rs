//! batchnms is a CPU-first batched non-maximum suppression library for
//! object-detection post-processing.
//!
//! Candidates are rows of `[class_id, score, x1, y1, x2, y2, ...]` in a
//! `[batch_size, num_anchors, elem_length]` tensor. The pipeline filters them
//! by score, ranks them by descending score, greedily suppresses overlapping
//! lower-ranked boxes of the same class, and returns either the surviving
//! original anchor indices or the suppressed box tensor. Batches can run in
//! parallel via the `rayon` feature; the `simd` feature vectorizes the IoU
//! evaluation for `f32` data.

pub mod candidate;
pub mod element;
pub mod kernel;
pub mod lowlevel;
pub mod overlap;
pub mod pipeline;
pub mod tensor;
mod trace;
pub mod util;

pub use element::{DType, Element};
pub use overlap::overlap;
pub use pipeline::{Backend, NmsConfig, NmsOutput, NonMaxSuppression};
pub use tensor::{BoxTensor, BoxTensorView, IndexTensor, TensorShape, INVALID_INDEX};
pub use util::{NmsError, NmsResult};
