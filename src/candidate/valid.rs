//! Valid-count extraction: filter by score and class, compact to a prefix.

use crate::candidate::check_fields;
use crate::element::Element;
use crate::tensor::{BoxTensor, BoxTensorView, IndexTensor, INVALID_INDEX};
use crate::trace::{trace_event, trace_span};
use crate::util::NmsResult;

/// Filter settings for valid-count extraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidCountParams {
    /// Exclusive lower bound on the score.
    pub score_threshold: f32,
    /// Class id field; negative disables class filtering.
    pub id_index: i32,
    /// Score field.
    pub score_index: usize,
}

impl Default for ValidCountParams {
    fn default() -> Self {
        Self {
            score_threshold: 0.0,
            id_index: 0,
            score_index: 1,
        }
    }
}

impl ValidCountParams {
    /// Returns true when a row passes the score and class filter.
    #[inline]
    pub(crate) fn accepts<T: Element>(&self, row: &[T], threshold: T) -> bool {
        row[self.score_index] > threshold
            && (self.id_index < 0 || row[self.id_index as usize] >= T::ZERO)
    }
}

/// Output of valid-count extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidCounts<T> {
    /// Number of valid candidates per batch.
    pub counts: Vec<i32>,
    /// Valid rows compacted to the front of each batch; sentinel elsewhere.
    pub boxes: BoxTensor<T>,
    /// Original anchor index of each compacted row; `-1` past the count.
    pub indices: IndexTensor,
}

/// Compacts one batch and returns its valid count.
///
/// `out` and `out_indices` are overwritten entirely: valid rows land at the
/// front in their original order, everything after holds sentinels.
pub(crate) fn compact_batch<T: Element>(
    src: &[T],
    out: &mut [T],
    out_indices: &mut [i32],
    elem_length: usize,
    params: &ValidCountParams,
) -> i32 {
    out.fill(T::SENTINEL);
    out_indices.fill(INVALID_INDEX);

    let threshold = T::from_f32(params.score_threshold);
    let mut count = 0usize;
    for (anchor, row) in src.chunks_exact(elem_length).enumerate() {
        if !params.accepts(row, threshold) {
            continue;
        }
        out[count * elem_length..(count + 1) * elem_length].copy_from_slice(row);
        out_indices[count] = anchor as i32;
        count += 1;
    }
    count as i32
}

/// Filters every batch by score and class and compacts the survivors.
///
/// Batches are processed one after another; see
/// `kernel::rayon::get_valid_counts_par` for the batch-parallel variant.
pub fn get_valid_counts<T: Element>(
    data: BoxTensorView<'_, T>,
    params: ValidCountParams,
) -> NmsResult<ValidCounts<T>> {
    let shape = data.shape();
    check_fields(shape.elem_length(), params.id_index, params.score_index, None)?;

    let _span = trace_span!(
        "get_valid_counts",
        batch_size = shape.batch_size(),
        num_anchors = shape.num_anchors()
    )
    .entered();

    let mut boxes = BoxTensor::sentinel(shape);
    let mut indices = IndexTensor::invalid(shape.batch_size(), shape.num_anchors())?;
    let stride = shape.batch_stride();
    let elem_length = shape.elem_length();

    let counts: Vec<i32> = data
        .as_slice()
        .chunks_exact(stride)
        .zip(boxes.data_mut().chunks_exact_mut(stride))
        .zip(indices.data_mut().chunks_exact_mut(shape.num_anchors()))
        .map(|((src, out), out_indices)| {
            compact_batch(src, out, out_indices, elem_length, &params)
        })
        .collect();

    trace_event!(
        "valid_counts",
        total = counts.iter().map(|&c| c as i64).sum::<i64>()
    );
    Ok(ValidCounts {
        counts,
        boxes,
        indices,
    })
}
