//! Rank-order suppression kernels.
//!
//! A kernel reorders each batch's compacted candidates by rank, runs greedy
//! suppression, applies the output cap, and maps survivors back to their
//! original anchor indices. Rank `k` must be fully resolved before rank
//! `k + 1` looks at any row; the scalar kernel gets this for free, the rayon
//! kernel joins its parallel sweep before advancing `k`.

use crate::candidate::rank::check_rank_row;
use crate::candidate::{check_fields, check_valid_counts};
use crate::element::Element;
use crate::tensor::{BoxTensor, BoxTensorView, IndexTensor};
use crate::util::NmsResult;

pub mod atomic;
pub mod scalar;

#[cfg(feature = "simd")]
pub(crate) mod simd;

#[cfg(feature = "rayon")]
pub mod rayon;

/// Suppression settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SuppressParams {
    /// Survivors kept per batch after suppression; `<= 0` keeps all.
    pub max_output_size: i32,
    /// IoU at or above which the lower-ranked box is suppressed; `<= 0`
    /// disables suppression.
    pub iou_threshold: f32,
    /// Suppress across classes.
    pub force_suppress: bool,
    /// Ranks that take part in suppression; `<= 0` keeps all.
    pub top_k: i32,
    /// First of the four coordinate fields.
    pub coord_start: usize,
    /// Class id field; negative disables class matching.
    pub id_index: i32,
    /// Score field.
    pub score_index: usize,
}

impl Default for SuppressParams {
    fn default() -> Self {
        Self {
            max_output_size: -1,
            iou_threshold: 0.5,
            force_suppress: false,
            top_k: -1,
            coord_start: 2,
            id_index: 0,
            score_index: 1,
        }
    }
}

impl SuppressParams {
    /// Whether a batch with `valid_count` candidates is reordered and
    /// suppressed, as opposed to passed through unchanged.
    #[inline]
    pub fn suppression_enabled(&self, valid_count: i32) -> bool {
        self.iou_threshold > 0.0 && valid_count > 0
    }

    /// Number of ranks kept by the top-k pre-filter.
    #[inline]
    pub fn nkeep(&self, valid_count: i32) -> usize {
        if self.top_k > 0 && self.top_k < valid_count {
            self.top_k as usize
        } else {
            valid_count.max(0) as usize
        }
    }

    /// A row can suppress or be suppressed only while its score is positive
    /// and, with class filtering on, its class id is non-negative.
    #[inline]
    pub(crate) fn is_live<T: Element>(&self, row: &[T]) -> bool {
        row[self.score_index] > T::ZERO
            && (self.id_index < 0 || row[self.id_index as usize] >= T::ZERO)
    }

    #[inline]
    pub(crate) fn classes_match<T: Element>(&self, a: &[T], b: &[T]) -> bool {
        self.force_suppress
            || self.id_index < 0
            || a[self.id_index as usize] == b[self.id_index as usize]
    }

    #[inline]
    pub(crate) fn mark_suppressed<T: Element>(&self, row: &mut [T]) {
        row[self.score_index] = T::SENTINEL;
        if self.id_index >= 0 {
            row[self.id_index as usize] = T::SENTINEL;
        }
    }
}

/// Inputs of the suppression stage.
#[derive(Clone, Copy, Debug)]
pub struct SuppressInput<'a, T> {
    /// Compacted boxes, usually from valid-count extraction.
    pub data: BoxTensorView<'a, T>,
    /// Descending-score permutation of each batch's compacted prefix.
    pub rank_order: &'a IndexTensor,
    /// Compacted candidates per batch.
    pub valid_counts: &'a [i32],
    /// Original anchor index of each compacted position.
    pub indices: &'a IndexTensor,
}

impl<'a, T: Element> SuppressInput<'a, T> {
    /// Checks shapes, field offsets, counts, and the ranks that will be read.
    pub fn validate(&self, params: &SuppressParams) -> NmsResult<()> {
        let shape = self.data.shape();
        check_fields(
            shape.elem_length(),
            params.id_index,
            params.score_index,
            Some(params.coord_start),
        )?;
        check_valid_counts(self.valid_counts, shape.batch_size(), shape.num_anchors())?;
        self.rank_order.ensure_matches(shape, "rank_order")?;
        self.indices.ensure_matches(shape, "indices")?;

        for (b, &count) in self.valid_counts.iter().enumerate() {
            if !params.suppression_enabled(count) {
                continue;
            }
            let row = self.rank_order.row(b).unwrap_or_default();
            check_rank_row(b, row, params.nkeep(count), count)?;
        }
        Ok(())
    }

    /// Source rows, rank row, index row, and valid count of batch `b`.
    pub(crate) fn batch_parts(&self, b: usize) -> (&'a [T], &'a [i32], &'a [i32], usize) {
        (
            self.data.batch(b).unwrap_or_default(),
            self.rank_order.row(b).unwrap_or_default(),
            self.indices.row(b).unwrap_or_default(),
            self.valid_counts.get(b).copied().unwrap_or(0).max(0) as usize,
        )
    }
}

/// Output of the suppression stage.
#[derive(Clone, Debug, PartialEq)]
pub struct Suppressed<T> {
    /// Rank-ordered rows; suppressed rows carry `-1` in score (and class).
    pub boxes: BoxTensor<T>,
    /// Original anchor index per rank position, `-1` when not kept.
    pub box_indices: IndexTensor,
}

/// Suppression kernel.
pub trait SuppressionKernel {
    /// Runs reorder, suppression, cap, and index translation for every batch.
    fn suppress<T: Element>(
        input: SuppressInput<'_, T>,
        params: &SuppressParams,
    ) -> NmsResult<Suppressed<T>>;
}
