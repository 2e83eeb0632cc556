//! Rank ordering of compacted candidates.
//!
//! The suppression kernel only needs a permutation of `[0, valid_count)` in
//! descending score order. How that permutation is produced is pluggable
//! through [`RankSorter`]; [`DescendingStable`] is the default.

use crate::element::Element;
use crate::tensor::{BoxTensorView, IndexTensor};
use crate::util::{NmsError, NmsResult};

/// Produces a descending-score permutation for one batch.
pub trait RankSorter<T: Element>: Sync {
    /// Fills `order` with positions into `scores`, highest score first.
    ///
    /// `order.len() == scores.len()`. Ties must break the same way every
    /// time for the same input.
    fn rank(&self, scores: &[T], order: &mut [i32]);
}

/// Stable descending sort: equal scores keep their compacted order.
#[derive(Clone, Copy, Debug, Default)]
pub struct DescendingStable;

impl<T: Element> RankSorter<T> for DescendingStable {
    fn rank(&self, scores: &[T], order: &mut [i32]) {
        for (slot, pos) in order.iter_mut().zip(0i32..) {
            *slot = pos;
        }
        order.sort_by(|&a, &b| scores[b as usize].total_cmp(&scores[a as usize]));
    }
}

/// Ranks the compacted prefix of every batch.
///
/// Entries at or past a batch's valid count are `-1`.
pub fn rank_by_score<T: Element, S: RankSorter<T> + ?Sized>(
    boxes: BoxTensorView<'_, T>,
    valid_counts: &[i32],
    score_index: usize,
    sorter: &S,
) -> NmsResult<IndexTensor> {
    let shape = boxes.shape();
    crate::candidate::check_valid_counts(valid_counts, shape.batch_size(), shape.num_anchors())?;
    if score_index >= shape.elem_length() {
        return Err(NmsError::FieldOutOfRange {
            field: "score_index",
            index: score_index as i64,
            elem_length: shape.elem_length(),
        });
    }

    let mut order = IndexTensor::invalid(shape.batch_size(), shape.num_anchors())?;
    let mut scores = Vec::with_capacity(shape.num_anchors());
    for (b, &count) in valid_counts.iter().enumerate() {
        let count = count as usize;
        let batch = boxes.batch(b).unwrap_or_default();
        scores.clear();
        scores.extend(
            batch
                .chunks_exact(shape.elem_length())
                .take(count)
                .map(|row| row[score_index]),
        );
        if let Some(row) = order.row_mut(b) {
            sorter.rank(&scores, &mut row[..count]);
        }
    }
    Ok(order)
}

/// Checks that the first `nkeep` ranks of a batch are distinct positions
/// in `[0, valid_count)`.
pub(crate) fn check_rank_row(
    batch: usize,
    order: &[i32],
    nkeep: usize,
    valid_count: i32,
) -> NmsResult<()> {
    let mut seen = vec![false; valid_count.max(0) as usize];
    for (rank, &value) in order.iter().take(nkeep).enumerate() {
        let fresh = usize::try_from(value)
            .ok()
            .and_then(|pos| seen.get_mut(pos))
            .is_some_and(|slot| !std::mem::replace(slot, true));
        if !fresh {
            return Err(NmsError::InvalidRankOrder {
                batch,
                rank,
                value,
                valid_count,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_rank_row, rank_by_score, DescendingStable, RankSorter};
    use crate::tensor::BoxTensorView;
    use crate::util::NmsError;

    #[test]
    fn ties_keep_compacted_order() {
        let scores = [0.5f32, 0.9, 0.5, 0.1];
        let mut order = [0i32; 4];
        DescendingStable.rank(&scores, &mut order);
        assert_eq!(order, [1, 0, 2, 3]);
    }

    #[test]
    fn ranks_only_the_valid_prefix() {
        #[rustfmt::skip]
        let data = [
            0.0f32, 0.2, 0.0, 0.0, 1.0, 1.0,
            0.0,    0.7, 0.0, 0.0, 1.0, 1.0,
            -1.0,  -1.0, -1.0, -1.0, -1.0, -1.0,
        ];
        let view = BoxTensorView::from_slice(&data, 1, 3, 6).unwrap();
        let order = rank_by_score(view, &[2], 1, &DescendingStable).unwrap();
        assert_eq!(order.as_slice(), &[1, 0, -1]);
    }

    #[test]
    fn out_of_range_rank_is_reported() {
        assert!(check_rank_row(0, &[0, 3], 2, 2).is_err());
        // Entries past nkeep are not inspected.
        assert!(check_rank_row(0, &[1, 7], 1, 2).is_ok());
    }

    #[test]
    fn repeated_rank_is_reported() {
        assert_eq!(
            check_rank_row(3, &[1, 0, 1], 3, 3),
            Err(NmsError::InvalidRankOrder {
                batch: 3,
                rank: 2,
                value: 1,
                valid_count: 3,
            })
        );
        assert!(check_rank_row(0, &[2, 0, 1], 3, 3).is_ok());
    }
}
