//! Output compaction: move surviving entries to the front of each batch.

use crate::element::Element;
use crate::tensor::{BoxTensor, IndexTensor, INVALID_INDEX};
use crate::trace::{trace_event, trace_span};
use crate::util::NmsResult;

/// Stable partition of one index row; returns the number of survivors.
pub(crate) fn rearrange_row(src: &[i32], out: &mut [i32]) -> i32 {
    let mut count = 0usize;
    for &value in src.iter().filter(|&&v| v >= 0) {
        out[count] = value;
        count += 1;
    }
    out[count..].fill(INVALID_INDEX);
    count as i32
}

/// Moves every non-negative index to the front of its batch row.
///
/// Relative order among survivors is preserved; the remaining slots are
/// `-1`. Returns the compacted tensor and the per-batch survivor counts.
pub fn rearrange_indices_out(survivors: &IndexTensor) -> NmsResult<(IndexTensor, Vec<i32>)> {
    let batch_size = survivors.batch_size();
    let num_anchors = survivors.num_anchors();
    let _span = trace_span!("rearrange_indices_out", batch_size = batch_size).entered();

    let mut out = IndexTensor::invalid(batch_size, num_anchors)?;
    let counts: Vec<i32> = survivors
        .as_slice()
        .chunks_exact(num_anchors)
        .zip(out.data_mut().chunks_exact_mut(num_anchors))
        .map(|(src, dst)| rearrange_row(src, dst))
        .collect();

    trace_event!(
        "survivors",
        total = counts.iter().map(|&c| c as i64).sum::<i64>()
    );
    Ok((out, counts))
}

/// Stable partition of one batch of box rows by survivor index.
///
/// A row is kept when its entry in `survivors` is non-negative.
pub(crate) fn move_valid_rows_batch<T: Element>(
    batch: &mut [T],
    survivors: &[i32],
    elem_length: usize,
) -> i32 {
    let mut count = 0usize;
    for (row, &idx) in survivors.iter().enumerate() {
        if idx < 0 {
            continue;
        }
        if row != count {
            batch.copy_within(
                row * elem_length..(row + 1) * elem_length,
                count * elem_length,
            );
        }
        count += 1;
    }
    batch[count * elem_length..].fill(T::SENTINEL);
    count as i32
}

/// Moves surviving box rows to the top of every batch in place.
///
/// `survivors` is the per-position index map from suppression; rows whose
/// entry is `-1` were suppressed, dropped, or never valid. Survivors keep
/// their relative order and the vacated tail is sentinel-filled. Returns
/// the number of surviving rows per batch.
pub fn move_valid_rows_to_top<T: Element>(
    boxes: &mut BoxTensor<T>,
    survivors: &IndexTensor,
) -> NmsResult<Vec<i32>> {
    let shape = boxes.shape();
    survivors.ensure_matches(shape, "survivors")?;
    let elem_length = shape.elem_length();
    Ok(boxes
        .data_mut()
        .chunks_exact_mut(shape.batch_stride())
        .zip(survivors.as_slice().chunks_exact(shape.num_anchors()))
        .map(|(batch, row)| move_valid_rows_batch(batch, row, elem_length))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{move_valid_rows_to_top, rearrange_indices_out};
    use crate::tensor::{BoxTensor, IndexTensor};

    #[test]
    fn survivors_move_to_front_in_order() {
        let input = IndexTensor::new(vec![-1, 4, -1, 2, 0, -1], 1, 6).unwrap();
        let (out, counts) = rearrange_indices_out(&input).unwrap();
        assert_eq!(out.as_slice(), &[4, 2, 0, -1, -1, -1]);
        assert_eq!(counts, vec![3]);
    }

    #[test]
    fn empty_batch_reports_zero() {
        let input = IndexTensor::new(vec![-1, -1, 1, 0], 2, 2).unwrap();
        let (out, counts) = rearrange_indices_out(&input).unwrap();
        assert_eq!(out.as_slice(), &[-1, -1, 1, 0]);
        assert_eq!(counts, vec![0, 2]);
    }

    #[test]
    fn valid_rows_move_to_top() {
        #[rustfmt::skip]
        let data = vec![
            -1.0f32, -1.0, -1.0, -1.0, -1.0, -1.0,
             2.0,     0.6,  0.0,  0.0,  1.0,  1.0,
            -1.0,    -1.0, -1.0, -1.0, -1.0, -1.0,
             1.0,     0.3,  2.0,  2.0,  3.0,  3.0,
        ];
        let mut boxes = BoxTensor::new(data.clone(), 1, 4, 6).unwrap();
        let survivors = IndexTensor::new(vec![-1, 5, -1, 2], 1, 4).unwrap();
        let counts = move_valid_rows_to_top(&mut boxes, &survivors).unwrap();
        assert_eq!(counts, vec![2]);
        assert_eq!(boxes.row(0, 0).unwrap(), &data[6..12]);
        assert_eq!(boxes.row(0, 1).unwrap(), &data[18..24]);
        assert!(boxes.row(0, 2).unwrap().iter().all(|&v| v == -1.0));
        assert!(boxes.row(0, 3).unwrap().iter().all(|&v| v == -1.0));
    }
}
