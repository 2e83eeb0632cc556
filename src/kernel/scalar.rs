//! Scalar reference kernel and the per-batch stages shared with rayon.

use crate::element::Element;
use crate::kernel::{SuppressInput, SuppressParams, Suppressed, SuppressionKernel};
use crate::overlap::box_at;
use crate::tensor::{BoxTensor, IndexTensor, INVALID_INDEX};
use crate::trace::{trace_batch, trace_event, trace_span};
use crate::util::NmsResult;

/// Rows gathered before one batched overlap evaluation.
const LANES: usize = 8;

/// Single-threaded suppression kernel.
pub struct ScalarKernel;

/// Phase A: lays out one batch for suppression.
///
/// With suppression enabled, position `r < nkeep` receives the row at
/// `rank[r]` and ranks past `nkeep` stay sentinel. Otherwise the valid
/// prefix is copied through and each position maps to itself. Rows at or
/// past `valid_count` are always sentinel. Returns whether Phase B should
/// run.
pub(crate) fn reorder_batch<T: Element>(
    src: &[T],
    rank: &[i32],
    valid_count: usize,
    out: &mut [T],
    work: &mut [i32],
    elem_length: usize,
    params: &SuppressParams,
) -> bool {
    out.fill(T::SENTINEL);
    work.fill(INVALID_INDEX);

    if !params.suppression_enabled(valid_count as i32) {
        let end = valid_count * elem_length;
        out[..end].copy_from_slice(&src[..end]);
        for (slot, pos) in work[..valid_count].iter_mut().zip(0i32..) {
            *slot = pos;
        }
        return false;
    }

    let nkeep = params.nkeep(valid_count as i32);
    for (r, &pos) in rank[..nkeep].iter().enumerate() {
        let pos = pos as usize;
        out[r * elem_length..(r + 1) * elem_length]
            .copy_from_slice(&src[pos * elem_length..(pos + 1) * elem_length]);
        work[r] = pos as i32;
    }
    true
}

/// Suppresses every live row in `rows` that matches `anchor_row`'s class and
/// overlaps it by at least the threshold. Returns the number suppressed.
///
/// Rows are independent of each other here, so any partition of a sweep
/// into calls gives the same result.
pub(crate) fn sweep_rows<T: Element>(
    anchor_row: &[T],
    rows: &mut [T],
    work: &mut [i32],
    elem_length: usize,
    params: &SuppressParams,
) -> usize {
    let anchor = box_at(anchor_row, params.coord_start);
    let mut lanes = Lanes::<T>::new();
    let mut suppressed = 0usize;

    for j in 0..work.len() {
        let row = &rows[j * elem_length..(j + 1) * elem_length];
        if !params.is_live(row) || !params.classes_match(anchor_row, row) {
            continue;
        }
        lanes.push(j, box_at(row, params.coord_start));
        if lanes.filled == LANES {
            suppressed += lanes.flush(anchor, rows, work, elem_length, params);
        }
    }
    suppressed + lanes.flush(anchor, rows, work, elem_length, params)
}

/// Candidate rows waiting for one batched overlap evaluation.
struct Lanes<T> {
    rows: [usize; LANES],
    boxes: [[T; 4]; LANES],
    iou: [T; LANES],
    filled: usize,
}

impl<T: Element> Lanes<T> {
    fn new() -> Self {
        Self {
            rows: [0; LANES],
            boxes: [[T::ZERO; 4]; LANES],
            iou: [T::ZERO; LANES],
            filled: 0,
        }
    }

    #[inline]
    fn push(&mut self, row: usize, bbox: [T; 4]) {
        self.rows[self.filled] = row;
        self.boxes[self.filled] = bbox;
        self.filled += 1;
    }

    fn flush(
        &mut self,
        anchor: [T; 4],
        rows: &mut [T],
        work: &mut [i32],
        elem_length: usize,
        params: &SuppressParams,
    ) -> usize {
        let n = self.filled;
        self.filled = 0;
        if n == 0 {
            return 0;
        }
        let threshold = T::from_f32(params.iou_threshold);
        T::overlap_lanes(anchor, &self.boxes[..n], &mut self.iou[..n]);

        let mut suppressed = 0;
        for (&j, &iou) in self.rows[..n].iter().zip(self.iou[..n].iter()) {
            if iou >= threshold {
                params.mark_suppressed(&mut rows[j * elem_length..(j + 1) * elem_length]);
                work[j] = INVALID_INDEX;
                suppressed += 1;
            }
        }
        suppressed
    }
}

/// Phase B, one rank at a time.
pub(crate) fn suppress_batch<T: Element>(
    out: &mut [T],
    work: &mut [i32],
    valid_count: usize,
    elem_length: usize,
    params: &SuppressParams,
) -> usize {
    let mut total = 0;
    for k in 0..valid_count {
        let (head, tail) = out[..valid_count * elem_length].split_at_mut((k + 1) * elem_length);
        let anchor_row = &head[k * elem_length..];
        if !params.is_live(anchor_row) {
            continue;
        }
        total += sweep_rows(
            anchor_row,
            tail,
            &mut work[k + 1..valid_count],
            elem_length,
            params,
        );
    }
    total
}

/// Applies the max-output-size cap and maps positions to anchor indices.
///
/// The cap walks rank order and keeps the first `max_output_size` positions
/// that still hold a working index; later ones become sentinel. Suppressed
/// and top-k dropped positions already hold `-1`.
pub(crate) fn cap_and_translate<T: Element>(
    out: &mut [T],
    work: &mut [i32],
    indices: &[i32],
    valid_count: usize,
    elem_length: usize,
    params: &SuppressParams,
) {
    if params.max_output_size > 0 {
        let limit = params.max_output_size as usize;
        let mut kept = 0usize;
        for (row, slot) in out[..valid_count * elem_length]
            .chunks_exact_mut(elem_length)
            .zip(work.iter_mut())
        {
            if *slot < 0 {
                continue;
            }
            if kept == limit {
                row.fill(T::SENTINEL);
                *slot = INVALID_INDEX;
            } else {
                kept += 1;
            }
        }
    }

    for slot in work.iter_mut().filter(|slot| **slot >= 0) {
        *slot = indices[*slot as usize];
    }
}

impl SuppressionKernel for ScalarKernel {
    fn suppress<T: Element>(
        input: SuppressInput<'_, T>,
        params: &SuppressParams,
    ) -> NmsResult<Suppressed<T>> {
        input.validate(params)?;
        let shape = input.data.shape();
        let _span = trace_span!(
            "suppress",
            batch_size = shape.batch_size(),
            num_anchors = shape.num_anchors(),
            parallel = false
        )
        .entered();

        let elem_length = shape.elem_length();
        let mut boxes = BoxTensor::sentinel(shape);
        let mut box_indices = IndexTensor::invalid(shape.batch_size(), shape.num_anchors())?;

        let mut total = 0usize;
        for (b, (out, work)) in boxes
            .data_mut()
            .chunks_exact_mut(shape.batch_stride())
            .zip(box_indices.data_mut().chunks_exact_mut(shape.num_anchors()))
            .enumerate()
        {
            let (src, rank, indices, valid_count) = input.batch_parts(b);
            let mut suppressed = 0;
            if reorder_batch(src, rank, valid_count, out, work, elem_length, params) {
                suppressed = suppress_batch(out, work, valid_count, elem_length, params);
            }
            cap_and_translate(out, work, indices, valid_count, elem_length, params);
            trace_batch!("batch_suppressed", batch = b, suppressed = suppressed);
            total += suppressed;
        }

        trace_event!("suppressed", total = total);
        Ok(Suppressed { boxes, box_indices })
    }
}
