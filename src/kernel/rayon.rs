//! Rayon-parallel stages (feature-gated).
//!
//! Compaction stages run one task per batch. The suppression kernel also
//! runs batches in parallel and, inside a batch, splits each rank's sweep
//! over lower-ranked rows into chunks. The sweep for rank `k` is joined
//! before rank `k + 1` starts, so every chunk sees all suppressions made by
//! higher ranks.

use crate::candidate::check_fields;
use crate::candidate::compact::rearrange_row;
use crate::candidate::valid::{compact_batch, ValidCountParams, ValidCounts};
use crate::element::Element;
use crate::kernel::atomic::{self, AtomicAdd};
use crate::kernel::scalar::{cap_and_translate, reorder_batch, sweep_rows};
use crate::kernel::{SuppressInput, SuppressParams, Suppressed, SuppressionKernel};
use crate::tensor::{BoxTensor, BoxTensorView, IndexTensor};
use crate::trace::{trace_event, trace_span};
use crate::util::NmsResult;
use rayon::prelude::*;

/// Rows handed to one task of a rank sweep.
const SWEEP_CHUNK_ROWS: usize = 256;

/// Batch- and candidate-parallel suppression kernel.
pub struct RayonKernel;

/// Phase B with a parallel sweep per rank.
fn suppress_batch_par<T: Element>(
    out: &mut [T],
    work: &mut [i32],
    valid_count: usize,
    elem_length: usize,
    params: &SuppressParams,
    counter: &<i32 as AtomicAdd>::Cell,
) {
    for k in 0..valid_count {
        let (head, tail) = out[..valid_count * elem_length].split_at_mut((k + 1) * elem_length);
        let anchor_row = &head[k * elem_length..];
        if !params.is_live(anchor_row) {
            continue;
        }
        // for_each returns after every chunk finished: rank k is resolved here.
        tail.par_chunks_mut(SWEEP_CHUNK_ROWS * elem_length)
            .zip(work[k + 1..valid_count].par_chunks_mut(SWEEP_CHUNK_ROWS))
            .for_each(|(rows, slots)| {
                let n = sweep_rows(anchor_row, rows, slots, elem_length, params);
                if n > 0 {
                    <i32 as AtomicAdd>::atomic_add(counter, n as i32);
                }
            });
    }
}

impl SuppressionKernel for RayonKernel {
    fn suppress<T: Element>(
        input: SuppressInput<'_, T>,
        params: &SuppressParams,
    ) -> NmsResult<Suppressed<T>> {
        input.validate(params)?;
        atomic::ensure_supported(<i32 as AtomicAdd>::DTYPE)?;
        let shape = input.data.shape();
        let _span = trace_span!(
            "suppress",
            batch_size = shape.batch_size(),
            num_anchors = shape.num_anchors(),
            parallel = true
        )
        .entered();

        let elem_length = shape.elem_length();
        let mut boxes = BoxTensor::sentinel(shape);
        let mut box_indices = IndexTensor::invalid(shape.batch_size(), shape.num_anchors())?;
        let suppressed = <i32 as AtomicAdd>::new_cell(0);

        boxes
            .data_mut()
            .par_chunks_mut(shape.batch_stride())
            .zip(box_indices.data_mut().par_chunks_mut(shape.num_anchors()))
            .enumerate()
            .for_each(|(b, (out, work))| {
                let (src, rank, indices, valid_count) = input.batch_parts(b);
                if reorder_batch(src, rank, valid_count, out, work, elem_length, params) {
                    suppress_batch_par(out, work, valid_count, elem_length, params, &suppressed);
                }
                cap_and_translate(out, work, indices, valid_count, elem_length, params);
            });

        trace_event!("suppressed", total = <i32 as AtomicAdd>::load(&suppressed));
        Ok(Suppressed { boxes, box_indices })
    }
}

/// Batch-parallel valid-count extraction.
///
/// Produces the same output as `candidate::valid::get_valid_counts`.
pub fn get_valid_counts_par<T: Element>(
    data: BoxTensorView<'_, T>,
    params: ValidCountParams,
) -> NmsResult<ValidCounts<T>> {
    let shape = data.shape();
    check_fields(shape.elem_length(), params.id_index, params.score_index, None)?;
    let _span = trace_span!(
        "get_valid_counts",
        batch_size = shape.batch_size(),
        num_anchors = shape.num_anchors(),
        parallel = true
    )
    .entered();

    let mut boxes = BoxTensor::sentinel(shape);
    let mut indices = IndexTensor::invalid(shape.batch_size(), shape.num_anchors())?;
    let elem_length = shape.elem_length();
    let total = <i32 as AtomicAdd>::new_cell(0);

    let counts: Vec<i32> = data
        .as_slice()
        .par_chunks(shape.batch_stride())
        .zip(boxes.data_mut().par_chunks_mut(shape.batch_stride()))
        .zip(indices.data_mut().par_chunks_mut(shape.num_anchors()))
        .map(|((src, out), out_indices)| {
            let count = compact_batch(src, out, out_indices, elem_length, &params);
            <i32 as AtomicAdd>::atomic_add(&total, count);
            count
        })
        .collect();

    trace_event!("valid_counts", total = <i32 as AtomicAdd>::load(&total));
    Ok(ValidCounts {
        counts,
        boxes,
        indices,
    })
}

/// Batch-parallel output compaction.
///
/// Produces the same output as `candidate::compact::rearrange_indices_out`.
pub fn rearrange_indices_out_par(survivors: &IndexTensor) -> NmsResult<(IndexTensor, Vec<i32>)> {
    let num_anchors = survivors.num_anchors();
    let _span = trace_span!(
        "rearrange_indices_out",
        batch_size = survivors.batch_size(),
        parallel = true
    )
    .entered();

    let mut out = IndexTensor::invalid(survivors.batch_size(), num_anchors)?;
    let counts: Vec<i32> = survivors
        .as_slice()
        .par_chunks(num_anchors)
        .zip(out.data_mut().par_chunks_mut(num_anchors))
        .map(|(src, dst)| rearrange_row(src, dst))
        .collect();
    Ok((out, counts))
}
