//! SIMD overlap evaluation using the `wide` crate.
//!
//! One anchor box is compared against eight candidate boxes per step with
//! `f32x8`. The arithmetic follows `overlap::overlap` operation for
//! operation, so lane results equal the scalar ones.

use crate::overlap::overlap;
use wide::f32x8;

const LANES: usize = 8;

/// Gathers one coordinate of eight boxes into a vector.
#[inline]
fn gather(boxes: &[[f32; 4]], field: usize) -> f32x8 {
    f32x8::from([
        boxes[0][field],
        boxes[1][field],
        boxes[2][field],
        boxes[3][field],
        boxes[4][field],
        boxes[5][field],
        boxes[6][field],
        boxes[7][field],
    ])
}

/// IoU of `anchor` against every box in `others`, written to `out`.
pub(crate) fn overlap_lanes_f32(anchor: [f32; 4], others: &[[f32; 4]], out: &mut [f32]) {
    let zero = f32x8::ZERO;
    let ax1 = f32x8::from([anchor[0]; LANES]);
    let ay1 = f32x8::from([anchor[1]; LANES]);
    let ax2 = f32x8::from([anchor[2]; LANES]);
    let ay2 = f32x8::from([anchor[3]; LANES]);
    let anchor_area = (ax2 - ax1) * (ay2 - ay1);

    let chunks = others.chunks_exact(LANES);
    let rest = chunks.remainder();
    let mut written = 0;
    for chunk in chunks {
        let bx1 = gather(chunk, 0);
        let by1 = gather(chunk, 1);
        let bx2 = gather(chunk, 2);
        let by2 = gather(chunk, 3);

        let w = zero.max(bx2.min(ax2) - bx1.max(ax1));
        let h = zero.max(by2.min(ay2) - by1.max(ay1));
        let inter = w * h;
        let union = (bx2 - bx1) * (by2 - by1) + anchor_area - inter;

        let inter = inter.to_array();
        let union = union.to_array();
        for (lane, dst) in out[written..written + LANES].iter_mut().enumerate() {
            *dst = if union[lane] <= 0.0 {
                0.0
            } else {
                inter[lane] / union[lane]
            };
        }
        written += LANES;
    }

    for (dst, other) in out[written..].iter_mut().zip(rest.iter()) {
        *dst = overlap(*other, anchor);
    }
}
