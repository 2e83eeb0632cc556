//! Intersection-over-union of axis-aligned boxes.

use crate::element::Element;

#[inline]
fn max<T: Element>(a: T, b: T) -> T {
    if b > a {
        b
    } else {
        a
    }
}

#[inline]
fn min<T: Element>(a: T, b: T) -> T {
    if b < a {
        b
    } else {
        a
    }
}

/// Computes the IoU of two `[x1, y1, x2, y2]` boxes.
///
/// Intersection extents are clamped at zero and a non-positive union yields
/// zero, so degenerate or inverted boxes never produce an error. Coordinates
/// are expected to satisfy `x1 <= x2` and `y1 <= y2`; this is not checked.
#[inline]
pub fn overlap<T: Element>(a: [T; 4], b: [T; 4]) -> T {
    let zero = T::ZERO;
    let w = max(zero, min(a[2], b[2]) - max(a[0], b[0]));
    let h = max(zero, min(a[3], b[3]) - max(a[1], b[1]));
    let inter = w * h;
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - inter;
    if union <= zero {
        zero
    } else {
        inter / union
    }
}

/// Reads the four coordinates starting at `coord_start` from a row.
#[inline]
pub(crate) fn box_at<T: Element>(row: &[T], coord_start: usize) -> [T; 4] {
    [
        row[coord_start],
        row[coord_start + 1],
        row[coord_start + 2],
        row[coord_start + 3],
    ]
}
