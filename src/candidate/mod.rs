//! Candidate filtering, ranking, and compaction stages.
//!
//! These stages surround the suppression kernel: `valid` compacts rows that
//! pass the score/class filter, `rank` orders them by descending score, and
//! `compact` moves surviving entries to the front of each batch.

pub mod compact;
pub mod rank;
pub mod valid;

use crate::util::{NmsError, NmsResult};

/// Smallest row that holds a class id, a score, and four coordinates.
pub const MIN_ELEM_LENGTH: usize = 6;

/// Checks that the configured field offsets address cells inside a row.
///
/// `coord_start` is optional because the filtering stage never reads
/// coordinates.
pub(crate) fn check_fields(
    elem_length: usize,
    id_index: i32,
    score_index: usize,
    coord_start: Option<usize>,
) -> NmsResult<()> {
    if elem_length < MIN_ELEM_LENGTH {
        return Err(NmsError::ElemLengthTooShort { elem_length });
    }
    if id_index >= 0 && id_index as usize >= elem_length {
        return Err(NmsError::FieldOutOfRange {
            field: "id_index",
            index: i64::from(id_index),
            elem_length,
        });
    }
    if score_index >= elem_length {
        return Err(NmsError::FieldOutOfRange {
            field: "score_index",
            index: score_index as i64,
            elem_length,
        });
    }
    if let Some(start) = coord_start {
        if start.checked_add(4).map_or(true, |end| end > elem_length) {
            return Err(NmsError::FieldOutOfRange {
                field: "coord_start",
                index: start as i64,
                elem_length,
            });
        }
    }
    Ok(())
}

/// Checks that each valid count lies in `[0, num_anchors]`.
pub(crate) fn check_valid_counts(
    counts: &[i32],
    batch_size: usize,
    num_anchors: usize,
) -> NmsResult<()> {
    if counts.len() != batch_size {
        return Err(NmsError::ShapeMismatch {
            context: "valid_counts",
            expected: batch_size,
            got: counts.len(),
        });
    }
    for (batch, &count) in counts.iter().enumerate() {
        if count < 0 || count as usize > num_anchors {
            return Err(NmsError::ValidCountOutOfRange {
                batch,
                count,
                num_anchors,
            });
        }
    }
    Ok(())
}
