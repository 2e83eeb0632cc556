//! Low-level building blocks for custom NMS pipelines.
//!
//! These expose the individual stages behind [`crate::NonMaxSuppression`]
//! for callers that wire compaction, ranking, and suppression themselves,
//! for example to plug in an external sort.

pub use crate::candidate::compact::{move_valid_rows_to_top, rearrange_indices_out};
pub use crate::candidate::rank::{rank_by_score, DescendingStable, RankSorter};
pub use crate::candidate::valid::{get_valid_counts, ValidCountParams, ValidCounts};
pub use crate::candidate::MIN_ELEM_LENGTH;
pub use crate::kernel::atomic::{ensure_supported as ensure_atomic_supported, AtomicAdd};
pub use crate::kernel::scalar::ScalarKernel;
pub use crate::kernel::{SuppressInput, SuppressParams, Suppressed, SuppressionKernel};

#[cfg(feature = "rayon")]
pub use crate::kernel::rayon::{get_valid_counts_par, rearrange_indices_out_par, RayonKernel};
