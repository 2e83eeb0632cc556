//! End-to-end NMS pipeline.
//!
//! [`NonMaxSuppression`] chains the stages: valid-count extraction, rank
//! ordering, suppression, and either output compaction of survivor indices
//! or the suppressed box tensor itself.

use crate::candidate::check_fields;
use crate::candidate::compact::{move_valid_rows_to_top, rearrange_indices_out};
use crate::candidate::rank::{rank_by_score, DescendingStable, RankSorter};
use crate::candidate::valid::{get_valid_counts, ValidCountParams, ValidCounts};
use crate::element::Element;
use crate::kernel::scalar::ScalarKernel;
use crate::kernel::{SuppressInput, SuppressParams, Suppressed, SuppressionKernel};
use crate::tensor::{BoxTensor, BoxTensorView, IndexTensor};
use crate::trace::{trace_event, trace_span};
use crate::util::{NmsError, NmsResult};

#[cfg(feature = "rayon")]
use crate::kernel::rayon::{get_valid_counts_par, rearrange_indices_out_par, RayonKernel};

/// Execution backend for the kernels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    /// Single-threaded reference kernels.
    #[default]
    Scalar,
    /// Rayon kernels; requires the `rayon` feature.
    Rayon,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Scalar => "scalar",
            Backend::Rayon => "rayon",
        }
    }

    /// Fails when the backend was not compiled in.
    pub fn ensure_available(self) -> NmsResult<()> {
        match self {
            Backend::Scalar => Ok(()),
            Backend::Rayon if cfg!(feature = "rayon") => Ok(()),
            Backend::Rayon => Err(NmsError::BackendUnavailable("rayon")),
        }
    }
}

/// Pipeline configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct NmsConfig {
    /// Exclusive lower bound on the score of a valid candidate.
    pub score_threshold: f32,
    /// Class id field; negative disables class filtering and matching.
    pub id_index: i32,
    /// Score field.
    pub score_index: usize,
    /// First of four coordinate fields `x1, y1, x2, y2`.
    pub coord_start: usize,
    /// Suppression threshold; `<= 0` passes candidates through.
    pub iou_threshold: f32,
    /// Suppress regardless of class.
    pub force_suppress: bool,
    /// Ranks considered for suppression; `<= 0` for no limit.
    pub top_k: i32,
    /// Survivors emitted per batch; `<= 0` for no limit.
    pub max_output_size: i32,
    /// Emit compacted survivor indices instead of boxes.
    pub return_indices: bool,
    /// For box output, move valid rows to the top of each batch.
    pub invalid_to_bottom: bool,
    pub backend: Backend,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.0,
            id_index: 0,
            score_index: 1,
            coord_start: 2,
            iou_threshold: 0.5,
            force_suppress: false,
            top_k: -1,
            max_output_size: -1,
            return_indices: true,
            invalid_to_bottom: false,
            backend: Backend::Scalar,
        }
    }
}

impl NmsConfig {
    /// Checks field offsets against `elem_length` and backend availability.
    pub fn validate(&self, elem_length: usize) -> NmsResult<()> {
        check_fields(
            elem_length,
            self.id_index,
            self.score_index,
            Some(self.coord_start),
        )?;
        self.backend.ensure_available()
    }

    pub fn valid_count_params(&self) -> ValidCountParams {
        ValidCountParams {
            score_threshold: self.score_threshold,
            id_index: self.id_index,
            score_index: self.score_index,
        }
    }

    pub fn suppress_params(&self) -> SuppressParams {
        SuppressParams {
            max_output_size: self.max_output_size,
            iou_threshold: self.iou_threshold,
            force_suppress: self.force_suppress,
            top_k: self.top_k,
            coord_start: self.coord_start,
            id_index: self.id_index,
            score_index: self.score_index,
        }
    }
}

/// Terminal output of the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum NmsOutput<T> {
    /// Survivor anchor indices compacted to the front, with counts.
    Indices {
        indices: IndexTensor,
        counts: Vec<i32>,
    },
    /// Suppressed, rank-ordered boxes.
    Boxes(BoxTensor<T>),
}

impl<T> NmsOutput<T> {
    pub fn indices(&self) -> Option<(&IndexTensor, &[i32])> {
        match self {
            NmsOutput::Indices { indices, counts } => Some((indices, counts)),
            NmsOutput::Boxes(_) => None,
        }
    }

    pub fn boxes(&self) -> Option<&BoxTensor<T>> {
        match self {
            NmsOutput::Boxes(boxes) => Some(boxes),
            NmsOutput::Indices { .. } => None,
        }
    }

    pub fn into_boxes(self) -> Option<BoxTensor<T>> {
        match self {
            NmsOutput::Boxes(boxes) => Some(boxes),
            NmsOutput::Indices { .. } => None,
        }
    }
}

/// Batched non-maximum suppression.
#[derive(Clone, Debug, Default)]
pub struct NonMaxSuppression<S = DescendingStable> {
    cfg: NmsConfig,
    sorter: S,
}

impl NonMaxSuppression {
    /// Creates a pipeline with the default config and stable ranking.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> NonMaxSuppression<S> {
    pub fn with_config(mut self, cfg: NmsConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Replaces the ranking capability.
    pub fn with_sorter<S2>(self, sorter: S2) -> NonMaxSuppression<S2> {
        NonMaxSuppression {
            cfg: self.cfg,
            sorter,
        }
    }

    pub fn config(&self) -> &NmsConfig {
        &self.cfg
    }

    /// Runs the full pipeline on raw anchors.
    pub fn run<T: Element>(&self, data: BoxTensorView<'_, T>) -> NmsResult<NmsOutput<T>>
    where
        S: RankSorter<T>,
    {
        let shape = data.shape();
        self.cfg.validate(shape.elem_length())?;
        let _span = trace_span!(
            "nms",
            batch_size = shape.batch_size(),
            num_anchors = shape.num_anchors(),
            backend = self.cfg.backend.name()
        )
        .entered();

        let valid = self.valid_counts(data)?;
        self.finish(valid.boxes.view(), &valid.counts, &valid.indices)
    }

    /// Runs ranking, suppression, and output on already compacted data.
    ///
    /// `indices` maps compacted positions to original anchors; pass
    /// `IndexTensor::arange` when the data was never compacted.
    pub fn run_with_counts<T: Element>(
        &self,
        data: BoxTensorView<'_, T>,
        valid_counts: &[i32],
        indices: &IndexTensor,
    ) -> NmsResult<NmsOutput<T>>
    where
        S: RankSorter<T>,
    {
        self.cfg.validate(data.shape().elem_length())?;
        let _span = trace_span!(
            "nms",
            batch_size = data.shape().batch_size(),
            num_anchors = data.shape().num_anchors(),
            backend = self.cfg.backend.name()
        )
        .entered();
        self.finish(data, valid_counts, indices)
    }

    /// Valid-count extraction on the configured backend.
    pub fn valid_counts<T: Element>(
        &self,
        data: BoxTensorView<'_, T>,
    ) -> NmsResult<ValidCounts<T>> {
        let params = self.cfg.valid_count_params();
        match self.cfg.backend {
            Backend::Scalar => get_valid_counts(data, params),
            #[cfg(feature = "rayon")]
            Backend::Rayon => get_valid_counts_par(data, params),
            #[cfg(not(feature = "rayon"))]
            Backend::Rayon => Err(NmsError::BackendUnavailable("rayon")),
        }
    }

    /// Suppression on the configured backend.
    pub fn suppress<T: Element>(&self, input: SuppressInput<'_, T>) -> NmsResult<Suppressed<T>> {
        let params = self.cfg.suppress_params();
        match self.cfg.backend {
            Backend::Scalar => <ScalarKernel as SuppressionKernel>::suppress(input, &params),
            #[cfg(feature = "rayon")]
            Backend::Rayon => <RayonKernel as SuppressionKernel>::suppress(input, &params),
            #[cfg(not(feature = "rayon"))]
            Backend::Rayon => Err(NmsError::BackendUnavailable("rayon")),
        }
    }

    fn rearrange(&self, survivors: &IndexTensor) -> NmsResult<(IndexTensor, Vec<i32>)> {
        match self.cfg.backend {
            Backend::Scalar => rearrange_indices_out(survivors),
            #[cfg(feature = "rayon")]
            Backend::Rayon => rearrange_indices_out_par(survivors),
            #[cfg(not(feature = "rayon"))]
            Backend::Rayon => Err(NmsError::BackendUnavailable("rayon")),
        }
    }

    fn finish<T: Element>(
        &self,
        data: BoxTensorView<'_, T>,
        valid_counts: &[i32],
        indices: &IndexTensor,
    ) -> NmsResult<NmsOutput<T>>
    where
        S: RankSorter<T>,
    {
        let rank_order = rank_by_score(data, valid_counts, self.cfg.score_index, &self.sorter)?;
        let suppressed = self.suppress(SuppressInput {
            data,
            rank_order: &rank_order,
            valid_counts,
            indices,
        })?;

        if self.cfg.return_indices {
            let (indices, counts) = self.rearrange(&suppressed.box_indices)?;
            trace_event!(
                "nms_done",
                survivors = counts.iter().map(|&c| c as i64).sum::<i64>()
            );
            return Ok(NmsOutput::Indices { indices, counts });
        }

        let Suppressed {
            mut boxes,
            box_indices,
        } = suppressed;
        if self.cfg.invalid_to_bottom {
            move_valid_rows_to_top(&mut boxes, &box_indices)?;
        }
        Ok(NmsOutput::Boxes(boxes))
    }
}
