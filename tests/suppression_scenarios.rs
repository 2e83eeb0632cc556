use batchnms::lowlevel::{
    get_valid_counts, rank_by_score, DescendingStable, ScalarKernel, SuppressInput,
    SuppressParams, SuppressionKernel, ValidCountParams,
};
use batchnms::{overlap, BoxTensorView, IndexTensor, NmsConfig, NmsOutput, NonMaxSuppression};

/// Five anchors: one below threshold, a same-class pair and a cross-class
/// pair, each pair overlapping with IoU 0.9.
#[rustfmt::skip]
const FIVE_ANCHORS: [f32; 30] = [
    // class, score, x1, y1, x2, y2
    0.0, 0.80,  0.0,  0.0, 10.0, 10.0,
    0.0, 0.05, 50.0, 50.0, 60.0, 60.0,
    0.0, 0.90,  0.0,  0.0, 10.0,  9.0,
    1.0, 0.70, 20.0, 20.0, 30.0, 30.0,
    2.0, 0.60, 20.0, 20.0, 30.0, 29.0,
];

fn five_anchor_config() -> NmsConfig {
    NmsConfig {
        score_threshold: 0.1,
        iou_threshold: 0.5,
        ..NmsConfig::default()
    }
}

fn unpack_indices<T>(out: NmsOutput<T>) -> (Vec<i32>, Vec<i32>) {
    match out {
        NmsOutput::Indices { indices, counts } => (indices.into_vec(), counts),
        NmsOutput::Boxes(_) => panic!("expected index output"),
    }
}

#[test]
fn fixture_pairs_overlap_by_hand_computed_iou() {
    // Intersection 10x9 = 90, union 100 + 90 - 90 = 100.
    let same_class = overlap([0.0f32, 0.0, 10.0, 10.0], [0.0, 0.0, 10.0, 9.0]);
    let cross_class = overlap([20.0f32, 20.0, 30.0, 30.0], [20.0, 20.0, 30.0, 29.0]);
    assert!((same_class - 0.9).abs() < 1e-6);
    assert!((cross_class - 0.9).abs() < 1e-6);
}

#[test]
fn five_anchor_scenario_keeps_three() {
    let view = BoxTensorView::from_slice(&FIVE_ANCHORS, 1, 5, 6).unwrap();
    let cfg = five_anchor_config();

    let valid = get_valid_counts(view, cfg.valid_count_params()).unwrap();
    assert_eq!(valid.counts, vec![4]);
    assert_eq!(valid.indices.as_slice(), &[0, 2, 3, 4, -1]);

    let nms = NonMaxSuppression::new().with_config(cfg);
    let (indices, counts) = unpack_indices(nms.run(view).unwrap());
    // Anchor 2 (0.9) suppresses anchor 0 (0.8); anchors 3 and 4 differ in class.
    assert_eq!(indices, vec![2, 3, 4, -1, -1]);
    assert_eq!(counts, vec![3]);
}

#[test]
fn five_anchor_scenario_with_force_suppress() {
    let view = BoxTensorView::from_slice(&FIVE_ANCHORS, 1, 5, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        force_suppress: true,
        ..five_anchor_config()
    });
    let (indices, counts) = unpack_indices(nms.run(view).unwrap());
    assert_eq!(indices, vec![2, 3, -1, -1, -1]);
    assert_eq!(counts, vec![2]);
}

#[test]
fn five_anchor_box_output_is_rank_ordered() {
    let view = BoxTensorView::from_slice(&FIVE_ANCHORS, 1, 5, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        return_indices: false,
        ..five_anchor_config()
    });
    let boxes = nms.run(view).unwrap().into_boxes().unwrap();

    assert_eq!(boxes.row(0, 0).unwrap(), &FIVE_ANCHORS[12..18]);
    assert_eq!(
        boxes.row(0, 1).unwrap(),
        &[-1.0, -1.0, 0.0, 0.0, 10.0, 10.0]
    );
    assert_eq!(boxes.row(0, 2).unwrap(), &FIVE_ANCHORS[18..24]);
    assert_eq!(boxes.row(0, 3).unwrap(), &FIVE_ANCHORS[24..30]);
    assert!(boxes.row(0, 4).unwrap().iter().all(|&v| v == -1.0));
}

#[test]
fn invalid_to_bottom_moves_suppressed_rows_down() {
    let view = BoxTensorView::from_slice(&FIVE_ANCHORS, 1, 5, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        return_indices: false,
        invalid_to_bottom: true,
        ..five_anchor_config()
    });
    let boxes = nms.run(view).unwrap().into_boxes().unwrap();

    assert_eq!(boxes.row(0, 0).unwrap(), &FIVE_ANCHORS[12..18]);
    assert_eq!(boxes.row(0, 1).unwrap(), &FIVE_ANCHORS[18..24]);
    assert_eq!(boxes.row(0, 2).unwrap(), &FIVE_ANCHORS[24..30]);
    for anchor in 3..5 {
        assert!(boxes.row(0, anchor).unwrap().iter().all(|&v| v == -1.0));
    }
}

/// Four disjoint same-class boxes, input order does not follow score.
#[rustfmt::skip]
const FOUR_DISJOINT: [f32; 24] = [
    0.0, 0.7,  0.0,  0.0, 10.0, 10.0,
    0.0, 0.9, 20.0, 20.0, 30.0, 30.0,
    0.0, 0.6, 40.0, 40.0, 50.0, 50.0,
    0.0, 0.8, 60.0, 60.0, 70.0, 70.0,
];

#[test]
fn top_k_drops_ranks_before_suppression() {
    let view = BoxTensorView::from_slice(&FOUR_DISJOINT, 1, 4, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        top_k: 2,
        ..NmsConfig::default()
    });
    let (indices, counts) = unpack_indices(nms.run(view).unwrap());
    assert_eq!(indices, vec![1, 3, -1, -1]);
    assert_eq!(counts, vec![2]);
}

#[test]
fn top_k_ranks_are_sentinel_in_box_output() {
    let view = BoxTensorView::from_slice(&FOUR_DISJOINT, 1, 4, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        top_k: 2,
        return_indices: false,
        ..NmsConfig::default()
    });
    let boxes = nms.run(view).unwrap().into_boxes().unwrap();
    assert_eq!(boxes.row(0, 0).unwrap(), &FOUR_DISJOINT[6..12]);
    assert_eq!(boxes.row(0, 1).unwrap(), &FOUR_DISJOINT[18..24]);
    assert!(boxes.row(0, 2).unwrap().iter().all(|&v| v == -1.0));
    assert!(boxes.row(0, 3).unwrap().iter().all(|&v| v == -1.0));
}

#[test]
fn max_output_size_caps_survivors_in_rank_order() {
    let view = BoxTensorView::from_slice(&FOUR_DISJOINT, 1, 4, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        max_output_size: 3,
        ..NmsConfig::default()
    });
    let (indices, counts) = unpack_indices(nms.run(view).unwrap());
    assert_eq!(indices, vec![1, 3, 0, -1]);
    assert_eq!(counts, vec![3]);
}

#[test]
fn cap_skips_suppressed_rows_when_counting() {
    // Rank 1 is suppressed by rank 0, so the cap of two keeps ranks 0 and 2.
    #[rustfmt::skip]
    let data = [
        0.0f32, 0.9, 0.0, 0.0, 10.0, 10.0,
        0.0,    0.8, 0.0, 0.0, 10.0, 10.0,
        0.0,    0.7, 20.0, 20.0, 30.0, 30.0,
        0.0,    0.6, 40.0, 40.0, 50.0, 50.0,
    ];
    let view = BoxTensorView::from_slice(&data, 1, 4, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        max_output_size: 2,
        ..NmsConfig::default()
    });
    let (indices, counts) = unpack_indices(nms.run(view).unwrap());
    assert_eq!(indices, vec![0, 2, -1, -1]);
    assert_eq!(counts, vec![2]);
}

#[test]
fn disabled_threshold_is_identity_on_valid_set() {
    let view = BoxTensorView::from_slice(&FIVE_ANCHORS, 1, 5, 6).unwrap();
    for iou_threshold in [0.0f32, -0.5] {
        let nms = NonMaxSuppression::new().with_config(NmsConfig {
            iou_threshold,
            ..five_anchor_config()
        });
        let (indices, counts) = unpack_indices(nms.run(view).unwrap());
        assert_eq!(indices, vec![0, 2, 3, 4, -1]);
        assert_eq!(counts, vec![4]);
    }
}

#[test]
fn disabled_threshold_passes_boxes_in_compacted_order() {
    let view = BoxTensorView::from_slice(&FIVE_ANCHORS, 1, 5, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        iou_threshold: 0.0,
        return_indices: false,
        ..five_anchor_config()
    });
    let boxes = nms.run(view).unwrap().into_boxes().unwrap();
    assert_eq!(boxes.row(0, 0).unwrap(), &FIVE_ANCHORS[0..6]);
    assert_eq!(boxes.row(0, 1).unwrap(), &FIVE_ANCHORS[12..18]);
    assert_eq!(boxes.row(0, 2).unwrap(), &FIVE_ANCHORS[18..24]);
    assert_eq!(boxes.row(0, 3).unwrap(), &FIVE_ANCHORS[24..30]);
}

#[test]
fn class_matching_disabled_suppresses_across_classes() {
    let view = BoxTensorView::from_slice(&FIVE_ANCHORS, 1, 5, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        id_index: -1,
        ..five_anchor_config()
    });
    let (indices, counts) = unpack_indices(nms.run(view).unwrap());
    assert_eq!(indices, vec![2, 3, -1, -1, -1]);
    assert_eq!(counts, vec![2]);
}

#[test]
fn batches_are_independent() {
    let mut data = FIVE_ANCHORS.to_vec();
    data.extend_from_slice(&[-1.0; 30]);
    let view = BoxTensorView::from_slice(&data, 2, 5, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(five_anchor_config());
    let (indices, counts) = unpack_indices(nms.run(view).unwrap());
    assert_eq!(indices, vec![2, 3, 4, -1, -1, -1, -1, -1, -1, -1]);
    assert_eq!(counts, vec![3, 0]);
}

#[test]
fn run_with_counts_accepts_uncompacted_data() {
    // Same rows as the five-anchor fixture minus the low-score anchor.
    let mut data = FIVE_ANCHORS[..6].to_vec();
    data.extend_from_slice(&FIVE_ANCHORS[12..]);
    let view = BoxTensorView::from_slice(&data, 1, 4, 6).unwrap();
    let indices = IndexTensor::arange(1, 4).unwrap();
    let nms = NonMaxSuppression::new().with_config(five_anchor_config());
    let (out, counts) = unpack_indices(nms.run_with_counts(view, &[4], &indices).unwrap());
    assert_eq!(out, vec![1, 2, 3, -1]);
    assert_eq!(counts, vec![3]);
}

#[test]
fn stages_compose_by_hand() {
    let view = BoxTensorView::from_slice(&FIVE_ANCHORS, 1, 5, 6).unwrap();
    let valid = get_valid_counts(
        view,
        ValidCountParams {
            score_threshold: 0.1,
            id_index: 0,
            score_index: 1,
        },
    )
    .unwrap();
    let rank = rank_by_score(valid.boxes.view(), &valid.counts, 1, &DescendingStable).unwrap();
    assert_eq!(rank.as_slice(), &[1, 0, 2, 3, -1]);

    let suppressed = <ScalarKernel as SuppressionKernel>::suppress(
        SuppressInput {
            data: valid.boxes.view(),
            rank_order: &rank,
            valid_counts: &valid.counts,
            indices: &valid.indices,
        },
        &SuppressParams::default(),
    )
    .unwrap();
    assert_eq!(suppressed.box_indices.as_slice(), &[2, -1, 3, 4, -1]);
}

/// Disjoint boxes in distinct classes; two valid rows carry negative scores.
#[rustfmt::skip]
const NEGATIVE_SCORES: [f32; 18] = [
    0.0,  0.9,  0.0,  0.0, 10.0, 10.0,
    1.0, -0.2, 20.0, 20.0, 30.0, 30.0,
    2.0, -0.3, 40.0, 40.0, 50.0, 50.0,
];

#[test]
fn cap_counts_negative_score_candidates() {
    let view = BoxTensorView::from_slice(&NEGATIVE_SCORES, 1, 3, 6).unwrap();
    for iou_threshold in [0.5, 0.0] {
        let nms = NonMaxSuppression::new().with_config(NmsConfig {
            score_threshold: -0.5,
            iou_threshold,
            max_output_size: 1,
            ..NmsConfig::default()
        });
        let (indices, counts) = unpack_indices(nms.run(view).unwrap());
        assert_eq!(counts, vec![1], "iou_threshold {iou_threshold}");
        assert_eq!(indices, vec![0, -1, -1]);
    }
}

#[test]
fn negative_score_survivors_stay_in_box_output() {
    let view = BoxTensorView::from_slice(&NEGATIVE_SCORES, 1, 3, 6).unwrap();
    let nms = NonMaxSuppression::new().with_config(NmsConfig {
        score_threshold: -0.5,
        return_indices: false,
        invalid_to_bottom: true,
        ..NmsConfig::default()
    });
    let boxes = nms.run(view).unwrap().into_boxes().unwrap();
    assert_eq!(boxes.row(0, 0).unwrap(), &NEGATIVE_SCORES[0..6]);
    assert_eq!(boxes.row(0, 1).unwrap(), &NEGATIVE_SCORES[6..12]);
    assert_eq!(boxes.row(0, 2).unwrap(), &NEGATIVE_SCORES[12..18]);
}
