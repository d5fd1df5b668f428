use hoidet::{
    fast_rcnn_inference, Box2BoxTransform, BoxInferenceParams, BoxOutputLayers, BoxOutputs,
    EventStorage, HoiConfig, HoiError, ImageSize, OutputAdapter, ProposalTargets, Proposals,
    RaggedBatch,
};

const SIZE: ImageSize = ImageSize {
    width: 100.0,
    height: 100.0,
};

fn transform() -> Box2BoxTransform {
    Box2BoxTransform::new((10.0, 10.0, 5.0, 5.0)).unwrap()
}

fn training_proposals() -> Vec<Proposals> {
    vec![Proposals::with_targets(
        SIZE,
        vec![[10.0, 10.0, 50.0, 40.0], [60.0, 60.0, 90.0, 95.0]],
        ProposalTargets {
            gt_classes: vec![0, 2],
            gt_boxes: vec![[12.0, 8.0, 55.0, 45.0], [0.0, 0.0, 1.0, 1.0]],
        },
    )
    .unwrap()]
}

#[test]
fn classification_loss_is_nll_of_probabilities() {
    let proposals = training_proposals();
    let t = transform();
    let target = t.get_deltas(&[10.0, 10.0, 50.0, 40.0], &[12.0, 8.0, 55.0, 45.0]);
    let mut deltas = target.to_vec();
    deltas.extend_from_slice(&[0.3, -0.2, 0.1, 0.4]);

    let outputs = BoxOutputs::new(
        t,
        2,
        vec![0.7, 0.2, 0.1, 0.1, 0.1, 0.8],
        deltas,
        &proposals,
        0.0,
    )
    .unwrap();
    let mut storage = EventStorage::new();
    let losses = outputs.losses(Some(&mut storage)).unwrap();

    let expected = (-(0.7f64).ln() - (0.8f64).ln()) / 2.0;
    assert!((losses["loss_cls"] as f64 - expected).abs() < 1e-5);
    // background proposals do not contribute to regression
    assert!(losses["loss_box_reg"].abs() < 1e-5);

    assert_eq!(storage.latest("fast_rcnn/cls_accuracy"), Some(1.0));
    assert_eq!(storage.latest("fast_rcnn/fg_cls_accuracy"), Some(1.0));
    assert_eq!(storage.latest("fast_rcnn/false_negative"), Some(0.0));
}

#[test]
fn regression_loss_uses_gt_class_columns() {
    let proposals = training_proposals();
    let t = transform();
    let target = t.get_deltas(&[10.0, 10.0, 50.0, 40.0], &[12.0, 8.0, 55.0, 45.0]);
    // class-specific: 2 classes x 4 columns per row
    let mut deltas = vec![target[0] + 1.0, target[1], target[2], target[3]];
    deltas.extend_from_slice(&[9.0, 9.0, 9.0, 9.0]);
    deltas.extend_from_slice(&[5.0; 8]);

    let outputs = BoxOutputs::new(
        t,
        2,
        vec![0.7, 0.2, 0.1, 0.1, 0.1, 0.8],
        deltas,
        &proposals,
        0.0,
    )
    .unwrap();
    let loss = outputs.smooth_l1_loss().unwrap();
    assert!((loss - 0.5).abs() < 1e-5);
}

#[test]
fn zero_proposals_give_exact_zero_losses() {
    let proposals = vec![Proposals::new(SIZE, Vec::new()), Proposals::new(SIZE, Vec::new())];
    let outputs =
        BoxOutputs::new(transform(), 3, Vec::new(), Vec::new(), &proposals, 0.0).unwrap();
    assert!(outputs.no_instances());
    assert_eq!(outputs.smooth_l1_loss().unwrap(), 0.0);
    assert_eq!(outputs.softmax_cross_entropy_loss(None).unwrap(), 0.0);
    let losses = outputs.losses(None).unwrap();
    assert_eq!(losses["loss_cls"], 0.0);
    assert_eq!(losses["loss_box_reg"], 0.0);
    assert_eq!(
        losses.keys().copied().collect::<Vec<_>>(),
        vec!["loss_box_reg", "loss_cls"]
    );
}

#[test]
fn losses_need_proposal_targets() {
    let proposals = vec![Proposals::new(SIZE, vec![[0.0, 0.0, 5.0, 5.0]])];
    let outputs = BoxOutputs::new(
        transform(),
        1,
        vec![0.4, 0.6],
        vec![0.0; 4],
        &proposals,
        0.0,
    )
    .unwrap();
    assert!(matches!(
        outputs.losses(None).err().unwrap(),
        HoiError::MissingAnnotations { .. }
    ));
}

#[test]
fn delta_width_must_be_agnostic_or_per_class() {
    let proposals = vec![Proposals::new(SIZE, vec![[0.0, 0.0, 5.0, 5.0]])];
    let err = BoxOutputs::new(
        transform(),
        3,
        vec![0.1, 0.2, 0.3, 0.4],
        vec![0.0; 8],
        &proposals,
        0.0,
    )
    .err()
    .unwrap();
    assert_eq!(
        err,
        HoiError::LengthMismatch {
            what: "pred_proposal_deltas",
            expected: 12,
            got: 8,
        }
    );
}

fn inference_proposals() -> Vec<Proposals> {
    vec![Proposals::new(
        SIZE,
        vec![
            [0.0, 0.0, 10.0, 10.0],
            [1.0, 1.0, 10.0, 10.0],
            [20.0, 20.0, 30.0, 30.0],
        ],
    )]
}

fn inference_probs() -> Vec<f32> {
    vec![0.9, 0.05, 0.05, 0.8, 0.1, 0.1, 0.02, 0.6, 0.38]
}

#[test]
fn inference_thresholds_suppresses_and_truncates() {
    let proposals = inference_proposals();
    let outputs = BoxOutputs::new(
        transform(),
        2,
        inference_probs(),
        vec![0.0; 12],
        &proposals,
        0.0,
    )
    .unwrap();

    let params = BoxInferenceParams {
        score_threshold: 0.05,
        nms_iou_threshold: 0.5,
        topk_per_image: -1,
        parallel: false,
    };
    let results = outputs.inference(&params).unwrap();
    assert_eq!(results.len(), 1);
    let kept: Vec<(usize, usize)> = results[0]
        .detections
        .iter()
        .map(|d| (d.proposal_index, d.class))
        .collect();
    assert_eq!(kept, vec![(0, 0), (2, 1), (1, 1)]);
    let first = results[0].detections[0].bbox;
    for (a, b) in first.iter().zip([0.0f32, 0.0, 10.0, 10.0]) {
        assert!((a - b).abs() < 1e-4);
    }

    let truncated = outputs
        .inference(&BoxInferenceParams {
            topk_per_image: 2,
            ..params
        })
        .unwrap();
    assert_eq!(truncated[0].detections.len(), 2);
    assert_eq!(truncated[0].detections[1].proposal_index, 2);
}

#[test]
fn inference_clips_and_drops_non_finite_rows() {
    let boxes =
        RaggedBatch::from_flat(vec![-5.0, 2.0, 150.0, 40.0, f32::NAN, 0.0, 1.0, 1.0], 4, &[2])
            .unwrap();
    let scores = RaggedBatch::from_flat(vec![0.9, 0.1, 0.95, 0.05], 2, &[2]).unwrap();
    let results = fast_rcnn_inference(
        &boxes,
        &scores,
        &[ImageSize::new(100.0, 50.0)],
        1,
        &BoxInferenceParams::default(),
    )
    .unwrap();
    assert_eq!(results[0].detections.len(), 1);
    assert_eq!(results[0].detections[0].bbox, [0.0, 2.0, 100.0, 40.0]);
}

#[test]
fn layers_follow_config() {
    let cfg = HoiConfig {
        num_classes: 2,
        box_score_threshold_test: 0.5,
        box_topk_per_image_test: 5,
        ..HoiConfig::default()
    };
    let layers = BoxOutputLayers::from_config(&cfg).unwrap();
    assert_eq!(layers.num_classes(), 2);

    let proposals = inference_proposals();
    let results = layers
        .inference(inference_probs(), vec![0.0; 12], &proposals)
        .unwrap();
    let scores: Vec<f32> = results[0].detections.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.6]);

    let empty = vec![Proposals::new(SIZE, Vec::new())];
    let losses = layers.losses(Vec::new(), Vec::new(), &empty, None).unwrap();
    assert_eq!(losses["loss_cls"], 0.0);
}
